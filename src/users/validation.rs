use lazy_static::lazy_static;
use regex::Regex;

use crate::{error::AppError, users::dto::RegisterRequest};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const PASSWORD_MIN_LEN: usize = 6;

/// Registration input after trimming and normalization.
#[derive(Debug)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(
            r"^[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*@[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*(\.[A-Za-z0-9_]{2,3})+$"
        )
        .unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_registration(req: RegisterRequest) -> Result<ValidRegistration, AppError> {
    let username = req.username.trim().to_string();
    let email = normalize_email(&req.email);
    let password = req.password;

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Username, email and password are required".into(),
        ));
    }

    let username_len = username.chars().count();
    if username_len < USERNAME_MIN_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at least {USERNAME_MIN_LEN} characters long"
        )));
    }
    if username_len > USERNAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at most {USERNAME_MAX_LEN} characters long"
        )));
    }

    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email format".into()));
    }

    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters long"
        )));
    }

    Ok(ValidRegistration {
        username,
        email,
        password,
    })
}
