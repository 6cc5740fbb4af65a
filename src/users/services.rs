use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtKeys, password::PasswordHasher},
    error::{AppError, AppResult},
    users::{
        dto::{LoginRequest, RegisterRequest},
        repo::{StoreError, UserStore},
        repo_types::{NewUser, Role, User},
        validation::{normalize_email, validate_registration},
    },
};

const REGISTRATION_FAILED: &str = "Registration failed.";
const LOGIN_FAILED: &str = "Login failed.";

/// Registration and login over an injected store, hasher and signing keys.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    /// Validates, checks for an existing username/email, hashes and inserts.
    ///
    /// The pre-check only gives the common case a fast answer; the store's
    /// unique constraint decides races, and both surface as `Duplicate`.
    ///
    /// The work runs on its own task, so a caller that goes away mid-request
    /// (client disconnect, timeout) does not cancel the write.
    pub async fn register(&self, req: RegisterRequest) -> AppResult<User> {
        let svc = self.clone();
        tokio::spawn(async move { svc.register_detached(req).await })
            .await
            .map_err(|e| AppError::unexpected(REGISTRATION_FAILED, e))?
    }

    async fn register_detached(&self, req: RegisterRequest) -> AppResult<User> {
        let valid = validate_registration(req)?;

        let existing = self
            .users
            .find_by_email_or_username(&valid.email, &valid.username)
            .await
            .map_err(|e| AppError::unexpected(REGISTRATION_FAILED, e))?;
        if existing.is_some() {
            warn!(email = %valid.email, username = %valid.username, "email or username already registered");
            return Err(AppError::Duplicate);
        }

        let password_hash = self
            .hash(valid.password)
            .await
            .map_err(|e| AppError::unexpected(REGISTRATION_FAILED, e))?;

        let new_user = NewUser {
            username: valid.username,
            email: valid.email,
            password_hash,
            role: Role::default(),
        };
        let user = match self.users.insert(new_user).await {
            Ok(u) => u,
            Err(StoreError::Duplicate) => {
                warn!("insert rejected by unique constraint");
                return Err(AppError::Duplicate);
            }
            Err(StoreError::Other(e)) => return Err(AppError::unexpected(REGISTRATION_FAILED, e)),
        };

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns a signed bearer token for the account behind `req.email`.
    pub async fn login(&self, req: LoginRequest) -> AppResult<String> {
        let email = normalize_email(&req.email);

        let user = match self.users.find_by_email(&email).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(email = %email, "login unknown email");
                return Err(AppError::NotFound);
            }
            Err(e) => return Err(AppError::unexpected(LOGIN_FAILED, e)),
        };

        let ok = self
            .verify(req.password, user.password_hash.clone())
            .await
            .map_err(|e| AppError::unexpected(LOGIN_FAILED, e))?;
        if !ok {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self
            .keys
            .issue(user.id)
            .map_err(|e| AppError::unexpected(LOGIN_FAILED, e))?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound)
    }

    // Hashing is deliberately slow; keep it off the async workers.
    async fn hash(&self, plain: String) -> anyhow::Result<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&plain)).await?
    }

    async fn verify(&self, plain: String, digest: String) -> anyhow::Result<bool> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::password::HashAlgorithm,
        users::memory::MemoryUserStore,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", Duration::from_secs(3600))
    }

    fn service_with(users: Arc<dyn UserStore>) -> AccountService {
        AccountService::new(users, PasswordHasher::new(HashAlgorithm::Bcrypt, 4), keys())
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "password123".into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Store whose pre-check never sees anything, so every duplicate has to be
    /// caught by `insert`, as in a lost race.
    struct BlindPrecheck(MemoryUserStore);

    #[async_trait]
    impl UserStore for BlindPrecheck {
        async fn find_by_email_or_username(&self, _: &str, _: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
            self.0.insert(new_user).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn find_by_email_or_username(&self, _: &str, _: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("Database connection failed")
        }
        async fn find_by_email(&self, _: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("Database connection failed")
        }
        async fn find_by_id(&self, _: Uuid) -> anyhow::Result<Option<User>> {
            anyhow::bail!("Database connection failed")
        }
        async fn insert(&self, _: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Other(anyhow::anyhow!("Database connection failed")))
        }
    }

    #[tokio::test]
    async fn register_stores_a_hashed_student() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());

        let user = svc
            .register(register_req("testuser", "Test@Example.com"))
            .await
            .expect("register");

        assert_eq!(user.role, Role::Student);
        assert_eq!(user.email, "test@example.com");
        assert_ne!(user.password_hash, "password123");
        assert!(user.password_hash.starts_with("$2"));
        let stored = store.find_by_email("test@example.com").await.unwrap().unwrap();
        assert_eq!(stored.id, user.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn register_rejects_duplicates_from_precheck() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        svc.register(register_req("testuser1", "dup@example.com"))
            .await
            .expect("first");

        let same_email = svc.register(register_req("testuser2", "dup@example.com")).await;
        assert!(matches!(same_email, Err(AppError::Duplicate)));
        let same_name = svc.register(register_req("testuser1", "other@example.com")).await;
        assert!(matches!(same_name, Err(AppError::Duplicate)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn register_maps_constraint_violation_to_duplicate() {
        let svc = service_with(Arc::new(BlindPrecheck(MemoryUserStore::new())));
        svc.register(register_req("racer", "race@example.com"))
            .await
            .expect("first");
        let err = svc
            .register(register_req("racer2", "race@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate));
    }

    #[tokio::test]
    async fn store_failures_are_unexpected() {
        let svc = service_with(Arc::new(BrokenStore));
        let err = svc
            .register(register_req("testuser", "test@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Registration failed.");
        assert!(err.to_string().contains("Database connection failed"));

        let err = svc
            .login(login_req("test@example.com", "password123"))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Login failed.");
    }

    #[tokio::test]
    async fn login_issues_a_token_for_the_user() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        let user = svc
            .register(register_req("loginuser", "login@example.com"))
            .await
            .unwrap();

        let token = svc
            .login(login_req(" LOGIN@example.com", "password123"))
            .await
            .expect("login");
        let claims = keys().verify(&token).expect("valid token");
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn login_failures_do_not_write() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        svc.register(register_req("wrongpass", "wrongpass@example.com"))
            .await
            .unwrap();

        let wrong = svc
            .login(login_req("wrongpass@example.com", "wrongpassword"))
            .await;
        assert!(matches!(wrong, Err(AppError::InvalidCredentials)));
        let unknown = svc
            .login(login_req("nonexistent@example.com", "anypassword"))
            .await;
        assert!(matches!(unknown, Err(AppError::NotFound)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn login_with_empty_fields_is_a_lookup_failure() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        svc.register(register_req("emptyfields", "empty@example.com"))
            .await
            .unwrap();

        let no_password = svc.login(login_req("empty@example.com", "")).await;
        assert!(matches!(no_password, Err(AppError::InvalidCredentials)));
        let no_email = svc.login(login_req("  ", "password123")).await;
        assert!(matches!(no_email, Err(AppError::NotFound)));
        let neither = svc.login(LoginRequest::default()).await;
        assert!(matches!(neither, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn abandoned_registration_still_stores_the_user() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = AccountService::new(
            store.clone(),
            PasswordHasher::new(HashAlgorithm::Bcrypt, 10),
            keys(),
        );

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            svc.register(register_req("walkaway", "walkaway@example.com")),
        )
        .await;
        assert!(abandoned.is_err(), "cost-10 hash finished within 20ms");

        let mut stored = 0;
        for _ in 0..200 {
            stored = store.len().await;
            if stored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(stored, 1);
        assert!(store
            .find_by_email("walkaway@example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn find_by_id_reports_missing_user() {
        let svc = service_with(Arc::new(MemoryUserStore::new()));
        assert!(matches!(
            svc.find_by_id(Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }
}
