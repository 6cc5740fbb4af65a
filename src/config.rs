use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use tracing::error;

use crate::auth::password::{HashAlgorithm, DEFAULT_HASH_COST};

/// Fallback signing secret used when `JWT_SECRET` is unset. Anyone who knows
/// it can mint valid tokens, so it is refused in production.
pub const INSECURE_DEFAULT_SECRET: &str = "secret";

/// Upper bound on token lifetime (one year).
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub algorithm: HashAlgorithm,
    pub cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to
    /// mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let environment = lookup("APP_ENV").unwrap_or_else(|| "development".into());

        let secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(s) => s,
            None if environment == "production" => {
                anyhow::bail!("JWT_SECRET must be set when APP_ENV=production")
            }
            None => {
                error!("JWT_SECRET is not set; falling back to an insecure default secret");
                INSECURE_DEFAULT_SECRET.to_string()
            }
        };
        let jwt = JwtConfig {
            secret,
            ttl_minutes: parse_var::<i64>(&lookup, "JWT_TTL_MINUTES")?.unwrap_or(60),
        };

        if !(1..=MAX_TTL_MINUTES).contains(&jwt.ttl_minutes) {
            anyhow::bail!("JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}");
        }

        let algorithm = match lookup("PASSWORD_HASH_ALGORITHM") {
            Some(v) => v.parse::<HashAlgorithm>()?,
            None => HashAlgorithm::Bcrypt,
        };
        let cost = parse_var::<u32>(&lookup, "PASSWORD_HASH_COST")?.unwrap_or(DEFAULT_HASH_COST);
        algorithm.check_cost(cost)?;
        let password = PasswordConfig { algorithm, cost };

        let port = lookup("APP_PORT")
            .or_else(|| lookup("PORT"))
            .map(|v| v.parse::<u16>())
            .transpose()?
            .unwrap_or(5000);

        let database_max_connections =
            parse_var::<u32>(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);
        if database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Self {
            database_url,
            database_max_connections,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            environment,
            jwt,
            password,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{key} is not a valid number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "memory://")]))
            .expect("config");
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.password.cost, 10);
        assert_eq!(cfg.password.algorithm, HashAlgorithm::Bcrypt);
        assert_eq!(cfg.database_max_connections, 10);
        assert_eq!(cfg.jwt.secret, INSECURE_DEFAULT_SECRET);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn production_refuses_the_fallback_secret() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "memory://"),
            ("APP_ENV", "production"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/users"),
            ("JWT_SECRET", "s3cr3t-value"),
            ("PORT", "7000"),
            ("APP_PORT", "8081"),
            ("PASSWORD_HASH_ALGORITHM", "argon2"),
            ("PASSWORD_HASH_COST", "3"),
        ]))
        .expect("config");
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.password.algorithm, HashAlgorithm::Argon2);
        assert_eq!(cfg.password.cost, 3);
        assert_ne!(cfg.jwt.secret, INSECURE_DEFAULT_SECRET);
    }

    #[test]
    fn unknown_hash_algorithm_is_rejected() {
        let res = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "memory://"),
            ("PASSWORD_HASH_ALGORITHM", "md5"),
        ]));
        assert!(res.is_err());
    }

    #[test]
    fn malformed_numbers_fail_instead_of_defaulting() {
        for (key, value) in [
            ("JWT_TTL_MINUTES", "sixty"),
            ("PASSWORD_HASH_COST", "ten"),
            ("DATABASE_MAX_CONNECTIONS", "-1"),
        ] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("DATABASE_URL", "memory://"),
                (key, value),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases: &[&[(&str, &str)]] = &[
            &[("PASSWORD_HASH_COST", "3")],
            &[("PASSWORD_HASH_COST", "32")],
            &[("PASSWORD_HASH_ALGORITHM", "argon2"), ("PASSWORD_HASH_COST", "0")],
            &[("JWT_TTL_MINUTES", "0")],
            &[("JWT_TTL_MINUTES", "9223372036854775807")],
            &[("DATABASE_MAX_CONNECTIONS", "0")],
        ];
        for extra in cases {
            let mut pairs = vec![("DATABASE_URL", "memory://")];
            pairs.extend_from_slice(extra);
            assert!(
                AppConfig::from_lookup(lookup_from(&pairs)).is_err(),
                "accepted {extra:?}"
            );
        }
    }
}
