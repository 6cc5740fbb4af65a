use std::str::FromStr;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::Deserialize;
use tracing::error;

/// bcrypt work factor used when `PASSWORD_HASH_COST` is not set.
pub const DEFAULT_HASH_COST: u32 = 10;
const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Bcrypt,
    Argon2,
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(Self::Bcrypt),
            "argon2" | "argon2id" => Ok(Self::Argon2),
            other => anyhow::bail!("unsupported password hash algorithm: {other}"),
        }
    }
}

impl HashAlgorithm {
    /// Rejects a cost the underlying hash function would refuse at hash time.
    pub fn check_cost(self, cost: u32) -> anyhow::Result<()> {
        let (min, max) = match self {
            Self::Bcrypt => (BCRYPT_MIN_COST, BCRYPT_MAX_COST),
            Self::Argon2 => (Params::MIN_T_COST, Params::MAX_T_COST),
        };
        if !(min..=max).contains(&cost) {
            anyhow::bail!("PASSWORD_HASH_COST {cost} is out of range {min}..={max} for {self:?}");
        }
        Ok(())
    }
}

/// Salted adaptive password hashing.
///
/// New digests use the configured algorithm and cost. For bcrypt the cost is
/// the log2 round count; for argon2 it is the iteration count. Verification
/// reads the scheme from the digest itself, so digests written under either
/// setting keep verifying after the configuration changes.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    algorithm: HashAlgorithm,
    cost: u32,
}

impl PasswordHasher {
    pub fn new(algorithm: HashAlgorithm, cost: u32) -> Self {
        Self { algorithm, cost }
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        match self.algorithm {
            HashAlgorithm::Bcrypt => bcrypt::hash(plain, self.cost).map_err(|e| {
                error!(error = %e, "bcrypt hash error");
                anyhow::anyhow!(e.to_string())
            }),
            HashAlgorithm::Argon2 => {
                let params = Params::new(
                    Params::DEFAULT_M_COST,
                    self.cost,
                    Params::DEFAULT_P_COST,
                    None,
                )
                .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
                let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
                let salt = SaltString::generate(&mut OsRng);
                let hash = argon2
                    .hash_password(plain.as_bytes(), &salt)
                    .map_err(|e| {
                        error!(error = %e, "argon2 hash_password error");
                        anyhow::anyhow!(e.to_string())
                    })?
                    .to_string();
                Ok(hash)
            }
        }
    }

    /// Returns `Ok(false)` on mismatch and an error only when `digest` is not
    /// a recognizable hash.
    pub fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        if digest.starts_with("$argon2") {
            let parsed = PasswordHash::new(digest).map_err(|e| {
                error!(error = %e, "argon2 parse hash error");
                anyhow::anyhow!(e.to_string())
            })?;
            return Ok(Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok());
        }
        if digest.starts_with("$2") {
            return bcrypt::verify(plain, digest).map_err(|e| {
                error!(error = %e, "bcrypt verify error");
                anyhow::anyhow!(e.to_string())
            });
        }
        anyhow::bail!("unrecognized password digest format")
    }
}
