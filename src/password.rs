//! Credential hashing, kept apart from the user document.

use bcrypt::Version;

use crate::error::{ApiError, ApiResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Salt and hash pair persisted on a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub salt: String,
    pub hash: String,
}

/// bcrypt with a fresh 16-byte salt per password. bcrypt is CPU-bound, so
/// both directions run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> ApiResult<Credentials> {
        let cost = self.cost;
        let password = password.to_owned();
        let salt: [u8; 16] = rand::random();

        let joined = tokio::task::spawn_blocking(move || {
            bcrypt::hash_with_salt(password, cost, salt).map(|parts| parts.format_for_version(Version::TwoB))
        })
        .await;

        match joined {
            Ok(Ok(hash)) => Ok(Credentials {
                salt: hex::encode(salt),
                hash,
            }),
            Ok(Err(e)) => {
                tracing::error!("Failed to hash password: {}", e);
                Err(ApiError::Internal("Failed to process password".to_string()))
            }
            Err(e) => {
                tracing::error!("spawn_blocking panic during hash: {}", e);
                Err(ApiError::Internal("Failed to process password".to_string()))
            }
        }
    }

    /// `false` for a mismatch and for a malformed stored hash.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();

        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash)).await {
            Ok(Ok(valid)) => valid,
            Ok(Err(e)) => {
                tracing::warn!("Stored password hash could not be checked: {}", e);
                false
            }
            Err(e) => {
                tracing::error!("spawn_blocking panic during verify: {}", e);
                false
            }
        }
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum cost keeps the tests fast.
    fn hasher() -> CredentialHasher {
        CredentialHasher::new(4)
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let creds = hasher().hash("correct horse").await.unwrap();
        assert_eq!(creds.salt.len(), 32);
        assert!(creds.hash.starts_with("$2b$04$"));
        assert!(hasher().verify("correct horse", &creds.hash).await);
        assert!(!hasher().verify("wrong horse", &creds.hash).await);
    }

    #[tokio::test]
    async fn test_salts_differ_per_hash() {
        let a = hasher().hash("same password").await.unwrap();
        let b = hasher().hash("same password").await.unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_never_verifies() {
        assert!(!hasher().verify("anything", "not-a-bcrypt-hash").await);
    }
}
