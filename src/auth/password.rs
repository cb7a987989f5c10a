use crate::error::{AppError, AppResult};

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("cat-in-hat", 4).unwrap();
        assert_ne!(hash, "cat-in-hat");
        assert!(verify_password("cat-in-hat", &hash));
        assert!(!verify_password("dog-in-hat", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same", 4).unwrap();
        let b = hash_password("same", 4).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn blocking_wrappers_agree() {
        let hash = hash_password_blocking("secret-pw".to_string(), 4).await.unwrap();
        assert!(verify_password_blocking("secret-pw".to_string(), hash.clone()).await);
        assert!(!verify_password_blocking("wrong".to_string(), hash).await);
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
