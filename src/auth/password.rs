use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, Result};

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {}", e)))
    }

    /// bcrypt's verify is constant-time with respect to the hash contents.
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to verify password: {}", e)))
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() < 6 {
            return Err(AppError::Validation(
                "Password must be at least 6 characters long".to_string(),
            ));
        }
        Ok(())
    }

    /// Detects legacy verifiers that were stored as plaintext instead of a
    /// bcrypt hash, so login can upgrade them in place.
    pub fn is_bcrypt_hash(stored: &str) -> bool {
        stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$")
    }
}
