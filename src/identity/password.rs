//! Password hashing with Argon2id
//!
//! Hashes are PHC strings, so salt and parameters travel with the hash.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{PortalError, PortalResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Reject passwords that are too short or purely numeric.
pub fn validate_password(password: &str) -> PortalResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PortalError::validation(
            "password",
            format!("Must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(PortalError::validation("password", "Cannot be entirely numeric"));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> PortalResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortalError::Storage(anyhow!("Failed to hash password: {e}")))
}

/// `Ok(false)` on a wrong password; `Err` only for a malformed stored hash.
pub fn verify_password(password: &str, hash: &str) -> PortalResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PortalError::Storage(anyhow!("Invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
