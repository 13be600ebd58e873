//! Password hashing via bcrypt.

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Minimum accepted password length at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Registration-time password policy.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
