//! Password hashing/verification (§6 User file), bcrypt-compatible with the
//! original `passlib`-backed `streamlit-authenticator` hashes, grounded on
//! `examples/original_source/app/services/auth_service.py::verify_password`.

use crate::error::AppError;

const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    bcrypt::hash(plain, BCRYPT_COST).map_err(|e| AppError::Auth(format!("failed to hash password: {e}")))
}

/// Never surfaces a hashing error as a hard failure — an unreadable hash
/// (corrupt file, incompatible scheme) is treated as a failed verification,
/// matching the original's broad `except Exception` fallback.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }
}
