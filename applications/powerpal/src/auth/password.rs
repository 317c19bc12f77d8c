use crate::error::AuthError;

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost)
        .map_err(|e| AuthError::Unknown(format!("Failed to hash password: {}", e)))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AuthError::Unknown(format!("Failed to verify password: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("hunter22", TEST_COST).unwrap();

        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_same_password_salted_differently() {
        let a = hash_password("hunter22", TEST_COST).unwrap();
        let b = hash_password("hunter22", TEST_COST).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        assert!(verify_password("hunter22", "not-a-bcrypt-hash").is_err());
    }
}
