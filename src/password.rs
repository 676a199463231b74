use crate::error::AppError;

pub fn hash(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// A malformed stored hash counts as a mismatch, not a server error.
pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or_else(|e| {
        log::warn!("Stored password hash could not be verified: {:?}", e);
        false
    })
}

pub fn validate(password: &str) -> Result<(), AppError> {
    if password.len() < 6 {
        return Err(AppError::ValidationError(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}
