use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Checks a candidate password against the configured strength policy.
/// Returns the human-readable rejection reason on failure.
pub fn validate_strength(
    password: &str,
    min_length: usize,
    require_alnum: bool,
) -> Result<(), String> {
    if password.chars().count() < min_length {
        return Err(format!("password must be at least {min_length} characters"));
    }
    if require_alnum {
        let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            return Err("password must contain at least one letter and one digit".to_string());
        }
    }
    Ok(())
}

/// Argon2id PHC hash with a fresh random salt. Used for both passwords and
/// captcha codes.
pub fn hash(value: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(value.as_bytes(), &salt)?
        .to_string())
}

/// Constant-time verification against a PHC string. Unparseable hashes
/// verify as false rather than erroring.
pub fn verify(value: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(value.as_bytes(), &parsed)
        .is_ok()
}
