use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use rand_core::OsRng;

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashingError(password_hash::Error);

/// Hash with Argon2id and a fresh random salt. The result is a PHC string
/// that carries its own parameters.
pub fn hash_password(plaintext: &str) -> Result<String, HashingError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(HashingError)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch. Only a malformed stored hash is an error.
pub fn verify_password(hash: &str, plaintext: &str) -> Result<bool, HashingError> {
    let parsed = PasswordHash::new(hash).map_err(HashingError)?;

    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HashingError(e)),
    }
}
