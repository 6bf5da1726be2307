/// Password hashing primitive
///
/// One-way hash and verify behind a trait so the hashing backend stays a
/// collaborator. The default implementation uses Argon2id.
use crate::error::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher as _, PasswordVerifier as _,
};

/// One-way password hashing and verification
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> AuthResult<String>;
    fn verify(&self, hash: &str, plaintext: &str) -> AuthResult<bool>;
}

/// Argon2id hasher with the library's default parameters
#[derive(Default)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
    }

    fn verify(&self, hash: &str, plaintext: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(format!("stored password hash is malformed: {e}")))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}
