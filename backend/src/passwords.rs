//! Password hashing and the session auth hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use accounts_common::user::UNUSABLE_PASSWORD_PREFIX;

#[derive(Debug, thiserror::Error)]
#[error("Password hashing failed: {0}")]
pub struct PasswordError(String);

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

/// False for unusable placeholders and malformed hashes.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with(UNUSABLE_PASSWORD_PREFIX) {
        return false;
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Placeholder that can never verify, for accounts created through OIDC.
pub fn unusable_password() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("{}{}", UNUSABLE_PASSWORD_PREFIX, suffix)
}

/// Hash stored in the session at login. It changes whenever the password
/// does, which invalidates existing sessions.
pub fn session_auth_hash(secret_key: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"accounts.session_auth_hash");
    hasher.update(secret_key.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn test_unusable_password_never_verifies() {
        let placeholder = unusable_password();
        assert!(placeholder.starts_with('!'));
        assert_eq!(placeholder.len(), 41);
        assert!(!verify_password("", &placeholder));
        assert!(!verify_password(&placeholder, &placeholder));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("x", "plaintext"));
    }

    #[test]
    fn test_session_auth_hash_tracks_password() {
        let a = session_auth_hash("secret", "hash-1");
        assert_eq!(a, session_auth_hash("secret", "hash-1"));
        assert_ne!(a, session_auth_hash("secret", "hash-2"));
        assert_ne!(a, session_auth_hash("other", "hash-1"));
    }
}
