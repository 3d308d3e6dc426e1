//! bcrypt password hashing.

use anyhow::{Context, Result};
use std::sync::OnceLock;

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Hash a password with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Check a password against a stored bcrypt hash.
///
/// A malformed stored hash is an error, not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password hash")
}

/// Burn one verification for a login against an unknown email, so timing
/// does not reveal whether the account exists.
pub fn dummy_verify(password: &str, cost: u32) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let hash = DUMMY_HASH.get_or_init(|| bcrypt::hash("cacadores-dummy-password", cost).ok());
    if let Some(hash) = hash {
        let _ = bcrypt::verify(password, hash);
    }
}
