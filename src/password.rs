//! Password hashing and verification.
//!
//! [PasswordHasher] is the seam for choosing a hashing scheme. [BcryptHasher]
//! salts each hash and is the one to use for real accounts. [Sha256Hasher] is
//! deterministic, which makes it useful for tests and for databases created
//! with unsalted SHA-256 hashes.

use std::fmt::Display;

use bcrypt::{hash, verify};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// A one-way hash of a password, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Create a new `PasswordHash` without any validation.
    ///
    /// The caller should ensure that `raw_password_hash` is a valid password hash.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid hash is provided it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(raw_password_hash: &str) -> Self {
        Self(raw_password_hash.to_string())
    }
}

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Turns plaintext passwords into one-way hashes and checks passwords against
/// stored hashes.
pub trait PasswordHasher {
    /// Hash `password`.
    ///
    /// # Errors
    /// Returns [Error::HashingError] if the underlying hashing library fails.
    fn hash(&self, password: &str) -> Result<PasswordHash, Error>;

    /// Check that `password` matches `stored`.
    ///
    /// The default implementation hashes `password` and compares the result
    /// with `stored` in constant time, which is correct for any deterministic
    /// hash. Salted schemes must override it.
    ///
    /// # Errors
    /// Returns [Error::HashingError] if the underlying hashing library fails.
    fn verify(&self, password: &str, stored: &PasswordHash) -> Result<bool, Error> {
        let candidate = self.hash(password)?;

        Ok(constant_time_eq(
            candidate.as_ref().as_bytes(),
            stored.as_ref().as_bytes(),
        ))
    }
}

/// Salted bcrypt hashes.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// An alias for the default encryption cost for hashing passwords.
    pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

    /// Create a hasher with the specified `cost`.
    ///
    /// `cost` increases the rounds of hashing and therefore the time needed to verify a password.
    /// A value of at least 12 is recommended. Pass in [BcryptHasher::DEFAULT_COST] to use the recommended cost.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, Error> {
        hash(password, self.cost)
            .map(PasswordHash)
            .map_err(|error| Error::HashingError(error.to_string()))
    }

    fn verify(&self, password: &str, stored: &PasswordHash) -> Result<bool, Error> {
        verify(password, stored.as_ref()).map_err(|error| Error::HashingError(error.to_string()))
    }
}

/// Unsalted, hex encoded SHA-256 hashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, Error> {
        let digest = Sha256::digest(password.as_bytes());

        Ok(PasswordHash(format!("{digest:x}")))
    }
}

/// Compare two byte strings without returning early on the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
