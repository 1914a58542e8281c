use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

use super::NaturalId;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("stored password hash is malformed")]
    CorruptHash,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP baseline for Argon2id, roughly 100ms per hash on server hardware.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Salted, memory-hard password hashing with tunable cost.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: PasswordHashString,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        let mut hasher = Self {
            params,
            dummy_hash: PasswordHashString::new(String::new()),
        };
        hasher.dummy_hash = hasher.hash(&Password::new("dummy-password-for-timing"))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password. The salt is generated per call and embedded in the
    /// PHC string.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Verify a password against a stored hash in constant time.
    ///
    /// A mismatch is `Ok(false)`; only a hash that cannot be parsed or uses an
    /// unsupported algorithm is an error. Cost parameters come from the hash
    /// itself, so hashes made with older settings keep verifying.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<bool, PasswordError> {
        let parsed_hash =
            PasswordHash::new(password_hash.as_str()).map_err(|_| PasswordError::CorruptHash)?;

        match self
            .argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(PasswordError::CorruptHash),
        }
    }

    /// Burn the same verification work as a real check. Used when there is no
    /// stored hash to compare against.
    pub fn verify_dummy(&self, password: &Password) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

/// Provisioning secret for a new account: the first four digits of the
/// natural id body.
pub fn derive_initial_password(natural_id: &NaturalId) -> Result<Password, PasswordError> {
    natural_id
        .initial_secret_prefix()
        .map(Password::new)
        .ok_or_else(|| {
            PasswordError::InvalidInput("natural id body must have at least 4 digits".to_string())
        })
}

/// Rules applied to a new secret before it is hashed.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 6 }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &Password) -> Result<(), PasswordError> {
        if password.char_len() < self.min_length {
            return Err(PasswordError::InvalidInput(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        Ok(())
    }
}
