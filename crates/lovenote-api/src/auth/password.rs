/// Password hashing and verification using Argon2id
///
/// - Algorithm: Argon2id, version 0x13
/// - Cost: from [`PasswordConfig`] (64 MiB, t=3, p=4 by default)
/// - Salt: random per hash, embedded in the PHC output string
///
/// Verification always performs one full Argon2 computation, including for
/// unknown users and malformed stored hashes, so response timing does not
/// reveal which case occurred.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use lovenote_core::PasswordConfig;
use thiserror::Error;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),
}

fn to_params(config: &PasswordConfig) -> Result<Params, PasswordError> {
    Params::new(
        config.memory_cost,
        config.time_cost,
        config.parallelism,
        Some(32),
    )
    .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Hash a password with the given cost parameters
///
/// Returns a PHC string (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`)
/// which is safe to store as-is.
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        to_params(config)?,
    );

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// `Some(matched)` when `hash` is a usable Argon2 PHC string, `None` otherwise
fn verify_against(password: &str, hash: &str) -> Option<bool> {
    let parsed = PasswordHash::new(hash).ok()?;
    // Parameters come from the PHC string, not from Argon2::default()
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Some(true),
        Err(argon2::password_hash::Error::Password) => Some(false),
        Err(_) => None,
    }
}

/// Hashes and verifies passwords at a fixed cost
///
/// Holds a pre-computed hash of a throwaway password, used as the target
/// of dummy verifications.
#[derive(Debug, Clone)]
pub struct Passwords {
    config: PasswordConfig,
    dummy_hash: String,
}

impl Passwords {
    pub fn new(config: PasswordConfig) -> Result<Self, PasswordError> {
        let dummy_hash = hash_password_with_config("lovenote-dummy-password", &config)?;
        Ok(Self { config, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_password_with_config(password, &self.config)
    }

    /// Constant-work verification
    ///
    /// `false` on mismatch, and also when the stored hash is not a usable
    /// Argon2 hash (unparseable, another algorithm, or bad parameters); the
    /// latter still burns one dummy verification.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match verify_against(password, hash) {
            Some(matched) => matched,
            None => {
                tracing::warn!("Stored password hash is not a usable Argon2 hash");
                self.verify_dummy(password);
                false
            }
        }
    }

    /// Burn one verification's worth of work; used when there is no user
    pub fn verify_dummy(&self, password: &str) {
        let _ = verify_against(password, &self.dummy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords() -> Passwords {
        Passwords::new(PasswordConfig::fast_insecure()).unwrap()
    }

    #[test]
    fn test_hash_and_verify_password() {
        let passwords = passwords();
        let hash = passwords.hash("correct horse").unwrap();

        assert!(passwords.verify("correct horse", &hash));
        assert!(!passwords.verify("wrong horse", &hash));
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let passwords = passwords();
        let hash1 = passwords.hash("same-password").unwrap();
        let hash2 = passwords.hash("same-password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(passwords.verify("same-password", &hash1));
        assert!(passwords.verify("same-password", &hash2));
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        let passwords = passwords();
        assert!(!passwords.verify("password", "invalid-hash-format"));
        assert!(!passwords.verify("password", ""));
    }

    #[test]
    fn test_non_argon2_or_bad_parameter_hash_is_mismatch() {
        let passwords = passwords();
        // Valid PHC syntax, wrong algorithm
        assert!(!passwords.verify(
            "password",
            "$pbkdf2-sha256$i=1000$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA"
        ));
        // Argon2id with a memory cost below the minimum
        assert!(!passwords.verify(
            "password",
            "$argon2id$v=19$m=1,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA"
        ));
    }

    #[test]
    fn test_hash_carries_configured_parameters() {
        let config = PasswordConfig {
            memory_cost: 2048,
            time_cost: 2,
            parallelism: 1,
        };
        let hash = hash_password_with_config("TestPassword123!", &config).unwrap();

        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(hash.contains("m=2048"));
        assert!(hash.contains("t=2"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let config = PasswordConfig {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 0,
        };
        assert!(matches!(
            hash_password_with_config("pw", &config),
            Err(PasswordError::HashingFailed(_))
        ));
    }
}
