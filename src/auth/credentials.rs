//! Argon2id password hashing.
//!
//! Stored hashes are PHC strings, so the parameters used at hash time travel
//! with the hash and verification keeps working after the defaults change.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

#[derive(Clone, Debug)]
pub struct CredentialHasher {
    params: Params,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Cheap parameters for tests and local fixtures.
    ///
    /// # Errors
    /// Never in practice; `Params::new` validates the constants.
    pub fn fast() -> Result<Self> {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None)
            .map_err(|err| anyhow!("invalid argon2 params: {err}"))?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `secret` with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash(&self, secret: &SecretString) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(secret.expose_secret().as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash credential: {err}"))?
            .to_string();
        Ok(hash)
    }

    /// Hash of a random secret nobody knows. Verifying against it costs the
    /// same as verifying a real credential and always fails.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn decoy(&self) -> Result<String> {
        let unknown = SaltString::generate(&mut OsRng);
        self.hash(&SecretString::from(unknown.as_str().to_string()))
    }
}

/// Check `submitted` against a stored PHC hash. Malformed hashes never verify.
#[must_use]
pub fn verify(stored: &str, submitted: &SecretString) -> bool {
    let parsed = match PasswordHash::new(stored) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("stored credential hash is malformed: {err}");
            return false;
        }
    };
    Argon2::default()
        .verify_password(submitted.expose_secret().as_bytes(), &parsed)
        .is_ok()
}

/// Run [`verify`] on the blocking pool so argon2 work does not stall the
/// executor.
pub async fn verify_blocking(stored: String, submitted: SecretString) -> bool {
    match tokio::task::spawn_blocking(move || verify(&stored, &submitted)).await {
        Ok(verified) => verified,
        Err(err) => {
            tracing::error!("credential verification task failed: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn hash_then_verify() -> Result<()> {
        let hasher = CredentialHasher::fast()?;
        let hash = hasher.hash(&secret("correct horse"))?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify(&hash, &secret("correct horse")));
        assert!(!verify(&hash, &secret("Correct horse")));
        Ok(())
    }

    #[test]
    fn salts_differ() -> Result<()> {
        let hasher = CredentialHasher::fast()?;
        let a = hasher.hash(&secret("pw"))?;
        let b = hasher.hash(&secret("pw"))?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify("not-a-phc-string", &secret("pw")));
        assert!(!verify("", &secret("")));
    }

    #[test]
    fn decoy_uses_hasher_params() -> Result<()> {
        let decoy = CredentialHasher::fast()?.decoy()?;
        assert!(decoy.contains(&format!("m={},t=1,p=1", Params::MIN_M_COST)));
        assert!(!verify(&decoy, &secret("")));
        assert!(!verify(&decoy, &secret("pw")));
        Ok(())
    }

    #[tokio::test]
    async fn verify_blocking_matches_sync() -> Result<()> {
        let hash = CredentialHasher::fast()?.hash(&secret("pw"))?;
        assert!(verify_blocking(hash.clone(), secret("pw")).await);
        assert!(!verify_blocking(hash, secret("nope")).await);
        Ok(())
    }
}
