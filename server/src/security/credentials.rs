use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use tracing::warn;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

// Argon2id, 64 MiB, 1 pass, 4 lanes.
const M_COST_KIB: u32 = 64 * 1024;
const T_COST: u32 = 1;
const P_COST: u32 = 4;

/// Stored form of a freshly hashed password.  Both fields are base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedCredential {
    pub hashed_secret: String,
    pub salt: String,
}

/// Salted + peppered password hashing.
///
/// The pepper is injected at construction — there is deliberately no
/// process-global default, so tests can run several engines with different
/// peppers side by side and a missing pepper is caught at startup rather
/// than producing unpeppered hashes.
#[derive(Clone)]
pub struct CredentialEngine {
    pepper: Vec<u8>,
}

impl std::fmt::Debug for CredentialEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the pepper.
        f.debug_struct("CredentialEngine").finish_non_exhaustive()
    }
}

impl CredentialEngine {
    pub fn new(pepper: impl Into<Vec<u8>>) -> anyhow::Result<Self> {
        let pepper = pepper.into();
        if pepper.is_empty() {
            anyhow::bail!("pepper must not be empty");
        }
        Ok(Self { pepper })
    }

    fn kdf(&self) -> anyhow::Result<Argon2<'_>> {
        let params = Params::new(M_COST_KIB, T_COST, P_COST, Some(KEY_LEN))
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new_with_secret(&self.pepper, Algorithm::Argon2id, Version::V0x13, params)
            .map_err(|e| anyhow::anyhow!("Failed to construct Argon2: {e}"))
    }

    /// Hash a password with a fresh random salt.
    ///
    /// Salt generation failure (RNG exhaustion) is the only error path and
    /// propagates to the caller — there is no fallback to a weaker salt.
    pub fn hash(&self, password: &str) -> anyhow::Result<HashedCredential> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| anyhow::anyhow!("OS RNG failure generating salt: {e}"))?;

        let mut key = [0u8; KEY_LEN];
        self.kdf()?
            .hash_password_into(password.as_bytes(), &salt, &mut key)
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {e}"))?;

        Ok(HashedCredential {
            hashed_secret: B64.encode(key),
            salt: B64.encode(salt),
        })
    }

    /// Re-derive and compare in constant time.
    ///
    /// Returns `false` — never an error — when either stored field is absent
    /// or undecodable: a password-less account simply has no password that
    /// matches.
    pub fn verify(&self, password: &str, salt: Option<&str>, hashed_secret: Option<&str>) -> bool {
        let (Some(salt), Some(hashed_secret)) = (salt, hashed_secret) else {
            return false;
        };

        let Ok(salt) = B64.decode(salt) else {
            warn!("Stored salt is not valid base64");
            return false;
        };
        let Ok(expected) = B64.decode(hashed_secret) else {
            warn!("Stored hashed_secret is not valid base64");
            return false;
        };

        let Ok(kdf) = self.kdf() else {
            return false;
        };
        let mut derived = [0u8; KEY_LEN];
        if kdf
            .hash_password_into(password.as_bytes(), &salt, &mut derived)
            .is_err()
        {
            return false;
        }

        derived.ct_eq(expected.as_slice()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CredentialEngine {
        CredentialEngine::new("test-pepper-0123456789").unwrap()
    }

    #[test]
    fn hash_then_verify_roundtrip() {
        let engine = engine();
        let cred = engine.hash("hunter2hunter2").unwrap();
        assert!(engine.verify(
            "hunter2hunter2",
            Some(&cred.salt),
            Some(&cred.hashed_secret)
        ));
    }

    #[test]
    fn any_mutation_of_the_password_fails() {
        let engine = engine();
        let cred = engine.hash("hunter2hunter2").unwrap();
        for wrong in ["hunter2hunter3", "Hunter2hunter2", "hunter2hunter2 ", ""] {
            assert!(
                !engine.verify(wrong, Some(&cred.salt), Some(&cred.hashed_secret)),
                "verify accepted wrong password {wrong:?}"
            );
        }
    }

    #[test]
    fn salts_are_unique_per_hash() {
        let engine = engine();
        let a = engine.hash("same password").unwrap();
        let b = engine.hash("same password").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hashed_secret, b.hashed_secret);
    }

    #[test]
    fn absent_fields_verify_false_not_error() {
        let engine = engine();
        assert!(!engine.verify("anything", None, None));
        assert!(!engine.verify("anything", Some("c2FsdA=="), None));
        assert!(!engine.verify("anything", None, Some("aGFzaA==")));
        // Garbage base64 is also just "no match".
        assert!(!engine.verify("anything", Some("!!!"), Some("???")));
    }

    #[test]
    fn different_peppers_do_not_cross_verify() {
        let a = CredentialEngine::new("pepper-aaaaaaaaaaaa").unwrap();
        let b = CredentialEngine::new("pepper-bbbbbbbbbbbb").unwrap();
        let cred = a.hash("hunter2hunter2").unwrap();
        assert!(!b.verify(
            "hunter2hunter2",
            Some(&cred.salt),
            Some(&cred.hashed_secret)
        ));
    }

    #[test]
    fn empty_pepper_is_rejected_at_construction() {
        assert!(CredentialEngine::new("").is_err());
    }
}
