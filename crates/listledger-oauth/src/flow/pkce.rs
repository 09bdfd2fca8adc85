//! PKCE (Proof Key for Code Exchange) implementation for `OAuth2`.
//!
//! PKCE (RFC 7636) enhances security for public clients by preventing
//! authorization code interception attacks.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind the code verifier.
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind the CSRF `state` parameter.
const STATE_BYTES: usize = 24;

/// PKCE code challenge and verifier pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Code verifier (random string).
    pub verifier: String,
    /// Code challenge (SHA256 hash of verifier).
    pub challenge: String,
    /// Challenge method (always S256).
    pub method: String,
}

impl PkceChallenge {
    /// Generates a new PKCE challenge from a fresh random verifier.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_token(VERIFIER_BYTES);
        Self::from_verifier(verifier)
    }

    /// Builds the challenge for an existing verifier (e.g., one restored
    /// from the key-value store after a process restart).
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: "S256".to_string(),
        }
    }

    /// Computes the code challenge from a verifier using SHA256.
    fn compute_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Returns the verifier.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Returns the challenge.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Generates a fresh base64url-encoded (no padding) CSRF `state` value.
#[must_use]
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

fn random_token(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_generation() {
        let pkce = PkceChallenge::generate();
        assert!(!pkce.verifier.is_empty());
        assert!(!pkce.challenge.is_empty());
        assert_eq!(pkce.method, "S256");
        assert_ne!(pkce.verifier, pkce.challenge);
    }

    #[test]
    fn test_verifier_length() {
        // 64 random bytes encode to 86 base64url characters, well within
        // the RFC 7636 43-128 range.
        let pkce = PkceChallenge::generate();
        assert!(pkce.verifier.len() >= 43);
        assert!(pkce.verifier.len() <= 128);
    }

    #[test]
    fn test_challenge_is_sha256_of_verifier() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use sha2::{Digest, Sha256};

        let pkce = PkceChallenge::generate();
        let mut hasher = Sha256::new();
        hasher.update(pkce.verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(pkce.challenge, expected);
        assert!(!pkce.challenge.contains('='));
    }

    #[test]
    fn test_from_verifier_is_deterministic() {
        let a = PkceChallenge::from_verifier("restored_verifier".to_string());
        let b = PkceChallenge::from_verifier("restored_verifier".to_string());
        assert_eq!(a.challenge, b.challenge);
    }

    #[test]
    fn test_multiple_generations_unique() {
        let pkce1 = PkceChallenge::generate();
        let pkce2 = PkceChallenge::generate();
        assert_ne!(pkce1.verifier, pkce2.verifier);
        assert_ne!(generate_state(), generate_state());
    }
}
