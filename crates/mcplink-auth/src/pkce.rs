//! PKCE (RFC 7636) verifier/challenge pairs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A PKCE code verifier and its S256 challenge.
///
/// The verifier is 64 unreserved characters; the challenge is
/// `base64url(SHA256(verifier))` without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// The code verifier, sent with the token exchange
    pub verifier: String,
    /// The S256 challenge, sent with the authorization request
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair.
    ///
    /// Two v4 UUIDs in simple form yield 64 hex characters, all within the
    /// RFC 7636 unreserved set, with 244 bits of randomness behind them.
    pub fn generate() -> Self {
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Compute the S256 challenge for a verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verifier_is_64_unreserved_chars() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!(
            pair.verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-._~".contains(c))
        );
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge, PkcePair::challenge_for(&pair.verifier));
        // base64url of a 32-byte digest, unpadded
        assert_eq!(pair.challenge.len(), 43);
        assert!(!pair.challenge.contains('='));
        assert!(!pair.challenge.contains('+'));
        assert!(!pair.challenge.contains('/'));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        // Known vector from RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            PkcePair::challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_pairs_are_unique() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.verifier, b.verifier);
    }
}
