//! PKCE (RFC 7636) verifier and S256 challenge.

use crate::{base64url, random};
use sha2::{Digest, Sha256};

pub const CODE_CHALLENGE_METHOD: &str = "S256";

const VERIFIER_BYTES: usize = 32;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        let code_verifier = generate_verifier();
        let code_challenge = generate_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CODE_CHALLENGE_METHOD,
        }
    }
}

/// 32 random bytes, base64url encoded: always 43 characters.
pub fn generate_verifier() -> String {
    base64url::encode(random::generate(VERIFIER_BYTES))
}

pub fn generate_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64url::encode(digest)
}
