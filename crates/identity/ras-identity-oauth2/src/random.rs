//! Secure random values.

use crate::base64url;
use rand::RngCore;
use rand::rngs::OsRng;

/// Bytes behind every `state` and `nonce` value.
pub const TOKEN_BYTES: usize = 32;

/// Fill `len` bytes from the operating system CSPRNG.
///
/// Panics if the entropy source is unavailable.
pub fn generate(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Opaque URL-safe token carrying `TOKEN_BYTES` of entropy.
pub fn random_token() -> String {
    base64url::encode(generate(TOKEN_BYTES))
}
