//! Unverified ID token claim reader.
//!
//! Decoding here does not check the token signature. The only claim this
//! crate relies on without verification is `nonce`, and only when no JWKS
//! endpoint is configured (see [`crate::IdTokenVerifier`]).

use crate::base64url;
use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Claims carried in the payload segment of an ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    /// Either a single string or an array, as providers differ.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub additional_claims: HashMap<String, serde_json::Value>,
}

/// Decode the payload of a compact `header.payload.signature` token.
pub fn read_claims(token: &str) -> OAuth2Result<IdTokenClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(OAuth2Error::InvalidIdToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let bytes = base64url::decode(payload)
        .map_err(|e| OAuth2Error::InvalidIdToken(format!("payload is not base64: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| OAuth2Error::InvalidIdToken(format!("payload is not a claim set: {}", e)))
}
