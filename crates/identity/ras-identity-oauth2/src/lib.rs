//! Customer account login over OAuth2 with PKCE support.
//!
//! This crate implements the client side of the Authorization Code flow hardened
//! with PKCE (Proof Key for Code Exchange), `state` checking against CSRF and
//! `nonce` checking against replayed ID tokens. All per-login values travel in a
//! [`ras_identity_session::SessionStore`] that is committed before each redirect.

pub mod base64url;
mod claims;
mod client;
mod config;
mod error;
mod flow;
mod pkce;
pub mod random;
mod types;
mod verify;

#[cfg(test)]
mod tests;

pub use claims::{IdTokenClaims, read_claims};
pub use client::TokenExchangeClient;
pub use config::{
    AUTHORIZE_PATH, CustomerAccountConfig, DEFAULT_SCOPES, DEFAULT_USER_AGENT, ProviderEndpoints,
    TOKEN_PATH,
};
pub use error::{ErrorClass, OAuth2Error, OAuth2Result};
pub use flow::{CallbackStage, CustomerAccountFlow};
pub use pkce::{CODE_CHALLENGE_METHOD, PkceChallenge, generate_challenge, generate_verifier};
pub use types::{
    AuthorizationRequest, CallbackParams, CustomerTokens, LoginRedirect, RequestOrigin,
    TokenRequest, TokenResponse, session_keys,
};
pub use verify::IdTokenVerifier;

// Re-export session types for convenience
pub use ras_identity_session::{SessionCredential, SessionStore};
