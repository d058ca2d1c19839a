//! OAuth2 error types.

use ras_identity_session::SessionError;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// Coarse classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The inbound request was wrong or untrusted.
    ClientInput,
    /// The provider's token endpoint answered with a non-success status.
    Upstream,
    /// An identity token could not be decoded or verified.
    Decode,
    /// Required settings are missing or unusable.
    Configuration,
    /// The provider could not be reached or answered with garbage.
    Transport,
    Internal,
}

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("State does not match")]
    StateMismatch,

    #[error("Nonce does not match")]
    NonceMismatch,

    #[error("Code verifier missing from session")]
    MissingCodeVerifier,

    #[error("Callback error: {0}")]
    CallbackError(String),

    #[error("Token exchange failed with status {status}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    #[error("ID token verification failed: {0}")]
    IdTokenVerification(#[from] jsonwebtoken::errors::Error),

    #[error("Signing key request failed: {0}")]
    JwksFetchFailed(String),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

impl OAuth2Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            OAuth2Error::MissingAuthorizationCode
            | OAuth2Error::StateMismatch
            | OAuth2Error::NonceMismatch
            | OAuth2Error::MissingCodeVerifier
            | OAuth2Error::CallbackError(_) => ErrorClass::ClientInput,
            OAuth2Error::TokenExchangeFailed { .. } => ErrorClass::Upstream,
            OAuth2Error::InvalidIdToken(_) | OAuth2Error::IdTokenVerification(_) => {
                ErrorClass::Decode
            }
            OAuth2Error::ConfigError(_) | OAuth2Error::UrlError(_) => ErrorClass::Configuration,
            OAuth2Error::HttpError(_)
            | OAuth2Error::InvalidTokenResponse(_)
            | OAuth2Error::JwksFetchFailed(_) => ErrorClass::Transport,
            OAuth2Error::SessionError(_) => ErrorClass::Internal,
        }
    }
}
