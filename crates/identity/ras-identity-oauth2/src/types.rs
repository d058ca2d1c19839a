//! OAuth2 protocol types.

use crate::error::{OAuth2Error, OAuth2Result};
use ras_identity_session::{SessionCredential, SessionStore, SessionStoreExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Keys the login flow reads and writes in the session.
pub mod session_keys {
    pub const CODE_VERIFIER: &str = "code_verifier";
    pub const NONCE: &str = "nonce";
    pub const STATE: &str = "state";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const ID_TOKEN: &str = "id_token";
    pub const EXPIRES_IN: &str = "expires_in";
}

/// Scheme and authority the browser used to reach us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    scheme: String,
    host: String,
}

impl RequestOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into(),
        }
    }

    /// Parse an origin such as `https://shop.example.com:8443`.
    pub fn parse(origin: &str) -> OAuth2Result<Self> {
        let url = Url::parse(origin)?;
        let host = url
            .host_str()
            .ok_or_else(|| OAuth2Error::ConfigError(format!("origin {} has no host", origin)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Self::new(url.scheme(), host))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The provider only accepts `https` callback URIs, even when the local
    /// front door is reached over a plain `http` tunnel. Any scheme other
    /// than `https` is replaced.
    pub fn secure(&self) -> Self {
        if self.scheme == "https" {
            self.clone()
        } else {
            Self::new("https", self.host.clone())
        }
    }

    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self, path)
    }
}

impl fmt::Display for RequestOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}

/// Parameters of a single authorization redirect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub nonce: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl AuthorizationRequest {
    pub fn authorization_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("state", &self.state)
            .append_pair("nonce", &self.nonce)
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("code_challenge", &self.code_challenge)
            .append_pair("code_challenge_method", &self.code_challenge_method);
        url
    }
}

/// Query parameters the provider sends back to the callback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Whether the request carries anything a provider redirect would.
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.state.is_some() || self.error.is_some()
    }
}

/// Form body of the authorization code grant
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
}

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Redirect whose session has already been committed.
///
/// Only the flow can build one, so a redirect never leaves without the
/// credential that carries the code verifier or the tokens.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    location: String,
    credential: SessionCredential,
}

impl LoginRedirect {
    pub(crate) fn new(location: String, credential: SessionCredential) -> Self {
        Self {
            location,
            credential,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn credential(&self) -> &SessionCredential {
        &self.credential
    }

    pub fn into_parts(self) -> (String, SessionCredential) {
        (self.location, self.credential)
    }
}

/// Tokens stored by a completed login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_in: u64,
}

impl CustomerTokens {
    pub fn from_session<S: SessionStore + ?Sized>(session: &S) -> Option<Self> {
        Some(Self {
            access_token: session.get_str(session_keys::ACCESS_TOKEN)?.to_string(),
            refresh_token: session.get_str(session_keys::REFRESH_TOKEN)?.to_string(),
            id_token: session.get_str(session_keys::ID_TOKEN)?.to_string(),
            expires_in: session.get_as(session_keys::EXPIRES_IN)?,
        })
    }
}
