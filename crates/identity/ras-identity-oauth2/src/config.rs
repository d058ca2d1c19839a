//! Customer account OAuth2 configuration.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const AUTHORIZE_PATH: &str = "/auth/oauth/authorize";
pub const TOKEN_PATH: &str = "/auth/oauth/token";

pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "https://api.customers.com/auth/customer.graphql",
];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.93 Safari/537.36";

/// Settings for the customer account login flow.
///
/// `provider_url` and `client_id` are optional here so a server can start
/// without them; every flow operation resolves them through
/// [`CustomerAccountConfig::provider`] and fails with a configuration error
/// when they are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerAccountConfig {
    /// Base URL of the customer account API
    pub provider_url: Option<String>,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    /// Path under the request origin the provider redirects back to
    pub callback_path: String,
    /// Where a completed login lands
    pub post_login_path: String,
    pub user_agent: String,
    pub http_timeout_seconds: u64,
    /// When set, ID tokens are verified against this key set before the
    /// nonce is trusted
    pub jwks_uri: Option<String>,
    pub issuer: Option<String>,
}

impl Default for CustomerAccountConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            client_id: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            callback_path: "/authorize".to_string(),
            post_login_path: "/".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_seconds: 30,
            jwks_uri: None,
            issuer: None,
        }
    }
}

/// Resolved provider endpoints, available only when configuration is complete.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub client_id: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
}

impl CustomerAccountConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = Some(url.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn provider(&self) -> OAuth2Result<ProviderEndpoints> {
        let provider_url = required(&self.provider_url, "customer account API URL")?;
        let client_id = required(&self.client_id, "customer account client ID")?;
        let base = provider_url.trim_end_matches('/');

        Ok(ProviderEndpoints {
            client_id: client_id.to_string(),
            authorization_endpoint: Url::parse(&format!("{}{}", base, AUTHORIZE_PATH))?,
            token_endpoint: Url::parse(&format!("{}{}", base, TOKEN_PATH))?,
        })
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> OAuth2Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuth2Error::ConfigError(format!("{} is not configured", what)))
}
