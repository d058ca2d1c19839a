//! Authorization code to token exchange.

use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{RequestOrigin, TokenRequest, TokenResponse};
use reqwest::Client;
use reqwest::header::{ORIGIN, USER_AGENT};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// Client for the provider's token endpoint. One request per exchange, no retries.
#[derive(Clone)]
pub struct TokenExchangeClient {
    http_client: Client,
    user_agent: String,
}

impl TokenExchangeClient {
    pub fn new(http_timeout_seconds: u64, user_agent: impl Into<String>) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()?;

        Ok(Self::with_client(http_client, user_agent))
    }

    pub fn with_client(http_client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            http_client,
            user_agent: user_agent.into(),
        }
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Exchange an authorization code for tokens.
    ///
    /// A non-success status is returned as
    /// [`OAuth2Error::TokenExchangeFailed`] with the provider's body untouched.
    pub async fn exchange(
        &self,
        token_endpoint: &Url,
        origin: &RequestOrigin,
        request: &TokenRequest<'_>,
    ) -> OAuth2Result<TokenResponse> {
        debug!("Requesting tokens from {}", token_endpoint);

        let response = self
            .http_client
            .post(token_endpoint.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ORIGIN, origin.to_string())
            .form(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(|e| {
                error!("Token exchange failed with status {} and an unreadable body", status);
                OAuth2Error::HttpError(e)
            })?;
            error!("Token exchange failed with status {}", status);
            return Err(OAuth2Error::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        info!("Successfully exchanged code for tokens");
        Ok(token_response)
    }
}
