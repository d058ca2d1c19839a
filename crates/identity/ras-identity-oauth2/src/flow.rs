//! Customer account login: authorization redirect and callback handling.

use crate::claims::{IdTokenClaims, read_claims};
use crate::client::TokenExchangeClient;
use crate::config::CustomerAccountConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::pkce::PkceChallenge;
use crate::random::random_token;
use crate::types::{
    AuthorizationRequest, CallbackParams, LoginRedirect, RequestOrigin, TokenRequest,
    session_keys,
};
use crate::verify::IdTokenVerifier;
use ras_identity_session::{SessionStore, SessionStoreExt};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// Progress of a single callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    AwaitingCode,
    Exchanging,
    ValidatingNonce,
    Committed,
    Rejected,
}

/// Drives the authorization code + PKCE login against the customer account API.
pub struct CustomerAccountFlow {
    config: CustomerAccountConfig,
    token_client: TokenExchangeClient,
    verifier: Option<IdTokenVerifier>,
}

impl CustomerAccountFlow {
    pub fn new(config: CustomerAccountConfig) -> OAuth2Result<Self> {
        let token_client =
            TokenExchangeClient::new(config.http_timeout_seconds, config.user_agent.clone())?;
        Self::with_token_client(config, token_client)
    }

    pub fn with_token_client(
        config: CustomerAccountConfig,
        token_client: TokenExchangeClient,
    ) -> OAuth2Result<Self> {
        let verifier = match &config.jwks_uri {
            Some(uri) => Some(IdTokenVerifier::new(
                token_client.http_client().clone(),
                Url::parse(uri)?,
                config.issuer.clone(),
            )),
            None => {
                warn!("No JWKS URI configured; ID token signatures will not be verified");
                None
            }
        };

        Ok(Self {
            config,
            token_client,
            verifier,
        })
    }

    pub fn config(&self) -> &CustomerAccountConfig {
        &self.config
    }

    /// Build the provider redirect and seed the session with the verifier,
    /// nonce and state. The session is committed before this returns.
    pub async fn begin_login<S: SessionStore + ?Sized>(
        &self,
        origin: &RequestOrigin,
        session: &mut S,
    ) -> OAuth2Result<LoginRedirect> {
        let provider = self.config.provider()?;
        let pkce = PkceChallenge::new();

        let request = AuthorizationRequest {
            client_id: provider.client_id,
            redirect_uri: origin.secure().join(&self.config.callback_path),
            scope: self.config.scope(),
            state: random_token(),
            nonce: random_token(),
            code_challenge: pkce.code_challenge,
            code_challenge_method: pkce.code_challenge_method.to_string(),
        };
        let url = request.authorization_url(&provider.authorization_endpoint);

        session.set(
            session_keys::CODE_VERIFIER,
            Value::String(pkce.code_verifier),
        );
        session.set(session_keys::NONCE, Value::String(request.nonce));
        session.set(session_keys::STATE, Value::String(request.state));
        let credential = session.commit().await?;

        info!("Redirecting to customer account login");
        Ok(LoginRedirect::new(url.to_string(), credential))
    }

    /// Complete a login from the provider's callback parameters.
    ///
    /// Nothing is written to the session unless every check passes.
    pub async fn complete_login<S: SessionStore + ?Sized>(
        &self,
        origin: &RequestOrigin,
        params: CallbackParams,
        session: &mut S,
    ) -> OAuth2Result<LoginRedirect> {
        let mut stage = CallbackStage::AwaitingCode;

        match self.run_callback(&mut stage, origin, params, session).await {
            Ok(redirect) => {
                debug!(?stage, "Customer account callback finished");
                Ok(redirect)
            }
            Err(e) => {
                warn!(failed_at = ?stage, "Customer account callback rejected: {}", e);
                stage = CallbackStage::Rejected;
                debug!(?stage, "Customer account callback finished");
                Err(e)
            }
        }
    }

    async fn run_callback<S: SessionStore + ?Sized>(
        &self,
        stage: &mut CallbackStage,
        origin: &RequestOrigin,
        params: CallbackParams,
        session: &mut S,
    ) -> OAuth2Result<LoginRedirect> {
        if let Some(error) = params.error {
            let description = params
                .error_description
                .as_deref()
                .unwrap_or("No description");
            return Err(OAuth2Error::CallbackError(format!(
                "{}: {}",
                error, description
            )));
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(OAuth2Error::MissingAuthorizationCode)?;

        match (params.state.as_deref(), session.get_str(session_keys::STATE)) {
            (Some(received), Some(expected)) if received == expected => {}
            _ => return Err(OAuth2Error::StateMismatch),
        }

        let provider = self.config.provider()?;
        let code_verifier = session
            .get_str(session_keys::CODE_VERIFIER)
            .map(str::to_string)
            .ok_or(OAuth2Error::MissingCodeVerifier)?;

        let origin = origin.secure();
        let redirect_uri = origin.join(&self.config.callback_path);

        *stage = CallbackStage::Exchanging;
        let tokens = self
            .token_client
            .exchange(
                &provider.token_endpoint,
                &origin,
                &TokenRequest {
                    grant_type: "authorization_code",
                    client_id: &provider.client_id,
                    redirect_uri: &redirect_uri,
                    code: &code,
                    code_verifier: &code_verifier,
                },
            )
            .await?;

        *stage = CallbackStage::ValidatingNonce;
        let claims = self.id_token_claims(&tokens.id_token, &provider.client_id).await?;
        match (claims.nonce.as_deref(), session.get_str(session_keys::NONCE)) {
            (Some(received), Some(expected)) if received == expected => {}
            _ => return Err(OAuth2Error::NonceMismatch),
        }

        session.remove(session_keys::CODE_VERIFIER);
        session.remove(session_keys::STATE);
        session.remove(session_keys::NONCE);
        session.set(
            session_keys::ACCESS_TOKEN,
            Value::String(tokens.access_token),
        );
        session.set(
            session_keys::REFRESH_TOKEN,
            Value::String(tokens.refresh_token),
        );
        session.set(session_keys::ID_TOKEN, Value::String(tokens.id_token));
        session.set(session_keys::EXPIRES_IN, Value::from(tokens.expires_in));
        let credential = session.commit().await?;

        *stage = CallbackStage::Committed;
        info!("Customer signed in");
        Ok(LoginRedirect::new(
            self.config.post_login_path.clone(),
            credential,
        ))
    }

    async fn id_token_claims(&self, id_token: &str, audience: &str) -> OAuth2Result<IdTokenClaims> {
        match &self.verifier {
            Some(verifier) => verifier.verify(id_token, audience).await,
            None => read_claims(id_token),
        }
    }
}
