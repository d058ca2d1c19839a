//! ID token signature verification against the provider's JWKS.

use crate::claims::IdTokenClaims;
use crate::error::{OAuth2Error, OAuth2Result};
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Verifies ID tokens with keys published at a JWKS endpoint.
///
/// The key set is cached and fetched again once when a token names a key id
/// the cache does not know.
pub struct IdTokenVerifier {
    http_client: Client,
    jwks_uri: Url,
    issuer: Option<String>,
    keys: RwLock<Option<JwkSet>>,
}

impl IdTokenVerifier {
    pub fn new(http_client: Client, jwks_uri: Url, issuer: Option<String>) -> Self {
        Self {
            http_client,
            jwks_uri,
            issuer,
            keys: RwLock::new(None),
        }
    }

    /// Check signature, `exp` and audience, then return the claims.
    pub async fn verify(&self, token: &str, audience: &str) -> OAuth2Result<IdTokenClaims> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| OAuth2Error::InvalidIdToken("token has no key id".to_string()))?;

        let jwk = self.find_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        // A key that names its algorithm is only ever used with that algorithm
        let alg = match jwk.common.key_algorithm {
            Some(key_alg) => {
                let pinned = signing_algorithm(key_alg).ok_or_else(|| {
                    OAuth2Error::InvalidIdToken(format!("key {} is not a signing key", kid))
                })?;
                if pinned != header.alg {
                    warn!(
                        "ID token algorithm {:?} does not match key {} ({:?})",
                        header.alg, kid, pinned
                    );
                    return Err(OAuth2Error::InvalidIdToken(
                        "token algorithm does not match its key".to_string(),
                    ));
                }
                pinned
            }
            None => header.alg,
        };

        let mut validation = Validation::new(alg);
        validation.set_audience(&[audience]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let token_data = decode::<IdTokenClaims>(token, &key, &validation)?;
        debug!("Verified ID token signed with key {}", kid);
        Ok(token_data.claims)
    }

    async fn find_key(&self, kid: &str) -> OAuth2Result<Jwk> {
        if let Some(keys) = self.keys.read().await.as_ref() {
            if let Some(jwk) = keys.find(kid) {
                return Ok(jwk.clone());
            }
        }

        let keys = self.fetch_keys().await?;
        let found = keys.find(kid).cloned();
        *self.keys.write().await = Some(keys);

        found.ok_or_else(|| {
            warn!("No signing key with id {}", kid);
            OAuth2Error::InvalidIdToken(format!("unknown signing key {}", kid))
        })
    }

    async fn fetch_keys(&self) -> OAuth2Result<JwkSet> {
        let response = self.http_client.get(self.jwks_uri.clone()).send().await?;

        if !response.status().is_success() {
            return Err(OAuth2Error::JwksFetchFailed(format!(
                "{} returned {}",
                self.jwks_uri,
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| OAuth2Error::JwksFetchFailed(e.to_string()))
    }
}

fn signing_algorithm(key_alg: KeyAlgorithm) -> Option<Algorithm> {
    match key_alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
