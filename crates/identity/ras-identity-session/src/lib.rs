//! Request-scoped session storage with an explicit commit step.
//!
//! A [`SessionStore`] is opened from the credential a client presented (a cookie
//! value), mutated by the handler, and then committed back into a fresh
//! [`SessionCredential`] that has to be attached to the response. The cookie
//! backed implementation signs the whole key/value map into an HS256 JWT.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Transport credential produced by [`SessionStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub name: String,
    pub value: String,
}

/// Key/value session bound to a single request.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<&Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    /// Serialize the current contents into a credential for the response.
    async fn commit(&mut self) -> SessionResult<SessionCredential>;
}

/// Typed helpers available on every [`SessionStore`].
pub trait SessionStoreExt: SessionStore {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    fn set_as<T: Serialize>(&mut self, key: &str, value: &T) -> SessionResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sid: String,
    iat: i64,
    exp: i64,
    data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CookieSessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub ttl: Duration,
    pub algorithm: Algorithm,
}

impl Default for CookieSessionConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            cookie_name: "session".to_string(),
            ttl: Duration::days(7),
            algorithm: Algorithm::HS256,
        }
    }
}

struct CodecKeys {
    config: CookieSessionConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Opens and seals signed cookie sessions.
#[derive(Clone)]
pub struct CookieSessionCodec {
    keys: Arc<CodecKeys>,
}

impl CookieSessionCodec {
    pub fn new(config: CookieSessionConfig) -> Self {
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            keys: Arc::new(CodecKeys {
                config,
                encoding,
                decoding,
            }),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.keys.config.cookie_name
    }

    /// Open the session carried by `credential`.
    ///
    /// A missing, expired or tampered credential yields an empty session; the
    /// caller never sees stale or forged values.
    pub fn open(&self, credential: Option<&str>) -> CookieSession {
        match credential.map(|value| self.try_open(value)) {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                warn!("Discarding unreadable session cookie: {}", e);
                self.fresh()
            }
            None => self.fresh(),
        }
    }

    pub fn try_open(&self, credential: &str) -> SessionResult<CookieSession> {
        let token_data = decode::<SessionClaims>(
            credential,
            &self.keys.decoding,
            &Validation::new(self.keys.config.algorithm),
        )?;

        debug!("Opened session {}", token_data.claims.sid);

        Ok(CookieSession {
            codec: self.clone(),
            sid: token_data.claims.sid,
            data: token_data.claims.data,
        })
    }

    fn fresh(&self) -> CookieSession {
        CookieSession {
            codec: self.clone(),
            sid: Uuid::new_v4().to_string(),
            data: Map::new(),
        }
    }

    fn seal(&self, sid: &str, data: &Map<String, Value>) -> SessionResult<SessionCredential> {
        let config = &self.keys.config;
        let now = Utc::now();
        let claims = SessionClaims {
            sid: sid.to_string(),
            iat: now.timestamp(),
            exp: (now + config.ttl).timestamp(),
            data: data.clone(),
        };

        let value = encode(&Header::new(config.algorithm), &claims, &self.keys.encoding)?;

        Ok(SessionCredential {
            name: config.cookie_name.clone(),
            value,
        })
    }
}

/// Session whose contents travel inside a signed cookie.
pub struct CookieSession {
    codec: CookieSessionCodec,
    sid: String,
    data: Map<String, Value>,
}

impl CookieSession {
    pub fn id(&self) -> &str {
        &self.sid
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl SessionStore for CookieSession {
    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    async fn commit(&mut self) -> SessionResult<SessionCredential> {
        let credential = self.codec.seal(&self.sid, &self.data)?;
        debug!("Committed session {}", self.sid);
        Ok(credential)
    }
}

/// Unsigned session kept in memory, handy for tests and non-browser callers.
#[derive(Debug, Default, Clone)]
pub struct MemorySession {
    data: Map<String, Value>,
    commits: usize,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`SessionStore::commit`] has run.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    async fn commit(&mut self) -> SessionResult<SessionCredential> {
        self.commits += 1;
        Ok(SessionCredential {
            name: "session".to_string(),
            value: serde_json::to_string(&self.data)?,
        })
    }
}
