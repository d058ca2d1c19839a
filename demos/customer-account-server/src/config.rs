//! Configuration for the customer account server
//!
//! Sources, later ones winning:
//! - Configuration file (`config.toml`, or `STOREFRONT_CONFIG_FILE`)
//! - Environment variables with the `STOREFRONT` prefix, e.g. `STOREFRONT__SERVER__PORT`
//! - Storefront environment variables such as `PUBLIC_CUSTOMER_ACCOUNT_API_URL`
//!
//! The provider URL and client ID may be absent at startup. Login requests
//! then fail with a configuration error instead of the server refusing to boot.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_oauth2::CustomerAccountConfig;
use ras_identity_session::CookieSessionConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, warn};

const DEFAULT_SESSION_SECRET: &str = "dev-session-secret-change-in-production";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub customer_account: CustomerAccountConfig,
    pub session: SessionSettings,
    pub logging: LoggingConfig,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// HMAC secret used to sign the session cookie
    pub secret: String,
    pub cookie_name: String,
    /// Upper bound on how long a committed session stays readable
    pub ttl_seconds: i64,
    /// Mark the cookie `Secure`
    pub secure_cookie: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `ras_identity_oauth2=debug,info`
    pub level: String,
    /// `pretty` or `compact`
    pub format: String,
    pub target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SESSION_SECRET.to_string(),
            cookie_name: "storefront_session".to_string(),
            ttl_seconds: 86400,
            secure_cookie: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path =
            std::env::var("STOREFRONT_CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("STOREFRONT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;

        Ok(settings)
    }

    /// Apply the storefront's conventional environment variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("PUBLIC_CUSTOMER_ACCOUNT_API_URL") {
            info!("Using PUBLIC_CUSTOMER_ACCOUNT_API_URL environment variable");
            self.customer_account.provider_url = Some(url);
        }

        if let Some(client_id) = lookup("PUBLIC_CUSTOMER_ACCOUNT_API_CLIENT_ID") {
            info!("Using PUBLIC_CUSTOMER_ACCOUNT_API_CLIENT_ID environment variable");
            self.customer_account.client_id = Some(client_id);
        }

        if let Some(host) = lookup("HOST") {
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Some(secret) = lookup("SESSION_SECRET") {
            info!("Using SESSION_SECRET environment variable");
            self.session.secret = secret;
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.session.secret.is_empty() {
            anyhow::bail!("Session secret cannot be empty");
        }

        if self.session.secret == DEFAULT_SESSION_SECRET {
            if cfg!(debug_assertions) {
                warn!("Using default session secret - this is insecure for production!");
            } else {
                anyhow::bail!("Session secret must be changed from default in production");
            }
        }

        if self.session.ttl_seconds <= 0 {
            anyhow::bail!("Session TTL must be positive");
        }

        if self.customer_account.http_timeout_seconds == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        let valid_formats = ["pretty", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        if let Err(e) = self.customer_account.provider() {
            warn!("Customer account login is unavailable until configured: {}", e);
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    pub fn session_config(&self) -> CookieSessionConfig {
        CookieSessionConfig {
            secret: self.session.secret.clone(),
            cookie_name: self.session.cookie_name.clone(),
            ttl: chrono::Duration::seconds(self.session.ttl_seconds),
            ..CookieSessionConfig::default()
        }
    }
}
