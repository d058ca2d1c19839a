//! Storefront server that signs customers in through the customer account API.

pub mod config;
pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use config::{Config, LoggingConfig};
use ras_identity_oauth2::CustomerAccountFlow;
use ras_identity_session::CookieSessionCodec;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<CustomerAccountFlow>,
    pub sessions: CookieSessionCodec,
    pub secure_cookie: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let flow = CustomerAccountFlow::new(config.customer_account.clone())
            .context("Failed to initialize customer account flow")?;

        Ok(Self {
            flow: Arc::new(flow),
            sessions: CookieSessionCodec::new(config.session_config()),
            secure_cookie: config.session.secure_cookie,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.target)
        .with_level(true);

    if logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}

/// Run `f` with a temporary subscriber writing to `writer`.
///
/// Configuration is loaded before [`init_tracing`] can run, so its warnings
/// would otherwise be lost.
pub fn with_bootstrap_logging<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .finish();

    tracing::subscriber::with_default(bootstrap, f)
}
