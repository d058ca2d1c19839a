//! Mapping of login failures to HTTP responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use ras_identity_oauth2::{ErrorClass, OAuth2Error};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    OAuth2(#[from] OAuth2Error),

    #[error("Missing Host header")]
    MissingHost,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let oauth2_error = match self {
            AppError::MissingHost => {
                return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
            }
            AppError::OAuth2(e) => e,
        };

        match oauth2_error {
            // The provider's answer is passed through untouched
            OAuth2Error::TokenExchangeFailed { status, body } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (
                    status,
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    body,
                )
                    .into_response()
            }
            e => match e.class() {
                ErrorClass::ClientInput | ErrorClass::Decode => {
                    (StatusCode::BAD_REQUEST, e.to_string()).into_response()
                }
                ErrorClass::Configuration => {
                    error!("Customer account login is misconfigured: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Customer account login is not configured",
                    )
                        .into_response()
                }
                ErrorClass::Transport | ErrorClass::Upstream => {
                    error!("Customer account provider unavailable: {}", e);
                    (
                        StatusCode::BAD_GATEWAY,
                        "Customer account provider unavailable",
                    )
                        .into_response()
                }
                ErrorClass::Internal => {
                    error!("Customer account login failed: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
        }
    }
}
