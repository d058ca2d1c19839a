//! HTTP surface of the customer account login.

use crate::AppState;
use crate::error::AppError;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::response::Redirect;
use axum::{Json, Router, routing::get};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use ras_identity_oauth2::{CallbackParams, CustomerTokens, LoginRedirect, RequestOrigin};
use ras_identity_session::CookieSession;
use serde::{Deserialize, Serialize};
use tracing::info;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home_handler))
        .route(
            "/authorize",
            get(authorize_handler).post(start_login_handler),
        )
}

/// Origin of the inbound request, honouring reverse proxy headers.
pub struct Origin(pub RequestOrigin);

impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let scheme = match header(FORWARDED_PROTO) {
            Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        };
        let host = header(FORWARDED_HOST)
            .or_else(|| header(HOST.as_str()))
            .ok_or(AppError::MissingHost)?;

        Ok(Origin(RequestOrigin::new(scheme, host)))
    }
}

/// Login status reported by the home route
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountStatus {
    pub authenticated: bool,
    pub expires_in: Option<u64>,
}

fn open_session(state: &AppState, jar: &CookieJar) -> CookieSession {
    let cookie = jar.get(state.sessions.cookie_name());
    state.sessions.open(cookie.as_ref().map(|c| c.value()))
}

fn redirect_with_session(
    state: &AppState,
    jar: CookieJar,
    redirect: LoginRedirect,
) -> (CookieJar, Redirect) {
    let (location, credential) = redirect.into_parts();
    let cookie = Cookie::build((credential.name, credential.value))
        .path("/")
        .http_only(true)
        .secure(state.secure_cookie)
        .same_site(SameSite::Lax);

    (jar.add(cookie), Redirect::to(&location))
}

/// `GET /authorize`: provider callback when it carries callback parameters,
/// otherwise the start of a new login.
async fn authorize_handler(
    State(state): State<AppState>,
    Origin(origin): Origin,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    let mut session = open_session(&state, &jar);

    let redirect = if params.is_callback() {
        state
            .flow
            .complete_login(&origin, params, &mut session)
            .await?
    } else {
        state.flow.begin_login(&origin, &mut session).await?
    };

    Ok(redirect_with_session(&state, jar, redirect))
}

/// `POST /authorize`: the storefront's login form.
async fn start_login_handler(
    State(state): State<AppState>,
    Origin(origin): Origin,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let mut session = open_session(&state, &jar);
    let redirect = state.flow.begin_login(&origin, &mut session).await?;

    Ok(redirect_with_session(&state, jar, redirect))
}

async fn home_handler(State(state): State<AppState>, jar: CookieJar) -> Json<AccountStatus> {
    let session = open_session(&state, &jar);
    let tokens = CustomerTokens::from_session(&session);

    if tokens.is_some() {
        info!("Serving signed-in customer session {}", session.id());
    }

    Json(AccountStatus {
        authenticated: tokens.is_some(),
        expires_in: tokens.map(|t| t.expires_in),
    })
}
