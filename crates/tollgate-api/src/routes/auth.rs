//! Authentication routes

use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use std::time::Duration;
use tollgate_auth::{AuthSubject, TokenVerifier, middleware::extract_bearer_token, require_access_token};
use tollgate_core::{AuthError, TokenPair};
use tracing::debug;

use crate::error::ApiError;
use crate::state::{AppState, CookieSettings};

use super::types::{
    AccountResponse, LoginRequest, MeResponse, RefreshRequest, RegisterRequest, StatusResponse,
    TokenResponse,
};

/// Name of the cookie carrying the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

// ==================== Cookies ====================

fn refresh_cookie(settings: &CookieSettings, token: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(settings.secure)
        .path(settings.path.clone())
        .max_age(time::Duration::try_from(max_age).unwrap_or(time::Duration::MAX))
        .build()
}

/// Expired, empty refresh cookie on the configured path
fn cleared_cookie(settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = refresh_cookie(settings, String::new(), Duration::ZERO);
    cookie.make_removal();
    cookie
}

/// Token pair in the body, refresh token also set as a cookie
fn token_response(jar: CookieJar, settings: &CookieSettings, pair: TokenPair) -> Response {
    let cookie = refresh_cookie(settings, pair.refresh_token.clone(), pair.refresh_expires_in);
    (jar.add(cookie), Json(TokenResponse::from(pair))).into_response()
}

/// Refresh token from the cookie, falling back to a JSON body
fn presented_refresh_token(jar: &CookieJar, body: &Bytes) -> Option<String> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|request| request.refresh_token)
        .filter(|token| !token.is_empty())
}

fn outcome<T>(result: &Result<T, AuthError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AuthError::Validation(_)) => "invalid",
        Err(AuthError::Conflict(_)) => "conflict",
        Err(AuthError::Unauthorized) => "rejected",
        Err(AuthError::Internal(_)) => "error",
    }
}

// ==================== Auth Routes ====================

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let Json(request) = payload?;

    let account = state.auth.register(&request.email, &request.password).await?;
    metrics::counter!("tollgate_registrations_total").increment(1);

    Ok((StatusCode::CREATED, Json(account.into())))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let result = state.auth.login(&request.email, &request.password).await;
    metrics::counter!("tollgate_logins_total", "outcome" => outcome(&result)).increment(1);

    Ok(token_response(jar, &state.cookie, result?))
}

/// POST /auth/refresh
async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, ApiError> {
    let token = presented_refresh_token(&jar, &body).ok_or(AuthError::Unauthorized)?;

    let result = state.auth.refresh(&token).await;
    metrics::counter!("tollgate_refresh_total", "outcome" => outcome(&result)).increment(1);

    Ok(token_response(jar, &state.cookie, result?))
}

/// POST /auth/logout
///
/// Accepts the refresh cookie, a `refresh_token` body field, or a bearer
/// access token. A bearer token is still tried when the cookie or body token
/// does not verify.
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let presented = presented_refresh_token(&jar, &body);
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| extract_bearer_token(h).ok())
        .map(str::to_string);

    let mut result = Err(AuthError::Unauthorized);
    for token in presented.iter().chain(bearer.iter()) {
        result = state.auth.logout(token).await;
        if !matches!(result, Err(AuthError::Unauthorized)) {
            break;
        }
        debug!("Logout token did not verify, trying the next one");
    }
    result?;
    metrics::counter!("tollgate_logouts_total").increment(1);

    Ok((
        jar.add(cleared_cookie(&state.cookie)),
        Json(StatusResponse {
            status: "logged out",
        }),
    )
        .into_response())
}

/// GET /auth/me
async fn me(subject: AuthSubject) -> Json<MeResponse> {
    debug!("Resolved caller {}", subject.account_id);
    Json(MeResponse {
        id: subject.account_id,
        expires_at: subject.expires_at,
    })
}

/// Create auth routes
///
/// Routes behind the request gate only need the verify-only key.
pub fn routes(verifier: Arc<TokenVerifier>) -> Router<AppState> {
    let gated = Router::new()
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(verifier, require_access_token));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .merge(gated)
}
