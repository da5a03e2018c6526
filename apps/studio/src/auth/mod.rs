//! Shared-secret login and the session gate in front of every route.
//!
//! One password, one token. A correct password earns a long-lived
//! `HttpOnly` cookie carrying the token; the gate compares that cookie on
//! every request and redirects everything else to the login route.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::state::{AppState, AuthSettings};

pub const SESSION_COOKIE: &str = "studio-auth";
pub const LOGIN_PATH: &str = "/login";
pub const LOGIN_API_PATH: &str = "/api/login";
const SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Routes reachable without a session.
const PUBLIC_PATHS: &[&str] = &[LOGIN_PATH, LOGIN_API_PATH, "/health"];

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

/// POST /api/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let password = request
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("Password is required".to_string()))?;

    if password != state.auth.password {
        warn!("Rejected login attempt");
        return Err(AppError::InvalidCredentials);
    }

    info!("Login succeeded, issuing session cookie");
    Ok((
        [(header::SET_COOKIE, session_cookie(&state.auth))],
        Json(json!({ "success": true, "message": "Login successful" })),
    )
        .into_response())
}

/// GET /api/login
pub async fn handle_login_method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// GET /login
pub async fn handle_login_page() -> &'static str {
    "Login required: POST {\"password\": \"...\"} to /api/login"
}

/// Middleware: unauthenticated requests go to the login route; an
/// authenticated visit to the login route goes home.
pub async fn session_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authenticated = has_session(request.headers(), &state.auth.token);
    let path = request.uri().path();

    if !authenticated && !PUBLIC_PATHS.contains(&path) {
        return Redirect::temporary(LOGIN_PATH).into_response();
    }
    if authenticated && path == LOGIN_PATH {
        return Redirect::temporary("/").into_response();
    }

    next.run(request).await
}

pub fn session_cookie(auth: &AuthSettings) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; SameSite=Strict",
        auth.token
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

/// True when any `Cookie` header carries the session cookie with `token`.
pub fn has_session(headers: &HeaderMap, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == SESSION_COOKIE && value == token)
}
