use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::header::HeaderMap;
use hyper::{Request, Response, StatusCode, header};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{info, warn};

use shared::types::{Scope, Session};

use crate::AppState;
use crate::error::AuthError;
use crate::handlers::headers::{clear_session_cookie, get_bearer_session, session_cookie};
use crate::handlers::json::{deliver_error, deliver_json};

/// Resolve the caller's session from the request headers: bearer header or
/// session cookie, validated against the session store and touched on
/// success.  Every protected route goes through here.
pub async fn authenticate(headers: &HeaderMap, state: &AppState) -> crate::error::Result<Session> {
    let session_id = get_bearer_session(headers).ok_or(AuthError::Unauthorized)?;
    state.sessions.validate(&session_id).await?;
    state.sessions.touch(&session_id).await
}

/// Check a validated session for an exact permission match.
pub fn require_permission(session: &Session, scope: &Scope) -> crate::error::Result<()> {
    if session.has_permission(scope) {
        Ok(())
    } else {
        warn!(
            "User {} denied: missing permission {}",
            session.user_id,
            scope.permission_string()
        );
        Err(AuthError::Forbidden)
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LoginResponse {
    status: &'static str,
    user_id: i64,
    username: Option<String>,
    session_id: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user_id: i64,
    permissions: Vec<String>,
    issued_at: i64,
    last_used_at: i64,
    expires_at: i64,
    remaining_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

// ---------------------------------------------------------------------------
// POST /auth/login
// ---------------------------------------------------------------------------

pub async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let body = req.collect().await.context("Failed to read body")?.to_bytes();
    let (username, password) = match parse_login_form(&body) {
        Some(fields) => fields,
        None => return deliver_error(&AuthError::BadRequest),
    };

    let account = match state.users.verify_password(&username, &password).await {
        Ok(account) => account,
        Err(e) => return deliver_error(&e),
    };
    let session = match state
        .sessions
        .issue(&account, state.session_lifetime_secs())
        .await
    {
        Ok(session) => session,
        Err(e) => return deliver_error(&e),
    };

    info!("User {} logged in", account.user_id);
    session_response(&session, account.username, StatusCode::OK, state.session_lifetime_secs())
}

// ---------------------------------------------------------------------------
// POST /auth/register
// ---------------------------------------------------------------------------

pub async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let body = req.collect().await.context("Failed to read body")?.to_bytes();
    let (username, email, password) = match parse_register_form(&body) {
        Some(fields) => fields,
        None => return deliver_error(&AuthError::BadRequest),
    };

    let account = match state.users.register(&username, &email, &password).await {
        Ok(account) => account,
        Err(e) => return deliver_error(&e),
    };
    let session = match state
        .sessions
        .issue(&account, state.session_lifetime_secs())
        .await
    {
        Ok(session) => session,
        Err(e) => return deliver_error(&e),
    };

    session_response(
        &session,
        account.username,
        StatusCode::CREATED,
        state.session_lifetime_secs(),
    )
}

// ---------------------------------------------------------------------------
// POST /auth/logout
// ---------------------------------------------------------------------------

pub async fn handle_logout(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let Some(session_id) = get_bearer_session(req.headers()) else {
        return deliver_error(&AuthError::Unauthorized);
    };

    // Deleting an unknown session is still a successful logout.
    if let Err(e) = state.sessions.delete(&session_id).await {
        return deliver_error(&e);
    }

    let mut response = deliver_json(&StatusResponse { status: "ok" }, StatusCode::OK)?;
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie()?);
    Ok(response)
}

// ---------------------------------------------------------------------------
// GET /auth/session
// ---------------------------------------------------------------------------

pub async fn handle_session(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let session = match authenticate(req.headers(), &state).await {
        Ok(session) => session,
        Err(e) => return deliver_error(&e),
    };

    deliver_json(
        &SessionResponse {
            user_id: session.user_id,
            remaining_secs: session.remaining_secs(),
            permissions: session.permissions,
            issued_at: session.issued_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
        },
        StatusCode::OK,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session_response(
    session: &Session,
    username: Option<String>,
    status: StatusCode,
    lifetime_secs: i64,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let mut response = deliver_json(
        &LoginResponse {
            status: "ok",
            user_id: session.user_id,
            username,
            session_id: session.id.clone(),
            expires_at: session.expires_at,
        },
        status,
    )?;
    response
        .headers_mut()
        .insert(header::SET_COOKIE, session_cookie(&session.id, lifetime_secs)?);
    Ok(response)
}

fn form_fields(body: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(body).into_owned().collect()
}

fn parse_login_form(body: &[u8]) -> Option<(String, String)> {
    let params = form_fields(body);
    let username = params.get("username")?.trim().to_string();
    let password = params.get("password")?.to_string();
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username, password))
}

fn parse_register_form(body: &[u8]) -> Option<(String, String, String)> {
    let params = form_fields(body);
    let username = params.get("username")?.trim().to_string();
    let email = params.get("email")?.trim().to_string();
    let password = params.get("password")?.to_string();
    if username.is_empty() || email.is_empty() || password.is_empty() {
        return None;
    }
    Some((username, email, password))
}
