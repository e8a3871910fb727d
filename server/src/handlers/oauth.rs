use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode, header};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{debug, info};

use shared::types::Platform;

use crate::AppState;
use crate::error::AuthError;
use crate::handlers::headers::{get_bearer_session, get_cookie, nonce_cookie, session_cookie};
use crate::handlers::json::{deliver_error, deliver_json, full};
use crate::oauth::state::Mode;

#[derive(Debug, Serialize)]
struct CallbackResponse {
    status: &'static str,
    user_id: i64,
    session_id: String,
    expires_at: i64,
}

fn query_params(req: &Request<hyper::body::Incoming>) -> HashMap<String, String> {
    form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

// ---------------------------------------------------------------------------
// GET /auth/authorize?platform=<p>&mode=<login|link>
// ---------------------------------------------------------------------------

/// Kick off an OAuth flow: redirect the browser to the platform's
/// authorization endpoint and pin the nonce in a short-lived cookie.
pub async fn handle_authorize(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let params = query_params(&req);

    let platform = match params.get("platform").map(|p| p.parse::<Platform>()) {
        Some(Ok(platform)) => platform,
        _ => {
            debug!("Authorize request with missing or unknown platform");
            return deliver_error(&AuthError::BadRequest);
        }
    };
    let mode = match params.get("mode").map(String::as_str) {
        None | Some("login") => Mode::Login,
        Some("link") => Mode::Link,
        Some(other) => {
            debug!("Authorize request with unknown mode {:?}", other);
            return deliver_error(&AuthError::BadRequest);
        }
    };

    let flow = match state.oauth.begin(platform, mode) {
        Ok(flow) => flow,
        Err(e) => return deliver_error(&e),
    };

    info!("Starting {} {:?} flow", platform, mode);
    let response = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, flow.authorize_url)
        .header(header::SET_COOKIE, nonce_cookie(&flow.nonce)?)
        .body(full(Bytes::new()))?;
    Ok(response)
}

// ---------------------------------------------------------------------------
// GET /auth/callback?code=<c>&state=<s>
// ---------------------------------------------------------------------------

/// Land the platform's redirect: verify the state round trip, exchange the
/// code, resolve the identity, and hand back a fresh session.
pub async fn handle_callback(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let params = query_params(&req);

    // Platforms report user denial via an `error` parameter instead of a code.
    if let Some(err) = params.get("error") {
        debug!("OAuth callback carries platform error: {}", err);
        return deliver_error(&AuthError::BadRequest);
    }

    let code = params.get("code").map(String::as_str).unwrap_or("");
    let Some(state_param) = params.get("state") else {
        return deliver_error(&AuthError::BadRequest);
    };
    let cookie_nonce = get_cookie(req.headers(), "oauth_nonce");

    // Link mode needs the caller's existing session; resolve it up front
    // when a bearer credential is present.  Login mode ignores it.
    let current_session = match get_bearer_session(req.headers()) {
        Some(session_id) => state.sessions.validate(&session_id).await.ok(),
        None => None,
    };

    let session = match state
        .oauth
        .complete(code, state_param, cookie_nonce.as_deref(), current_session.as_ref())
        .await
    {
        Ok(session) => session,
        Err(e) => return deliver_error(&e),
    };

    let mut response = deliver_json(
        &CallbackResponse {
            status: "ok",
            user_id: session.user_id,
            session_id: session.id.clone(),
            expires_at: session.expires_at,
        },
        StatusCode::OK,
    )?;
    response.headers_mut().insert(
        header::SET_COOKIE,
        session_cookie(&session.id, state.session_lifetime_secs())?,
    );
    Ok(response)
}
