use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{error, info};

use crate::AppState;
use crate::error::AuthError;
use crate::handlers::json::{deliver_error, deliver_json, full};
use crate::handlers::{auth, oauth};

#[derive(Debug, Serialize)]
struct LinksResponse {
    user_id: i64,
    links: Vec<shared::types::LinkedAccount>,
}

/// Top-level dispatch for every connection.  Handler failures that escape
/// as `anyhow` errors become opaque 500s; everything domain-shaped was
/// already rendered by the handler itself.
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!("{} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::POST, "/auth/login") => auth::handle_login(req, state).await,
        (&Method::POST, "/auth/register") => auth::handle_register(req, state).await,
        (&Method::POST, "/auth/logout") => auth::handle_logout(req, state).await,
        (&Method::GET, "/auth/session") => auth::handle_session(req, state).await,
        (&Method::GET, "/auth/links") => handle_links(req, state).await,
        (&Method::GET, "/auth/authorize") => oauth::handle_authorize(req, state).await,
        (&Method::GET, "/auth/callback") => oauth::handle_callback(req, state).await,
        (&Method::GET, "/health") => deliver_json(
            &serde_json::json!({"status": "ok"}),
            StatusCode::OK,
        ),
        _ => deliver_error(&AuthError::NotFound),
    };

    match result {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("Handler for {} {} failed: {:#}", method, path, e);
            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(full(Bytes::from_static(b"Internal Server Error")))
                .unwrap_or_else(|_| Response::new(full(Bytes::new()))))
        }
    }
}

/// GET /auth/links — the caller's linked platform identities.
async fn handle_links(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> anyhow::Result<Response<BoxBody<Bytes, Infallible>>> {
    let session = match auth::authenticate(req.headers(), &state).await {
        Ok(session) => session,
        Err(e) => return deliver_error(&e),
    };

    match state.users.links(session.user_id).await {
        Ok(links) => deliver_json(
            &LinksResponse {
                user_id: session.user_id,
                links,
            },
            StatusCode::OK,
        ),
        Err(e) => deliver_error(&e),
    }
}
