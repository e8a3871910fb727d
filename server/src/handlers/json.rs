use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::error::AuthError;

/// Wrap a body in the boxed type every handler returns.
pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// Handlers use this instead of one-off serialization + response blocks.
pub fn deliver_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e: http::Error| anyhow!("Failed to build JSON response: {}", e))
}

/// Deliver an [`AuthError`] as its public JSON shape.  The body only ever
/// carries the generic per-class code and message; whatever detail the
/// variant holds stays in the logs.
pub fn deliver_error(err: &AuthError) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let status = err.status();
    if status.is_server_error() {
        error!("Delivering {} response: {}", status.as_u16(), err);
    } else {
        debug!("Delivering {} response: {}", status.as_u16(), err.code());
    }
    deliver_json(&err.to_response(), status)
}
