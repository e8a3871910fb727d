use serde::{Deserialize, Serialize};

/// Standard error response structure.
///
/// Handlers emit only the generic per-class message for an error; internal
/// detail (SQL errors, provider responses) goes to the logs, never here.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}
