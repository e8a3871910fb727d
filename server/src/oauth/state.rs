use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shared::types::Platform;

use crate::error::{AuthError, Result};

/// Whether an OAuth callback should log the user in or link the platform
/// identity to the already-authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Login,
    Link,
}

/// The opaque `state` blob carried through the authorization redirect.
///
/// Encoded as URL-safe base64 over JSON.  The `nonce` must match a value
/// the client received out-of-band (a short-lived cookie); the callback
/// verifies the round trip before anything touches the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBlob {
    pub platform: Platform,
    pub nonce: String,
    pub redirect_uri: String,
    pub mode: Mode,
}

impl StateBlob {
    pub fn new(platform: Platform, nonce: String, redirect_uri: String, mode: Mode) -> Self {
        Self {
            platform,
            nonce,
            redirect_uri,
            mode,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode and structurally validate an inbound `state` parameter.
    ///
    /// Fails closed: a decode failure or any empty field is the same
    /// generic `BadRequest` — the response never reveals which check
    /// tripped (detail goes to the debug log only).
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|e| {
            debug!("OAuth state is not valid base64: {}", e);
            AuthError::BadRequest
        })?;
        let blob: StateBlob = serde_json::from_slice(&bytes).map_err(|e| {
            debug!("OAuth state is not valid JSON: {}", e);
            AuthError::BadRequest
        })?;

        if blob.nonce.is_empty() || blob.redirect_uri.is_empty() {
            debug!("OAuth state has empty fields");
            return Err(AuthError::BadRequest);
        }
        Ok(blob)
    }

    /// Compare the blob's nonce against the value from the client's cookie.
    /// Missing cookie and mismatched nonce are indistinguishable to the
    /// caller of the endpoint.
    pub fn verify_nonce(&self, cookie_nonce: Option<&str>) -> Result<()> {
        match cookie_nonce {
            Some(cookie) if cookie == self.nonce => Ok(()),
            Some(_) => {
                debug!("OAuth nonce mismatch");
                Err(AuthError::BadRequest)
            }
            None => {
                debug!("OAuth nonce cookie missing");
                Err(AuthError::BadRequest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> StateBlob {
        StateBlob::new(
            Platform::Discord,
            "nonce-123".to_string(),
            "https://example.test/auth/callback".to_string(),
            Mode::Login,
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = blob();
        let decoded = StateBlob::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn tampered_state_fails_closed() {
        let mut encoded = blob().encode().unwrap();
        encoded.push('x');
        assert!(matches!(
            StateBlob::decode(&encoded),
            Err(AuthError::BadRequest)
        ));

        assert!(matches!(
            StateBlob::decode("definitely not base64 json!"),
            Err(AuthError::BadRequest)
        ));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let mut b = blob();
        b.nonce = String::new();
        let encoded = b.encode().unwrap();
        assert!(matches!(
            StateBlob::decode(&encoded),
            Err(AuthError::BadRequest)
        ));

        let mut b = blob();
        b.redirect_uri = String::new();
        let encoded = b.encode().unwrap();
        assert!(matches!(
            StateBlob::decode(&encoded),
            Err(AuthError::BadRequest)
        ));
    }

    #[test]
    fn nonce_roundtrip_must_match() {
        let b = blob();
        assert!(b.verify_nonce(Some("nonce-123")).is_ok());
        assert!(matches!(
            b.verify_nonce(Some("nonce-456")),
            Err(AuthError::BadRequest)
        ));
        assert!(matches!(b.verify_nonce(None), Err(AuthError::BadRequest)));
    }

    #[test]
    fn mode_serializes_lowercase() {
        let json = serde_json::to_string(&Mode::Link).unwrap();
        assert_eq!(json, r#""link""#);
    }
}
