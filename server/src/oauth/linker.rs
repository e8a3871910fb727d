use std::collections::HashMap;

use tracing::{debug, info};

use shared::types::{Platform, Session};

use crate::database::utils::generate_nonce;
use crate::error::{AuthError, Result};
use crate::oauth::providers::Provider;
use crate::oauth::state::{Mode, StateBlob};
use crate::service::sessions::SessionService;
use crate::service::users::UserService;

/// The authorization redirect handed back from [`LinkOrchestrator::begin`]:
/// the URL to send the browser to, plus the nonce the caller must set as a
/// short-lived cookie for the callback to verify.
#[derive(Debug, Clone)]
pub struct BeginFlow {
    pub authorize_url: String,
    pub nonce: String,
}

/// Drives the full authorization-code flow across the configured platforms:
/// build the redirect, then on callback verify the state round trip,
/// exchange the code, fetch the identity, and resolve it to an account and
/// a fresh session.
///
/// All state validation happens before anything touches the platform's
/// network endpoints, so a forged callback costs nothing upstream.
#[derive(Clone)]
pub struct LinkOrchestrator {
    providers: HashMap<Platform, Provider>,
    http: reqwest::Client,
    users: UserService,
    sessions: SessionService,
    session_lifetime_secs: i64,
}

impl LinkOrchestrator {
    pub fn new(
        providers: HashMap<Platform, Provider>,
        users: UserService,
        sessions: SessionService,
        session_lifetime_secs: i64,
    ) -> Self {
        Self {
            providers,
            http: reqwest::Client::new(),
            users,
            sessions,
            session_lifetime_secs,
        }
    }

    pub fn is_configured(&self, platform: Platform) -> bool {
        self.providers.contains_key(&platform)
    }

    fn provider(&self, platform: Platform) -> Result<&Provider> {
        self.providers.get(&platform).ok_or_else(|| {
            debug!("No provider configured for {}", platform);
            AuthError::BadRequest
        })
    }

    /// Start a flow: mint a nonce, encode the state blob, and build the
    /// platform's authorization URL.
    pub fn begin(&self, platform: Platform, mode: Mode) -> Result<BeginFlow> {
        let provider = self.provider(platform)?;
        let nonce = generate_nonce();
        let state = StateBlob::new(
            platform,
            nonce.clone(),
            provider.redirect_uri().to_string(),
            mode,
        )
        .encode()?;

        Ok(BeginFlow {
            authorize_url: provider.authorize_url(&state),
            nonce,
        })
    }

    /// Finish a flow from the callback request.
    ///
    /// `state_param` is the raw `state` query parameter, `cookie_nonce` the
    /// value of the nonce cookie if the client sent one, and
    /// `current_session` the caller's authenticated session when one exists
    /// (required for `link` mode, ignored for `login` mode).
    pub async fn complete(
        &self,
        code: &str,
        state_param: &str,
        cookie_nonce: Option<&str>,
        current_session: Option<&Session>,
    ) -> Result<Session> {
        let state = StateBlob::decode(state_param)?;
        state.verify_nonce(cookie_nonce)?;
        let provider = self.provider(state.platform)?;

        if code.is_empty() {
            debug!("OAuth callback with empty code");
            return Err(AuthError::BadRequest);
        }

        let grant = provider.exchange_code(&self.http, code).await?;
        let identity = provider
            .fetch_identity(&self.http, &grant.access_token)
            .await?;

        let account = match state.mode {
            Mode::Login => self.users.resolve_login(&identity).await?,
            Mode::Link => {
                let session = current_session.ok_or(AuthError::Unauthorized)?;
                self.users.link_to_user(session.user_id, &identity).await?
            }
        };

        info!(
            "Completed {} {:?} flow for user {}",
            identity.platform, state.mode, account.user_id
        );
        self.sessions.issue(&account, self.session_lifetime_secs).await
    }
}
