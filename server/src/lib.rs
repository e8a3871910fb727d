pub mod cache;
pub mod database;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod security;
pub mod service;

use std::sync::Arc;

use shared::types::server_config::AppConfig;

use crate::oauth::LinkOrchestrator;
use crate::service::{SessionService, UserService};

/// Everything a request handler needs, cloned per connection.  All members
/// are cheap handles over shared state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
    pub sessions: SessionService,
    pub oauth: LinkOrchestrator,
}

impl AppState {
    /// The lifetime for newly issued sessions, in seconds.  `0` means
    /// never-expiring.
    pub fn session_lifetime_secs(&self) -> i64 {
        (self.config.auth.session_lifetime_hours * 3600) as i64
    }
}
