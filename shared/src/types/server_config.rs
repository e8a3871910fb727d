use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::types::account::Platform;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Lifetime of sessions issued at login / post-OAuth.  `0` issues
    /// never-expiring sessions (`expires_at = 0`).
    #[serde(default = "default_session_lifetime_hours")]
    pub session_lifetime_hours: u64,

    /// When a platform identity has no existing link but an account with a
    /// matching email exists, reuse that account instead of creating a new
    /// one.  This trusts the platform's email attribute; disable it for
    /// platforms whose emails are not verified.
    #[serde(default = "default_merge_by_email")]
    pub merge_by_email: bool,

    /// Roles granted to freshly created accounts.
    #[serde(default = "default_roles")]
    pub default_roles: Vec<String>,

    /// Process-wide secret mixed into every password hash in addition to
    /// the per-account salt.
    ///
    /// Prefer loading this via the `AUTH_PEPPER` environment variable.  This
    /// config field is the fallback for deployments that cannot inject env
    /// vars at runtime.
    ///
    /// **Minimum length:** 16 characters.
    /// **Rotation:** rotating the pepper invalidates every stored password
    /// hash; there is deliberately no silent fallback to an unpeppered hash.
    pub pepper: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperConfig {
    /// How often the expired-session sweep runs.
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval(),
        }
    }
}

/// Per-platform OAuth application settings.  Endpoint URLs default to the
/// platform's public endpoints and exist as fields so tests (and self-hosted
/// mocks) can point the flow elsewhere.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    /// Prefer the `<PLATFORM>_CLIENT_SECRET` env var; see
    /// [`ProviderSettings::resolved_client_secret`].
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    /// Keyed by platform name (`[oauth.discord]`, `[oauth.twitch]`, ...).
    /// A platform with no entry here simply cannot be used for login/link.
    #[serde(default)]
    pub oauth: HashMap<Platform, ProviderSettings>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:1337"`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Session lifetime in seconds; `0` means never-expiring sessions.
    pub fn session_lifetime_secs(&self) -> i64 {
        (self.session_lifetime_hours * 3600) as i64
    }

    /// Resolve the pepper with the `AUTH_PEPPER` env var taking priority
    /// over the config file field.
    ///
    /// Returns `None` when neither source is set — startup treats this as a
    /// hard error rather than degrading to an unpeppered hash.
    pub fn resolved_pepper(&self) -> Option<String> {
        std::env::var("AUTH_PEPPER")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.pepper.clone())
            .filter(|s| !s.is_empty())
    }
}

impl ProviderSettings {
    /// Resolve the client secret with `DISCORD_CLIENT_SECRET` /
    /// `TWITCH_CLIENT_SECRET` / `MINECRAFT_CLIENT_SECRET` taking priority
    /// over the config file field.
    pub fn resolved_client_secret(&self, platform: Platform) -> Option<String> {
        let var = format!("{}_CLIENT_SECRET", platform.as_str().to_uppercase());
        std::env::var(var)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.client_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_port() -> u16 {
    1337
}

pub fn default_session_lifetime_hours() -> u64 {
    24
}

pub fn default_merge_by_email() -> bool {
    true
}

pub fn default_roles() -> Vec<String> {
    vec!["member".to_string()]
}

pub fn default_reaper_interval() -> u64 {
    60
}
