use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The third-party identity platforms an account can be linked to.
///
/// Closed set on purpose: the linking orchestrator branches on this enum and
/// a new platform must be added here (and given an OAuth provider config)
/// before any code path can produce a link for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Twitch,
    Minecraft,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Twitch => "twitch",
            Platform::Minecraft => "minecraft",
        }
    }

    pub const ALL: [Platform; 3] = [Platform::Discord, Platform::Twitch, Platform::Minecraft];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discord" => Ok(Platform::Discord),
            "twitch" => Ok(Platform::Twitch),
            "minecraft" => Ok(Platform::Minecraft),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One row in `accounts` — one human identity.
///
/// `hashed_secret` and `salt` are both present for password accounts and
/// both absent for accounts bootstrapped purely through OAuth linking.
/// Password verification treats an absent pair as "never matches" rather
/// than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Time-sortable snowflake-style id; immutable after creation.
    pub user_id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_secret: Option<String>,
    pub salt: Option<String>,
    /// Role names; order carries no meaning, duplicates carry no meaning.
    pub roles: Vec<String>,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

impl Account {
    /// Whether this is a password account (both credential fields present).
    pub fn has_credentials(&self) -> bool {
        self.hashed_secret.is_some() && self.salt.is_some()
    }

    /// The stored `(hashed_secret, salt)` pair, or `None` for password-less
    /// accounts.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.hashed_secret, &self.salt) {
            (Some(hash), Some(salt)) => Some((hash.as_str(), salt.as_str())),
            _ => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user_id={}, username={:?}, roles={:?}",
            self.user_id, self.username, self.roles
        )
    }
}

// ---------------------------------------------------------------------------
// LinkedAccount
// ---------------------------------------------------------------------------

/// The join record binding one external platform identity to one internal
/// account.  Unique per `(user_id, platform)` and per `(platform,
/// platform_id)` — a platform identity can never be linked to two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub user_id: i64,
    pub platform: Platform,
    /// Stable join key assigned by the platform.
    pub platform_id: String,
    /// Display name on the platform; advisory, refreshed on every login.
    pub platform_username: Option<String>,
    /// Last-fetched platform profile, stored verbatim.
    pub data: serde_json::Value,
    pub data_updated_at: i64,
    pub created_at: i64,
}

impl fmt::Display for LinkedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user_id={}, platform={}, platform_id={}",
            self.user_id, self.platform, self.platform_id
        )
    }
}
