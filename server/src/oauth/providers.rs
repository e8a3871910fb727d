use serde::{Deserialize, Deserializer};
use tracing::{debug, error};

use shared::types::Platform;
use shared::types::server_config::ProviderSettings;

use crate::error::{AuthError, Result};

// ---------------------------------------------------------------------------
// Uniform identity projection
// ---------------------------------------------------------------------------

/// What every platform profile boils down to for account resolution:
/// the stable join key, a display name, an optional email, and the raw
/// profile document persisted on the link row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformIdentity {
    pub platform: Platform,
    pub platform_id: String,
    pub username: String,
    pub email: Option<String>,
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Per-platform profile documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinecraftProfile {
    pub id: String,
    pub name: String,
}

/// Closed union over the platform "who am I" documents, so the branch set
/// in the linking flow is exhaustive at compile time instead of an open
/// duck-typed payload.
#[derive(Debug, Clone)]
pub enum PlatformProfile {
    Discord(DiscordUser),
    Twitch(TwitchUser),
    Minecraft(MinecraftProfile),
}

impl PlatformProfile {
    /// Parse the raw profile document for one platform.
    ///
    /// Twitch wraps the user in `{"data": [user]}`; the other platforms
    /// return the object directly.
    pub fn parse(platform: Platform, raw: &serde_json::Value) -> Result<Self> {
        let parsed = match platform {
            Platform::Discord => {
                serde_json::from_value(raw.clone()).map(PlatformProfile::Discord)
            }
            Platform::Twitch => {
                let user = raw
                    .get("data")
                    .and_then(|d| d.get(0))
                    .cloned()
                    .unwrap_or_else(|| raw.clone());
                serde_json::from_value(user).map(PlatformProfile::Twitch)
            }
            Platform::Minecraft => {
                serde_json::from_value(raw.clone()).map(PlatformProfile::Minecraft)
            }
        };
        parsed.map_err(|e| {
            error!("Unparseable {} profile: {}", platform, e);
            AuthError::BadRequest
        })
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformProfile::Discord(_) => Platform::Discord,
            PlatformProfile::Twitch(_) => Platform::Twitch,
            PlatformProfile::Minecraft(_) => Platform::Minecraft,
        }
    }

    pub fn platform_id(&self) -> &str {
        match self {
            PlatformProfile::Discord(u) => &u.id,
            PlatformProfile::Twitch(u) => &u.id,
            PlatformProfile::Minecraft(p) => &p.id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            PlatformProfile::Discord(u) => u.global_name.as_deref().unwrap_or(&u.username),
            PlatformProfile::Twitch(u) => u.display_name.as_deref().unwrap_or(&u.login),
            PlatformProfile::Minecraft(p) => &p.name,
        }
    }

    /// Discord emails are only trusted when the platform marks them
    /// verified; Minecraft exposes no email at all.
    pub fn email(&self) -> Option<&str> {
        match self {
            PlatformProfile::Discord(u) if u.verified => u.email.as_deref(),
            PlatformProfile::Discord(_) => None,
            PlatformProfile::Twitch(u) => u.email.as_deref(),
            PlatformProfile::Minecraft(_) => None,
        }
    }

    /// Project into the uniform identity, carrying the raw document along
    /// for the link row's `data` column.
    pub fn into_identity(self, raw: serde_json::Value) -> Result<PlatformIdentity> {
        if self.platform_id().is_empty() {
            error!("{} profile carries an empty id", self.platform());
            return Err(AuthError::BadRequest);
        }
        Ok(PlatformIdentity {
            platform: self.platform(),
            platform_id: self.platform_id().to_string(),
            username: self.username().to_string(),
            email: self.email().map(String::from),
            raw,
        })
    }
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

/// The token-endpoint response, reduced to what the flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, deserialize_with = "scope_list")]
    pub scope: Vec<String>,
}

/// Discord returns `scope` as a bare string when exactly one scope was
/// granted; other platforms return a list.  Both normalize to a list here —
/// a bare string is not an error.
fn scope_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScopeField {
        List(Vec<String>),
        Single(String),
    }

    match Option::<ScopeField>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(ScopeField::List(list)) => Ok(list),
        Some(ScopeField::Single(s)) => {
            Ok(s.split_whitespace().map(String::from).collect())
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// One platform's OAuth endpoints plus our application credentials.
#[derive(Debug, Clone)]
pub struct Provider {
    pub platform: Platform,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    profile_url: String,
    scopes: &'static str,
}

struct Endpoints {
    auth: &'static str,
    token: &'static str,
    profile: &'static str,
    scopes: &'static str,
}

fn default_endpoints(platform: Platform) -> Endpoints {
    match platform {
        Platform::Discord => Endpoints {
            auth: "https://discord.com/oauth2/authorize",
            token: "https://discord.com/api/oauth2/token",
            profile: "https://discord.com/api/users/@me",
            scopes: "identify email",
        },
        Platform::Twitch => Endpoints {
            auth: "https://id.twitch.tv/oauth2/authorize",
            token: "https://id.twitch.tv/oauth2/token",
            profile: "https://api.twitch.tv/helix/users",
            scopes: "user:read:email",
        },
        Platform::Minecraft => Endpoints {
            auth: "https://login.live.com/oauth20_authorize.srf",
            token: "https://login.live.com/oauth20_token.srf",
            profile: "https://api.minecraftservices.com/minecraft/profile",
            scopes: "XboxLive.signin",
        },
    }
}

impl Provider {
    /// Build a provider from config, resolving the client secret from the
    /// environment first.  A platform with no resolvable secret never gets
    /// a provider — the config validator already made that a startup error.
    pub fn from_settings(platform: Platform, settings: &ProviderSettings) -> Result<Self> {
        let defaults = default_endpoints(platform);
        let client_secret = settings.resolved_client_secret(platform).ok_or_else(|| {
            AuthError::Internal(format!("no client secret configured for {platform}"))
        })?;
        Ok(Self {
            platform,
            client_id: settings.client_id.clone(),
            client_secret,
            redirect_uri: settings.redirect_uri.clone(),
            auth_url: settings.auth_url.clone().unwrap_or_else(|| defaults.auth.into()),
            token_url: settings.token_url.clone().unwrap_or_else(|| defaults.token.into()),
            profile_url: settings
                .profile_url
                .clone()
                .unwrap_or_else(|| defaults.profile.into()),
            scopes: defaults.scopes,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The authorization redirect carrying the encoded state blob.
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = form_urlencoded::Serializer::new(format!("{}?", self.auth_url));
        url.append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", self.scopes)
            .append_pair("state", state);
        url.finish()
    }

    /// Exchange the authorization code for an access token.
    pub async fn exchange_code(&self, http: &reqwest::Client, code: &str) -> Result<TokenGrant> {
        let response = http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("{} token endpoint unreachable: {}", self.platform, e);
                AuthError::BadRequest
            })?;

        if !response.status().is_success() {
            error!(
                "{} token exchange rejected: {}",
                self.platform,
                response.status()
            );
            return Err(AuthError::BadRequest);
        }

        let grant: TokenGrant = response.json().await.map_err(|e| {
            error!("{} token response unparseable: {}", self.platform, e);
            AuthError::BadRequest
        })?;
        debug!(
            "{} granted scopes: {:?}",
            self.platform, grant.scope
        );
        Ok(grant)
    }

    /// Call the platform's "who am I" API and project the result.
    pub async fn fetch_identity(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<PlatformIdentity> {
        let mut request = http.get(&self.profile_url).bearer_auth(access_token);
        if self.platform == Platform::Twitch {
            // Helix requires the application id alongside the user token.
            request = request.header("Client-Id", &self.client_id);
        }

        let response = request.send().await.map_err(|e| {
            error!("{} profile endpoint unreachable: {}", self.platform, e);
            AuthError::BadRequest
        })?;

        if !response.status().is_success() {
            error!(
                "{} profile fetch rejected: {}",
                self.platform,
                response.status()
            );
            return Err(AuthError::Unauthorized);
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            error!("{} profile response unparseable: {}", self.platform, e);
            AuthError::BadRequest
        })?;
        PlatformProfile::parse(self.platform, &raw)?.into_identity(raw)
    }
}
