use std::sync::Arc;

use tokio_rusqlite::Connection;
use tracing::{info, warn};

use shared::types::{Account, LinkedAccount};

use crate::database::accounts as accounts_db;
use crate::database::links as links_db;
use crate::database::utils::{generate_user_id, get_timestamp};
use crate::error::{AuthError, Result};
use crate::oauth::providers::PlatformIdentity;
use crate::security::CredentialEngine;

/// Orchestrates the account and link stores: registration, password
/// verification, and the identity lookup/creation/merging the OAuth flow
/// resolves through.
///
/// Account and link writes are deliberately not wrapped in a transaction;
/// this service sequences them and tolerates partial failure (an account
/// whose link creation failed is an orphan for operators to reconcile, not
/// something to auto-roll-back).
#[derive(Clone)]
pub struct UserService {
    db: Connection,
    credentials: Arc<CredentialEngine>,
    /// Reuse an existing account with a matching email when a platform
    /// identity has no link yet.  Trusts the platform's email attribute —
    /// see the config docs before enabling for unverified-email platforms.
    merge_by_email: bool,
    default_roles: Vec<String>,
}

impl UserService {
    pub fn new(
        db: Connection,
        credentials: Arc<CredentialEngine>,
        merge_by_email: bool,
        default_roles: Vec<String>,
    ) -> Self {
        Self {
            db,
            credentials,
            merge_by_email,
            default_roles,
        }
    }

    pub async fn get(&self, user_id: i64) -> Result<Account> {
        accounts_db::get_account_by_id(&self.db, user_id).await
    }

    pub async fn links(&self, user_id: i64) -> Result<Vec<LinkedAccount>> {
        links_db::get_links_for_user(&self.db, user_id).await
    }

    // -----------------------------------------------------------------------
    // Registration + password login
    // -----------------------------------------------------------------------

    /// Create a password account.  Email is required for password accounts —
    /// only OAuth-bootstrapped accounts may go without a contact method.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Account> {
        if !is_valid_username(username) || !is_valid_email(email) {
            return Err(AuthError::BadRequest);
        }
        if !is_strong_password(password) {
            return Err(AuthError::BadRequest);
        }

        let cred = self
            .credentials
            .hash(password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let account = Account {
            user_id: generate_user_id(),
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            hashed_secret: Some(cred.hashed_secret),
            salt: Some(cred.salt),
            roles: self.default_roles.clone(),
            created_at: get_timestamp(),
            last_login: None,
        };
        accounts_db::create_account(&self.db, account.clone()).await?;

        info!("Registered account {} ({})", account.user_id, username);
        Ok(account)
    }

    /// Verify a password login.  Unknown user and wrong password are the
    /// same `Unauthorized` — the response must not reveal which.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<Account> {
        let account = match accounts_db::get_account_by_username(&self.db, username.to_string())
            .await
        {
            Ok(account) => account,
            Err(AuthError::NotFound) => return Err(AuthError::Unauthorized),
            Err(other) => return Err(other),
        };

        // Password-less accounts fall through to `false` here by contract.
        let ok = self.credentials.verify(
            password,
            account.salt.as_deref(),
            account.hashed_secret.as_deref(),
        );
        if !ok {
            warn!("Failed password login for {}", username);
            return Err(AuthError::Unauthorized);
        }

        self.touch_last_login(account.user_id).await;
        Ok(account)
    }

    // -----------------------------------------------------------------------
    // OAuth identity resolution
    // -----------------------------------------------------------------------

    /// Resolve a platform identity for `login` mode.
    ///
    /// Link exists → load the owner and refresh the stored profile.
    /// No link, matching email (policy permitting) → merge into that account.
    /// Otherwise → bootstrap a fresh password-less account and link it.
    pub async fn resolve_login(&self, identity: &PlatformIdentity) -> Result<Account> {
        match links_db::get_link_by_platform_id(
            &self.db,
            identity.platform,
            identity.platform_id.clone(),
        )
        .await
        {
            Ok(link) => {
                let account = accounts_db::get_account_by_id(&self.db, link.user_id).await?;
                self.refresh_link(link, identity).await?;
                self.touch_last_login(account.user_id).await;
                return Ok(account);
            }
            Err(AuthError::NotFound) => {}
            Err(other) => return Err(other),
        }

        if let Some(account) = self.merge_candidate(identity).await? {
            info!(
                "Merging {} identity {} into existing account {} by email",
                identity.platform, identity.platform_id, account.user_id
            );
            self.attach_link(account.user_id, identity).await?;
            self.touch_last_login(account.user_id).await;
            return Ok(account);
        }

        self.bootstrap_account(identity).await
    }

    /// Resolve a platform identity for `link` mode: bind it to an already
    /// authenticated user.  An identity owned by a *different* user is a
    /// `Conflict` and the existing row is left untouched.
    pub async fn link_to_user(&self, user_id: i64, identity: &PlatformIdentity) -> Result<Account> {
        match links_db::get_link_by_platform_id(
            &self.db,
            identity.platform,
            identity.platform_id.clone(),
        )
        .await
        {
            Ok(link) if link.user_id != user_id => {
                return Err(AuthError::conflict(
                    "platform account already linked to another account",
                ));
            }
            Ok(link) => {
                // Already ours: just refresh the stored profile.
                self.refresh_link(link, identity).await?;
                return accounts_db::get_account_by_id(&self.db, user_id).await;
            }
            Err(AuthError::NotFound) => {}
            Err(other) => return Err(other),
        }

        // The user may be re-linking this platform under a new platform
        // identity; replace their existing row if so, else create one.
        match links_db::get_link_for_user(&self.db, user_id, identity.platform).await {
            Ok(existing) => self.refresh_link(existing, identity).await?,
            Err(AuthError::NotFound) => self.attach_link(user_id, identity).await?,
            Err(other) => return Err(other),
        }
        accounts_db::get_account_by_id(&self.db, user_id).await
    }

    /// Email-merge lookup, behind its policy toggle.  Platforms that return
    /// no email never merge.
    async fn merge_candidate(&self, identity: &PlatformIdentity) -> Result<Option<Account>> {
        if !self.merge_by_email {
            return Ok(None);
        }
        let Some(email) = identity.email.as_deref() else {
            return Ok(None);
        };
        match accounts_db::get_account_by_email(&self.db, email.to_string()).await {
            Ok(account) => Ok(Some(account)),
            Err(AuthError::NotFound) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Create a password-less account seeded from the platform profile,
    /// then link it.  If the link insert fails after the account insert
    /// succeeded, the orphaned account stands — reconciliation is an
    /// operator concern, not an auto-rollback.
    async fn bootstrap_account(&self, identity: &PlatformIdentity) -> Result<Account> {
        let account = Account {
            user_id: generate_user_id(),
            username: Some(identity.username.clone()),
            email: identity.email.clone(),
            hashed_secret: None,
            salt: None,
            roles: self.default_roles.clone(),
            created_at: get_timestamp(),
            last_login: Some(get_timestamp()),
        };
        accounts_db::create_account(&self.db, account.clone()).await?;

        if let Err(e) = self.attach_link(account.user_id, identity).await {
            warn!(
                "Account {} created but linking {} identity {} failed: {} — orphaned account left for reconciliation",
                account.user_id, identity.platform, identity.platform_id, e
            );
            return Err(e);
        }

        info!(
            "Bootstrapped password-less account {} from {} identity {}",
            account.user_id, identity.platform, identity.platform_id
        );
        Ok(account)
    }

    /// Insert a link row.  A racing create resolves through the unique
    /// constraint: the loser gets `Conflict` and must re-fetch rather than
    /// retry the insert.
    async fn attach_link(&self, user_id: i64, identity: &PlatformIdentity) -> Result<()> {
        let now = get_timestamp();
        links_db::create_link(
            &self.db,
            LinkedAccount {
                user_id,
                platform: identity.platform,
                platform_id: identity.platform_id.clone(),
                platform_username: Some(identity.username.clone()),
                data: identity.raw.clone(),
                data_updated_at: now,
                created_at: now,
            },
        )
        .await
    }

    /// Overwrite the advisory fields of an existing link with the
    /// just-fetched profile.
    async fn refresh_link(&self, link: LinkedAccount, identity: &PlatformIdentity) -> Result<()> {
        links_db::update_link(
            &self.db,
            LinkedAccount {
                platform_id: identity.platform_id.clone(),
                platform_username: Some(identity.username.clone()),
                data: identity.raw.clone(),
                data_updated_at: get_timestamp(),
                ..link
            },
        )
        .await
    }

    async fn touch_last_login(&self, user_id: i64) {
        // Best-effort; a login must not fail over a bookkeeping column.
        if let Err(e) = accounts_db::update_last_login(&self.db, user_id, get_timestamp()).await {
            warn!("Failed to update last_login for {}: {}", user_id, e);
        }
    }

    // -----------------------------------------------------------------------
    // Role management
    // -----------------------------------------------------------------------

    /// Add a role.  Live sessions keep their permission snapshot; pair with
    /// `SessionService::revoke_all` when the change must apply immediately.
    pub async fn grant_role(&self, user_id: i64, role: &str) -> Result<Account> {
        let mut account = accounts_db::get_account_by_id(&self.db, user_id).await?;
        if !account.has_role(role) {
            account.roles.push(role.to_string());
            accounts_db::update_account(&self.db, account.clone()).await?;
        }
        Ok(account)
    }

    pub async fn revoke_role(&self, user_id: i64, role: &str) -> Result<Account> {
        let mut account = accounts_db::get_account_by_id(&self.db, user_id).await?;
        account.roles.retain(|r| r != role);
        accounts_db::update_account(&self.db, account.clone()).await?;
        Ok(account)
    }

    /// Delete the account; the schema cascades to links and sessions.
    pub async fn delete(&self, user_id: i64) -> Result<()> {
        accounts_db::delete_account(&self.db, user_id).await
    }
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Validate email format (basic validation)
fn is_valid_email(email: &str) -> bool {
    email.contains('@') && email.contains('.') && email.len() > 3
}

/// Validate username (alphanumeric, underscore, 3-20 chars)
fn is_valid_username(username: &str) -> bool {
    if username.len() < 3 || username.len() > 20 {
        return false;
    }
    username.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Validate password strength (min 8 chars, at least one number, one letter)
fn is_strong_password(password: &str) -> bool {
    if password.len() < 8 {
        return false;
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_number = password.chars().any(|c| c.is_numeric());
    has_letter && has_number
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create::create_tables;
    use shared::types::Platform;

    fn identity(platform: Platform, platform_id: &str, email: Option<&str>) -> PlatformIdentity {
        PlatformIdentity {
            platform,
            platform_id: platform_id.to_string(),
            username: format!("user-{platform_id}"),
            email: email.map(String::from),
            raw: serde_json::json!({ "id": platform_id }),
        }
    }

    async fn service(merge_by_email: bool) -> UserService {
        let conn = Connection::open_in_memory().await.unwrap();
        create_tables(&conn).await.unwrap();
        UserService::new(
            conn,
            Arc::new(CredentialEngine::new("test-pepper-0123456789").unwrap()),
            merge_by_email,
            vec!["member".to_string()],
        )
    }

    #[tokio::test]
    async fn register_then_password_login() {
        let users = service(true).await;
        let account = users
            .register("aurora", "aurora@example.test", "hunter2hunter2")
            .await
            .unwrap();
        assert!(account.has_credentials());
        assert_eq!(account.roles, vec!["member".to_string()]);

        let verified = users.verify_password("aurora", "hunter2hunter2").await.unwrap();
        assert_eq!(verified.user_id, account.user_id);

        assert!(matches!(
            users.verify_password("aurora", "wrong-password1").await,
            Err(AuthError::Unauthorized)
        ));
        // Unknown user is indistinguishable from a wrong password.
        assert!(matches!(
            users.verify_password("nobody", "hunter2hunter2").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let users = service(true).await;
        for (username, email, password) in [
            ("ab", "ok@example.test", "hunter2hunter2"),      // username too short
            ("aurora", "not-an-email", "hunter2hunter2"),     // bad email
            ("aurora", "ok@example.test", "short1"),          // weak password
            ("aurora", "ok@example.test", "nodigitshere"),    // no digit
        ] {
            assert!(
                matches!(
                    users.register(username, email, password).await,
                    Err(AuthError::BadRequest)
                ),
                "accepted ({username}, {email}, {password})"
            );
        }
    }

    #[tokio::test]
    async fn login_bootstraps_a_passwordless_account() {
        let users = service(true).await;
        let id = identity(Platform::Minecraft, "uuid-1", None);
        let account = users.resolve_login(&id).await.unwrap();

        assert!(!account.has_credentials());
        assert_eq!(account.username.as_deref(), Some("user-uuid-1"));

        // Second login resolves to the same account through the link.
        let again = users.resolve_login(&id).await.unwrap();
        assert_eq!(again.user_id, account.user_id);
    }

    #[tokio::test]
    async fn login_merges_into_existing_account_by_email() {
        let users = service(true).await;
        let existing = users
            .register("aurora", "aurora@example.test", "hunter2hunter2")
            .await
            .unwrap();

        let id = identity(Platform::Discord, "disc-9", Some("aurora@example.test"));
        let resolved = users.resolve_login(&id).await.unwrap();

        // Attached to the existing account, no second account created.
        assert_eq!(resolved.user_id, existing.user_id);
        let link = users.links(existing.user_id).await.unwrap();
        assert_eq!(link.len(), 1);
        assert_eq!(link[0].platform_id, "disc-9");
    }

    #[tokio::test]
    async fn merge_policy_off_creates_a_separate_account() {
        let users = service(false).await;
        let existing = users
            .register("aurora", "aurora@example.test", "hunter2hunter2")
            .await
            .unwrap();

        // Same email, but the merge policy is disabled.  The bootstrap tries
        // to reuse the email and hits the unique constraint — surfacing a
        // Conflict instead of silently conflating the identities.
        let id = identity(Platform::Discord, "disc-9", Some("aurora@example.test"));
        let err = users.resolve_login(&id).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        // The existing account is untouched.
        let account = users.get(existing.user_id).await.unwrap();
        assert_eq!(account.email.as_deref(), Some("aurora@example.test"));
    }

    #[tokio::test]
    async fn linking_an_identity_owned_by_someone_else_is_conflict() {
        let users = service(true).await;
        let id = identity(Platform::Twitch, "tw-1", None);
        let owner = users.resolve_login(&id).await.unwrap();

        let other = users
            .register("rival", "rival@example.test", "hunter2hunter2")
            .await
            .unwrap();
        let err = users.link_to_user(other.user_id, &id).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        // The original row is unchanged.
        let links = users.links(owner.user_id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].user_id, owner.user_id);
    }

    #[tokio::test]
    async fn linking_to_yourself_refreshes_the_profile() {
        let users = service(true).await;
        let id = identity(Platform::Twitch, "tw-1", None);
        let owner = users.resolve_login(&id).await.unwrap();

        let mut refreshed = id.clone();
        refreshed.username = "NewDisplayName".to_string();
        users.link_to_user(owner.user_id, &refreshed).await.unwrap();

        let links = users.links(owner.user_id).await.unwrap();
        assert_eq!(links[0].platform_username.as_deref(), Some("NewDisplayName"));
    }

    #[tokio::test]
    async fn role_changes_do_not_rewrite_history() {
        let users = service(true).await;
        let account = users
            .register("aurora", "aurora@example.test", "hunter2hunter2")
            .await
            .unwrap();

        let granted = users.grant_role(account.user_id, "keeper").await.unwrap();
        assert!(granted.has_role("keeper"));
        // Granting twice is idempotent.
        let again = users.grant_role(account.user_id, "keeper").await.unwrap();
        assert_eq!(
            again.roles.iter().filter(|r| *r == "keeper").count(),
            1
        );

        let revoked = users.revoke_role(account.user_id, "keeper").await.unwrap();
        assert!(!revoked.has_role("keeper"));
    }
}
