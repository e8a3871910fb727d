use std::sync::Arc;

use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use shared::types::{Account, Session};

use crate::cache::SessionCache;
use crate::database::sessions as db;
use crate::database::utils::{generate_session_id, get_timestamp};
use crate::error::{AuthError, Result};
use crate::security::PermissionCatalog;

/// Orchestrates the durable session table and the TTL cache.
///
/// The policy, in one place:
///   - reads go cache-first with a durable fallback that repopulates the
///     cache;
///   - writes go durable-first, and only reach the cache once the durable
///     write succeeded, so the cache can never claim a session the table
///     does not have;
///   - deletes go durable-first too, and always attempt the cache delete
///     even when zero durable rows were affected.
///
/// The cache and the table are independent failure domains: a durable
/// failure surfaces as `StoreUnavailable`, never as a silent "no session".
#[derive(Clone)]
pub struct SessionService {
    db: Connection,
    cache: SessionCache,
    catalog: Arc<PermissionCatalog>,
}

impl SessionService {
    pub fn new(db: Connection, cache: SessionCache, catalog: Arc<PermissionCatalog>) -> Self {
        Self { db, cache, catalog }
    }

    /// Issue a new session for an account: snapshot the permissions from the
    /// account's roles, then persist.  `lifetime_secs == 0` issues a
    /// never-expiring session.
    pub async fn issue(&self, account: &Account, lifetime_secs: i64) -> Result<Session> {
        let now = get_timestamp();
        let expires_at = if lifetime_secs == 0 {
            0
        } else {
            now + lifetime_secs
        };

        let session = Session {
            id: generate_session_id(),
            user_id: account.user_id,
            permissions: self.catalog.expand_roles(&account.roles),
            issued_at: now,
            last_used_at: now,
            expires_at,
        };
        self.create(session.clone()).await?;

        info!(
            "Issued session {} for user {} ({} permissions)",
            session.id,
            session.user_id,
            session.permissions.len()
        );
        Ok(session)
    }

    /// Durable insert first; the cache is only populated on success so no
    /// orphaned cache entry can exist for a session the table rejected.
    pub async fn create(&self, session: Session) -> Result<()> {
        db::insert_session(&self.db, session.clone()).await?;
        self.cache.insert(session).await;
        Ok(())
    }

    /// Cache-aside read: cache hit wins, a durable hit repopulates the
    /// cache, a durable miss is `NotFound`, a durable failure is
    /// `StoreUnavailable`.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        if let Some(session) = self.cache.get(session_id).await {
            return Ok(session);
        }

        match db::get_session(&self.db, session_id.to_string()).await? {
            Some(session) => {
                self.cache.insert(session.clone()).await;
                Ok(session)
            }
            None => Err(AuthError::NotFound),
        }
    }

    /// Durable full-replace first, then overwrite the cache entry.
    ///
    /// A session carrying the zero owner-id sentinel after the update is a
    /// store-level no-op and is deliberately not propagated to the cache.
    pub async fn update(&self, session: Session) -> Result<()> {
        let affected = db::replace_session(&self.db, session.clone()).await?;
        if affected == 0 {
            return Err(AuthError::NotFound);
        }

        if session.user_id == 0 {
            debug!("Skipping cache write for no-op session {}", session.id);
            return Ok(());
        }
        self.cache.insert(session).await;
        Ok(())
    }

    /// Bump `last_used_at` after a successful validation.
    pub async fn touch(&self, session_id: &str) -> Result<Session> {
        let mut session = self.get(session_id).await?;
        session.last_used_at = get_timestamp();
        self.update(session.clone()).await?;
        Ok(session)
    }

    /// Durable delete first (bounding the cache-stale window), then always
    /// the cache delete — even a zero-row durable delete must not leave a
    /// cache entry behind.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let affected = db::delete_session(&self.db, session_id.to_string()).await;
        self.cache.remove(session_id).await;
        if affected? == 0 {
            debug!("Delete for unknown session {}", session_id);
        }
        Ok(())
    }

    /// Delete every session owned by a user — the remediation path for
    /// stale permission snapshots after a role change, and for bans.
    pub async fn revoke_all(&self, user_id: i64) -> Result<usize> {
        let affected = db::delete_sessions_for_user(&self.db, user_id).await;
        self.cache.remove_for_user(user_id).await;
        let affected = affected?;
        info!("Revoked {} session(s) for user {}", affected, user_id);
        Ok(affected)
    }

    /// One sweep of the expired-session reaper: durable DELETE-by-predicate
    /// plus the matching cache purge.  Safe to run concurrently; errors are
    /// the caller's to log, never to escalate.
    pub async fn reap_expired(&self) -> Result<usize> {
        let reaped = db::reap_expired_sessions(&self.db, get_timestamp()).await?;
        let purged = self.cache.purge_expired().await;
        if reaped > 0 || purged > 0 {
            debug!("Reaped {} durable / {} cached session(s)", reaped, purged);
        }
        Ok(reaped)
    }

    /// Validate a bearer session: it must exist *and* be unexpired.  An
    /// expired row that survived into the reaping race window is rejected
    /// here and cleaned up opportunistically.
    pub async fn validate(&self, session_id: &str) -> Result<Session> {
        let session = match self.get(session_id).await {
            Ok(session) => session,
            Err(AuthError::NotFound) => return Err(AuthError::Unauthorized),
            Err(other) => return Err(other),
        };

        if !session.is_valid() {
            warn!("Rejected expired session {}", session.id);
            // Best-effort cleanup; the reaper would get it eventually.
            if let Err(e) = self.delete(&session.id).await {
                warn!("Failed to delete expired session: {}", e);
            }
            return Err(AuthError::Unauthorized);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::accounts::create_account;
    use crate::database::create::create_tables;
    use crate::database::utils::generate_user_id;
    use crate::security::PermissionCatalog;

    async fn service() -> (SessionService, Account) {
        let conn = Connection::open_in_memory().await.unwrap();
        create_tables(&conn).await.unwrap();

        let account = Account {
            user_id: generate_user_id(),
            username: Some("aurora".to_string()),
            email: Some("aurora@example.test".to_string()),
            hashed_secret: None,
            salt: None,
            roles: vec!["member".to_string()],
            created_at: get_timestamp(),
            last_login: None,
        };
        create_account(&conn, account.clone()).await.unwrap();

        let service = SessionService::new(
            conn,
            SessionCache::new(),
            Arc::new(PermissionCatalog::builtin()),
        );
        (service, account)
    }

    #[tokio::test]
    async fn issue_snapshots_permissions_from_roles() {
        let (service, account) = service().await;
        let session = service.issue(&account, 24 * 3600).await.unwrap();
        assert_eq!(session.user_id, account.user_id);
        assert!(session.permissions.contains(&"beenames|generate".to_string()));
        assert!(session.expires_at > get_timestamp());
    }

    #[tokio::test]
    async fn get_survives_a_cache_flush() {
        let (service, account) = service().await;
        let session = service.issue(&account, 3600).await.unwrap();

        // Flush the cache: the durable fallback must round-trip the exact
        // session and repopulate the cache.
        service.cache.clear().await;
        let fetched = service.get(&session.id).await.unwrap();
        assert_eq!(fetched, session);
        assert_eq!(service.cache.len().await, 1);
    }

    #[tokio::test]
    async fn delete_clears_both_layers() {
        let (service, account) = service().await;
        let session = service.issue(&account, 3600).await.unwrap();

        service.delete(&session.id).await.unwrap();
        assert!(matches!(
            service.get(&session.id).await,
            Err(AuthError::NotFound)
        ));
        assert_eq!(service.cache.get(&session.id).await, None);

        // Deleting again is still Ok — cleanup is best-effort.
        service.delete(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn update_with_zero_owner_skips_the_cache() {
        let (service, account) = service().await;
        let mut session = service.issue(&account, 3600).await.unwrap();
        service.cache.clear().await;

        session.user_id = 0;
        service.update(session.clone()).await.unwrap();

        // Durable row updated, cache untouched by the sentinel.
        assert_eq!(service.cache.get(&session.id).await, None);
        let durable = db::get_session(&service.db, session.id.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(durable.user_id, 0);
    }

    #[tokio::test]
    async fn update_of_missing_session_is_not_found() {
        let (service, account) = service().await;
        let mut session = service.issue(&account, 3600).await.unwrap();
        service.delete(&session.id).await.unwrap();

        session.last_used_at += 1;
        assert!(matches!(
            service.update(session).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn validate_rejects_expired_sessions_found_in_the_race_window() {
        let (service, account) = service().await;

        // Insert an already-expired row directly, bypassing the cache —
        // exactly what a row surviving between reaper sweeps looks like.
        let session = Session {
            id: generate_session_id(),
            user_id: account.user_id,
            permissions: vec![],
            issued_at: get_timestamp() - 200,
            last_used_at: get_timestamp() - 200,
            expires_at: get_timestamp() - 100,
        };
        db::insert_session(&service.db, session.clone()).await.unwrap();

        assert!(matches!(
            service.validate(&session.id).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn reap_removes_expired_rows_and_spares_the_rest() {
        let (service, account) = service().await;
        let live = service.issue(&account, 3600).await.unwrap();
        let forever = service.issue(&account, 0).await.unwrap();

        let expired = Session {
            id: generate_session_id(),
            user_id: account.user_id,
            permissions: vec![],
            issued_at: get_timestamp() - 200,
            last_used_at: get_timestamp() - 200,
            expires_at: get_timestamp() - 100,
        };
        db::insert_session(&service.db, expired.clone()).await.unwrap();

        assert_eq!(service.reap_expired().await.unwrap(), 1);
        assert!(db::get_session(&service.db, expired.id).await.unwrap().is_none());
        assert!(service.get(&live.id).await.is_ok());
        assert!(service.get(&forever.id).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_all_clears_durable_rows_and_cache() {
        let (service, account) = service().await;
        let a = service.issue(&account, 3600).await.unwrap();
        let b = service.issue(&account, 0).await.unwrap();

        assert_eq!(service.revoke_all(account.user_id).await.unwrap(), 2);
        for id in [&a.id, &b.id] {
            assert!(matches!(service.get(id).await, Err(AuthError::NotFound)));
            assert_eq!(service.cache.get(id).await, None);
        }
    }

    #[tokio::test]
    async fn snapshot_stays_stale_until_reissue() {
        let (service, mut account) = service().await;
        let session = service.issue(&account, 3600).await.unwrap();
        let before = session.permissions.clone();

        // Role change after issuance must not touch the live session.
        account.roles.push("admin".to_string());
        let fetched = service.get(&session.id).await.unwrap();
        assert_eq!(fetched.permissions, before);

        // A newly issued session picks up the new roles.
        let fresh = service.issue(&account, 3600).await.unwrap();
        assert!(fresh.permissions.contains(&"accounts|*".to_string()));
    }
}
