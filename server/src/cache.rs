use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use shared::types::Session;

/// Fallback TTL for never-expiring sessions (`expires_at == 0`).  The durable
/// row is authoritative; the cache entry just has to live "long".
const NO_EXPIRY_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// In-process TTL cache for sessions, keyed by session id.
///
/// Entry lifetime mirrors the session's own expiry, so a cache hit can never
/// resurrect a session the durable reaper would have deleted.  Expired
/// entries are dropped lazily on read and can be swept with
/// [`SessionCache::purge_expired`].
#[derive(Clone, Debug)]
pub struct SessionCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    session: Session,
    expires: Instant,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a session; lazily evicts the entry when its TTL has passed.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let mut entries = self.inner.write().await;
        match entries.get(session_id) {
            Some(entry) if entry.expired(Instant::now()) => {
                entries.remove(session_id);
                None
            }
            Some(entry) => Some(entry.session.clone()),
            None => None,
        }
    }

    /// Insert or overwrite an entry with TTL = time remaining until the
    /// session's `expires_at` (long default when it never expires).
    /// Already-expired sessions are not cached at all.
    pub async fn insert(&self, session: Session) {
        let ttl = match session.remaining_secs() {
            None => NO_EXPIRY_TTL,
            Some(0) => {
                debug!("Not caching already-expired session {}", session.id);
                return;
            }
            Some(secs) => Duration::from_secs(secs),
        };
        let entry = CacheEntry {
            expires: Instant::now() + ttl,
            session,
        };
        self.inner.write().await.insert(entry.session.id.clone(), entry);
    }

    pub async fn remove(&self, session_id: &str) {
        self.inner.write().await.remove(session_id);
    }

    /// Drop every entry owned by one user (session revocation).
    pub async fn remove_for_user(&self, user_id: i64) {
        self.inner
            .write()
            .await
            .retain(|_, entry| entry.session.user_id != user_id);
    }

    /// Drop entries whose TTL has passed.  Run by the periodic reaper next
    /// to the durable sweep.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        before - entries.len()
    }

    /// Drop everything.  Exists for tests exercising the durable fallback.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
