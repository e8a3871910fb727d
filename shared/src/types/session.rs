use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// A named capability plus the value that parameterizes it.
///
/// The permission-string form is `name|value`, e.g. `petpictures|fluffy`.
/// A value of `"*"` is a convention only — nothing in the comparison treats
/// it as a wildcard (see [`Session::has_permission`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub value: String,
}

impl Scope {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Render as the `name|value` permission string stored on sessions.
    pub fn permission_string(&self) -> String {
        format!("{}|{}", self.name, self.value)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.value)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Ephemeral proof of authentication.
///
/// `permissions` is a **snapshot** computed once when the session is issued.
/// Changing the owning account's roles later does not touch live sessions;
/// the remediation path is revoking the user's sessions so new ones pick up
/// the new roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// UUID; doubles as the bearer token on the wire.
    pub id: String,
    pub user_id: i64,
    /// Permission strings in `name|value` form.  Order and duplicates are
    /// not normalized — callers must not rely on either.
    pub permissions: Vec<String>,
    pub issued_at: i64,
    pub last_used_at: i64,
    /// Unix seconds; `0` means the session never expires.
    pub expires_at: i64,
}

impl Session {
    /// Valid forever when `expires_at == 0`, otherwise valid strictly before
    /// the expiry instant.
    ///
    /// Callers must run this in addition to the store-level existence check:
    /// an expired row can still be returned during the reaping race window.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at == 0 || now < self.expires_at
    }

    /// Exact string match against the snapshot.  `"*"` values get no special
    /// treatment here: a session holding `petpictures|*` does NOT pass a
    /// check for `petpictures|fluffy`.
    pub fn has_permission(&self, scope: &Scope) -> bool {
        let wanted = scope.permission_string();
        self.permissions.iter().any(|p| *p == wanted)
    }

    /// Seconds until expiry, or `None` for never-expiring sessions.
    /// Already-expired sessions report `Some(0)`.
    pub fn remaining_secs(&self) -> Option<u64> {
        if self.expires_at == 0 {
            return None;
        }
        Some((self.expires_at - unix_now()).max(0) as u64)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={}, user_id={}, exp={}, perms={}",
            self.id,
            self.user_id,
            self.expires_at,
            self.permissions.len()
        )
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(permissions: Vec<&str>, expires_at: i64) -> Session {
        Session {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            user_id: 42,
            permissions: permissions.into_iter().map(String::from).collect(),
            issued_at: 1_700_000_000,
            last_used_at: 1_700_000_000,
            expires_at,
        }
    }

    #[test]
    fn zero_expiry_is_valid_forever() {
        let s = session_with(vec![], 0);
        assert!(s.is_valid_at(0));
        assert!(s.is_valid_at(i64::MAX));
    }

    #[test]
    fn expired_session_is_invalid() {
        let now = unix_now();
        assert!(!session_with(vec![], now - 1).is_valid());
        assert!(session_with(vec![], now + 60).is_valid());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let s = session_with(vec![], 1_000);
        assert!(s.is_valid_at(999));
        assert!(!s.is_valid_at(1_000));
    }

    #[test]
    fn has_permission_is_exact_match_only() {
        let s = session_with(vec!["ScopeA|*", "ScopeB|5"], 0);
        assert!(s.has_permission(&Scope::new("ScopeA", "*")));
        assert!(s.has_permission(&Scope::new("ScopeB", "5")));
        // No wildcard expansion — `*` is just a byte in the string.
        assert!(!s.has_permission(&Scope::new("ScopeA", "fluffy")));
        assert!(!s.has_permission(&Scope::new("ScopeB", "6")));
        assert!(!s.has_permission(&Scope::new("ScopeC", "*")));
    }

    #[test]
    fn scope_renders_pipe_separated() {
        assert_eq!(
            Scope::new("petpictures", "fluffy").permission_string(),
            "petpictures|fluffy"
        );
    }
}
