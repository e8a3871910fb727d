use tokio_rusqlite::{Connection, OptionalExtension, params, rusqlite};

use shared::types::Session;

use super::utils::json_string_list;
use crate::error::{AuthError, Result};

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        permissions: json_string_list(row.get(2)?)?,
        issued_at: row.get(3)?,
        last_used_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

const SESSION_COLUMNS: &str =
    "session_id, user_id, permissions, issued_at, last_used_at, expires_at";

fn permissions_json(session: &Session) -> Result<String> {
    serde_json::to_string(&session.permissions).map_err(|e| AuthError::Internal(e.to_string()))
}

/// Insert a new session row.  A duplicate id is `Conflict` — it should not
/// occur with random ids, but a collision must surface rather than replace
/// someone else's session.
pub async fn insert_session(conn: &Connection, session: Session) -> Result<()> {
    let permissions = permissions_json(&session)?;

    conn.call(move |conn: &mut rusqlite::Connection| {
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, permissions, issued_at, last_used_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.user_id,
                permissions,
                session.issued_at,
                session.last_used_at,
                session.expires_at,
            ],
        )?;
        Ok(())
    })
    .await
    .map_err(AuthError::from)
}

/// Read one session row.  `Ok(None)` is a durable miss — the caller (the
/// session service) decides whether that is `NotFound` or a cache-only
/// situation.
pub async fn get_session(conn: &Connection, session_id: String) -> Result<Option<Session>> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"
        ))?;
        let session = stmt
            .query_row(params![session_id], row_to_session)
            .optional()?;
        Ok(session)
    })
    .await
    .map_err(AuthError::from)
}

/// Full-row replace keyed by `session_id`.  Returns the number of rows
/// affected; `0` means the session does not exist durably.
pub async fn replace_session(conn: &Connection, session: Session) -> Result<usize> {
    let permissions = permissions_json(&session)?;

    conn.call(move |conn: &mut rusqlite::Connection| {
        let affected = conn.execute(
            "UPDATE sessions
             SET user_id = ?2, permissions = ?3, issued_at = ?4, last_used_at = ?5, expires_at = ?6
             WHERE session_id = ?1",
            params![
                session.id,
                session.user_id,
                permissions,
                session.issued_at,
                session.last_used_at,
                session.expires_at,
            ],
        )?;
        Ok(affected)
    })
    .await
    .map_err(AuthError::from)
}

/// Delete one session row; reports rows affected so the caller can log a
/// zero-row delete while still clearing the cache.
pub async fn delete_session(conn: &Connection, session_id: String) -> Result<usize> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let affected = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(affected)
    })
    .await
    .map_err(AuthError::from)
}

/// Delete all sessions owned by one user (logout everywhere / forced
/// permission re-issuance).
pub async fn delete_sessions_for_user(conn: &Connection, user_id: i64) -> Result<usize> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let affected = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(affected)
    })
    .await
    .map_err(AuthError::from)
}

/// Delete every expired session row.  Never-expiring rows (`expires_at = 0`)
/// are exempt.  Plain DELETE-by-predicate, so concurrent sweeps are safe.
pub async fn reap_expired_sessions(conn: &Connection, now: i64) -> Result<usize> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let affected = conn.execute(
            "DELETE FROM sessions WHERE expires_at != 0 AND expires_at < ?1",
            params![now],
        )?;
        Ok(affected)
    })
    .await
    .map_err(AuthError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::accounts::create_account;
    use crate::database::create::create_tables;
    use crate::database::utils::{generate_session_id, generate_user_id, get_timestamp};
    use shared::types::Account;

    async fn test_db_with_user() -> (Connection, i64) {
        let conn = Connection::open_in_memory().await.unwrap();
        create_tables(&conn).await.unwrap();
        let user_id = generate_user_id();
        create_account(
            &conn,
            Account {
                user_id,
                username: Some(format!("user{user_id}")),
                email: None,
                hashed_secret: None,
                salt: None,
                roles: vec![],
                created_at: get_timestamp(),
                last_login: None,
            },
        )
        .await
        .unwrap();
        (conn, user_id)
    }

    fn sample_session(user_id: i64, expires_at: i64) -> Session {
        let now = get_timestamp();
        Session {
            id: generate_session_id(),
            user_id,
            permissions: vec!["petpictures|*".to_string()],
            issued_at: now,
            last_used_at: now,
            expires_at,
        }
    }

    #[tokio::test]
    async fn insert_get_delete_roundtrip() {
        let (conn, user_id) = test_db_with_user().await;
        let session = sample_session(user_id, get_timestamp() + 3600);
        insert_session(&conn, session.clone()).await.unwrap();

        let fetched = get_session(&conn, session.id.clone()).await.unwrap();
        assert_eq!(fetched, Some(session.clone()));

        assert_eq!(delete_session(&conn, session.id.clone()).await.unwrap(), 1);
        assert_eq!(get_session(&conn, session.id.clone()).await.unwrap(), None);
        // Second delete is a zero-row no-op, not an error.
        assert_eq!(delete_session(&conn, session.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_session_id_is_conflict() {
        let (conn, user_id) = test_db_with_user().await;
        let session = sample_session(user_id, 0);
        insert_session(&conn, session.clone()).await.unwrap();
        let err = insert_session(&conn, session).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn reap_deletes_expired_but_spares_never_expiring() {
        let (conn, user_id) = test_db_with_user().await;
        let now = get_timestamp();

        let expired = sample_session(user_id, now - 100);
        let live = sample_session(user_id, now + 3600);
        let forever = sample_session(user_id, 0);
        insert_session(&conn, expired.clone()).await.unwrap();
        insert_session(&conn, live.clone()).await.unwrap();
        insert_session(&conn, forever.clone()).await.unwrap();

        assert_eq!(reap_expired_sessions(&conn, now).await.unwrap(), 1);
        // Idempotent: a concurrent/second sweep deletes nothing new.
        assert_eq!(reap_expired_sessions(&conn, now).await.unwrap(), 0);

        assert_eq!(get_session(&conn, expired.id).await.unwrap(), None);
        assert!(get_session(&conn, live.id).await.unwrap().is_some());
        assert!(get_session(&conn, forever.id).await.unwrap().is_some());
    }
}
