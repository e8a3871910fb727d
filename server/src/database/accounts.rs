use tokio_rusqlite::{Connection, OptionalExtension, params, rusqlite};

use shared::types::Account;

use super::utils::json_string_list;
use crate::error::{AuthError, Result};

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        hashed_secret: row.get(3)?,
        salt: row.get(4)?,
        roles: json_string_list(row.get(5)?)?,
        created_at: row.get(6)?,
        last_login: row.get(7)?,
    })
}

const ACCOUNT_COLUMNS: &str =
    "user_id, username, email, hashed_secret, salt, roles, created_at, last_login";

fn roles_json(account: &Account) -> Result<String> {
    serde_json::to_string(&account.roles).map_err(|e| AuthError::Internal(e.to_string()))
}

/// Insert a new account.  Fails with `Conflict` when user_id, username or
/// email collides with an existing row.
pub async fn create_account(conn: &Connection, account: Account) -> Result<()> {
    let roles = roles_json(&account)?;

    conn.call(move |conn: &mut rusqlite::Connection| {
        conn.execute(
            "INSERT INTO accounts (user_id, username, email, hashed_secret, salt, roles, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.user_id,
                account.username,
                account.email,
                account.hashed_secret,
                account.salt,
                roles,
                account.created_at,
                account.last_login,
            ],
        )?;
        Ok(())
    })
    .await
    .map_err(AuthError::from)
}

pub async fn get_account_by_id(conn: &Connection, user_id: i64) -> Result<Account> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1"
        ))?;
        let account = stmt.query_row(params![user_id], row_to_account).optional()?;
        Ok(account)
    })
    .await
    .map_err(AuthError::from)?
    .ok_or(AuthError::NotFound)
}

pub async fn get_account_by_username(conn: &Connection, username: String) -> Result<Account> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"
        ))?;
        let account = stmt.query_row(params![username], row_to_account).optional()?;
        Ok(account)
    })
    .await
    .map_err(AuthError::from)?
    .ok_or(AuthError::NotFound)
}

pub async fn get_account_by_email(conn: &Connection, email: String) -> Result<Account> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"
        ))?;
        let account = stmt.query_row(params![email], row_to_account).optional()?;
        Ok(account)
    })
    .await
    .map_err(AuthError::from)?
    .ok_or(AuthError::NotFound)
}

/// Full-row replace keyed by `user_id`.  Fails with `NotFound` when the
/// account does not exist.
pub async fn update_account(conn: &Connection, account: Account) -> Result<()> {
    let roles = roles_json(&account)?;

    let affected = conn
        .call(move |conn: &mut rusqlite::Connection| {
            let affected = conn.execute(
                "UPDATE accounts
                 SET username = ?2, email = ?3, hashed_secret = ?4, salt = ?5,
                     roles = ?6, created_at = ?7, last_login = ?8
                 WHERE user_id = ?1",
                params![
                    account.user_id,
                    account.username,
                    account.email,
                    account.hashed_secret,
                    account.salt,
                    roles,
                    account.created_at,
                    account.last_login,
                ],
            )?;
            Ok(affected)
        })
        .await
        .map_err(AuthError::from)?;

    if affected == 0 {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

/// Delete an account.  The schema cascades the delete to `linked_accounts`
/// and `sessions`.
pub async fn delete_account(conn: &Connection, user_id: i64) -> Result<()> {
    let affected = conn
        .call(move |conn: &mut rusqlite::Connection| {
            let affected = conn.execute("DELETE FROM accounts WHERE user_id = ?1", params![user_id])?;
            Ok(affected)
        })
        .await
        .map_err(AuthError::from)?;

    if affected == 0 {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

/// Update last_login timestamp.  Best-effort from callers' point of view —
/// login does not fail when this does.
pub async fn update_last_login(conn: &Connection, user_id: i64, now: i64) -> Result<()> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        conn.execute(
            "UPDATE accounts SET last_login = ?1 WHERE user_id = ?2",
            params![now, user_id],
        )?;
        Ok(())
    })
    .await
    .map_err(AuthError::from)
}
