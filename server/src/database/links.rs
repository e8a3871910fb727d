use tokio_rusqlite::{Connection, OptionalExtension, params, rusqlite};

use shared::types::{LinkedAccount, Platform};

use crate::error::{AuthError, Result};

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<LinkedAccount> {
    let platform: String = row.get(1)?;
    let platform = platform.parse::<Platform>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let data: String = row.get(4)?;
    let data = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(LinkedAccount {
        user_id: row.get(0)?,
        platform,
        platform_id: row.get(2)?,
        platform_username: row.get(3)?,
        data,
        data_updated_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const LINK_COLUMNS: &str =
    "user_id, platform, platform_id, platform_username, data, data_updated_at, created_at";

fn data_json(link: &LinkedAccount) -> Result<String> {
    serde_json::to_string(&link.data).map_err(|e| AuthError::Internal(e.to_string()))
}

/// Insert a new link row.  Fails with `Conflict` when the user already has a
/// link for this platform, or when the platform identity is already linked
/// to any account.
pub async fn create_link(conn: &Connection, link: LinkedAccount) -> Result<()> {
    let data = data_json(&link)?;

    conn.call(move |conn: &mut rusqlite::Connection| {
        conn.execute(
            "INSERT INTO linked_accounts (user_id, platform, platform_id, platform_username, data, data_updated_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.user_id,
                link.platform.as_str(),
                link.platform_id,
                link.platform_username,
                data,
                link.data_updated_at,
                link.created_at,
            ],
        )?;
        Ok(())
    })
    .await
    .map_err(AuthError::from)
}

/// Look up a link by the stable platform join key.
pub async fn get_link_by_platform_id(
    conn: &Connection,
    platform: Platform,
    platform_id: String,
) -> Result<LinkedAccount> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM linked_accounts WHERE platform = ?1 AND platform_id = ?2"
        ))?;
        let link = stmt
            .query_row(params![platform.as_str(), platform_id], row_to_link)
            .optional()?;
        Ok(link)
    })
    .await
    .map_err(AuthError::from)?
    .ok_or(AuthError::NotFound)
}

/// Look up a user's link for one platform.
pub async fn get_link_for_user(
    conn: &Connection,
    user_id: i64,
    platform: Platform,
) -> Result<LinkedAccount> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM linked_accounts WHERE user_id = ?1 AND platform = ?2"
        ))?;
        let link = stmt
            .query_row(params![user_id, platform.as_str()], row_to_link)
            .optional()?;
        Ok(link)
    })
    .await
    .map_err(AuthError::from)?
    .ok_or(AuthError::NotFound)
}

/// All links owned by one user.
pub async fn get_links_for_user(conn: &Connection, user_id: i64) -> Result<Vec<LinkedAccount>> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM linked_accounts WHERE user_id = ?1 ORDER BY platform"
        ))?;
        let links = stmt
            .query_map(params![user_id], row_to_link)?
            .collect::<std::result::Result<Vec<LinkedAccount>, rusqlite::Error>>()?;
        Ok(links)
    })
    .await
    .map_err(AuthError::from)
}

/// Full-row replace keyed by `(user_id, platform)`.  Used to refresh the
/// advisory username and the stored profile payload on every login.
pub async fn update_link(conn: &Connection, link: LinkedAccount) -> Result<()> {
    let data = data_json(&link)?;

    let affected = conn
        .call(move |conn: &mut rusqlite::Connection| {
            let affected = conn.execute(
                "UPDATE linked_accounts
                 SET platform_id = ?3, platform_username = ?4, data = ?5, data_updated_at = ?6
                 WHERE user_id = ?1 AND platform = ?2",
                params![
                    link.user_id,
                    link.platform.as_str(),
                    link.platform_id,
                    link.platform_username,
                    data,
                    link.data_updated_at,
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
