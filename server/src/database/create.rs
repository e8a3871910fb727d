use tokio_rusqlite::{Connection, Result, rusqlite};
use tracing::{info, warn};

/// Current schema version.  Bump this whenever the schema changes and add a
/// corresponding migration arm in `run_migrations`.
const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(conn: &Connection) -> Result<()> {
    create_schema(conn).await?;
    run_migrations(conn).await?;
    Ok(())
}

/// Create all tables for a brand-new database (version 1 schema).
async fn create_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn: &mut rusqlite::Connection| {
        // Cascading deletes from accounts rely on this being on.
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        // Accounts table — hashed_secret/salt are NULL together for
        // accounts bootstrapped purely through OAuth linking.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id       INTEGER PRIMARY KEY,
                username      TEXT    UNIQUE,
                email         TEXT    UNIQUE,
                hashed_secret TEXT,
                salt          TEXT,
                roles         TEXT    NOT NULL DEFAULT '[]',
                created_at    INTEGER NOT NULL,
                last_login    INTEGER
            )",
            [],
        )?;

        // Linked accounts — one row per (user, platform), and a platform
        // identity can never point at two different accounts.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS linked_accounts (
                user_id           INTEGER NOT NULL,
                platform          TEXT    NOT NULL,
                platform_id       TEXT    NOT NULL,
                platform_username TEXT,
                data              TEXT    NOT NULL DEFAULT '{}',
                data_updated_at   INTEGER NOT NULL,
                created_at        INTEGER NOT NULL,
                PRIMARY KEY (user_id, platform),
                UNIQUE (platform, platform_id),
                FOREIGN KEY (user_id) REFERENCES accounts(user_id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Sessions — permissions is the JSON snapshot computed at issuance;
        // expires_at = 0 marks a never-expiring session.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id   TEXT    PRIMARY KEY,
                user_id      INTEGER NOT NULL,
                permissions  TEXT    NOT NULL DEFAULT '[]',
                issued_at    INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES accounts(user_id) ON DELETE CASCADE
            )",
            [],
        )?;

        // --- Indexes --------------------------------------------------------
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_links_platform ON linked_accounts(platform, platform_id)",
            [],
        )?;

        Ok(())
    })
    .await
}

/// Apply migrations for databases created by older builds.
async fn run_migrations(conn: &Connection) -> Result<()> {
    let version = current_version(conn).await?;

    if version > SCHEMA_VERSION {
        warn!(
            "Database schema version {} is newer than this build ({})",
            version, SCHEMA_VERSION
        );
        return Ok(());
    }

    if version < SCHEMA_VERSION {
        // No migration arms yet — v1 is the first released schema.
        info!("Migrating schema from v{} to v{}", version, SCHEMA_VERSION);
    }

    set_version(conn, SCHEMA_VERSION).await
}

async fn current_version(conn: &Connection) -> Result<u32> {
    conn.call(|conn: &mut rusqlite::Connection| {
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    })
    .await
}

async fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        create_tables(&conn).await.unwrap();
        create_tables(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn schema_survives_reopening_the_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apiary.db");

        let conn = Connection::open(&path).await.unwrap();
        create_tables(&conn).await.unwrap();
        drop(conn);

        let conn = Connection::open(&path).await.unwrap();
        create_tables(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), SCHEMA_VERSION);

        let tables: Vec<String> = conn
            .call(|conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok::<_, rusqlite::Error>(names)
            })
            .await
            .unwrap();
        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"linked_accounts".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
    }
}
