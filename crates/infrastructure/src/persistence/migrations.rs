//! Database migrations
//!
//! Manages database schema versioning and migrations.

use rusqlite::Connection;
use tracing::{debug, info};

use super::connection::DatabaseError;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            from_version = current_version,
            to_version = SCHEMA_VERSION,
            "Running database migrations"
        );

        if current_version < 1 {
            migrate_v1(conn)?;
        }
        if current_version < 2 {
            migrate_v2(conn)?;
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!(version = SCHEMA_VERSION, "Database migrations complete");
    } else {
        debug!(version = current_version, "Database schema is up to date");
    }

    Ok(())
}

/// Get current schema version
fn get_schema_version(conn: &Connection) -> Result<i32, DatabaseError> {
    // Create schema_version table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [
        version,
    ])?;
    Ok(())
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &Connection) -> Result<(), DatabaseError> {
    debug!("Applying migration v1: Initial schema");

    conn.execute_batch(
        "
        -- One row per detected/ongoing device-limit violation.
        -- ips and nodes are stored as '|'-joined text (NodeName rejects '|').
        CREATE TABLE IF NOT EXISTS ban_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            ip_count INTEGER NOT NULL,
            ips TEXT NOT NULL,
            nodes TEXT NOT NULL,
            violation_duration_s INTEGER NOT NULL,
            detected_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ban_records_email ON ban_records(email);
        CREATE INDEX IF NOT EXISTS idx_ban_records_updated_at ON ban_records(updated_at);
        ",
    )?;

    Ok(())
}

/// Migration to version 2: carry the directory's `telegram_id` on each record
/// so the notifier doesn't need a second directory lookup to alert.
fn migrate_v2(conn: &Connection) -> Result<(), DatabaseError> {
    debug!("Applying migration v2: telegram_id column");

    conn.execute_batch("ALTER TABLE ban_records ADD COLUMN telegram_id TEXT;")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn run_migrations_creates_tables() {
        let conn = create_test_connection();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        assert!(tables.contains(&"ban_records".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = create_test_connection();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap(); // Should not fail
    }

    #[test]
    fn schema_version_tracked() {
        let conn = create_test_connection();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn ban_records_round_trip() {
        let conn = create_test_connection();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO ban_records (email, ip_count, ips, nodes, violation_duration_s, detected_at, updated_at)
             VALUES ('a@x', 3, '1.1.1.1|2.2.2.2', 'fra-01', 300, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM ban_records WHERE email = 'a@x'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
