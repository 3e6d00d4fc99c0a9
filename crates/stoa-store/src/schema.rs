//! SQLite schema. One table, one row per storage key: the session record is
//! read and written as a whole JSON document, never per-field.

use rusqlite::Connection;

use stoa_core::{StoaError, StoaResult};

pub fn init_db(conn: &Connection) -> StoaResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_state (
            key        TEXT PRIMARY KEY,
            data       TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .map_err(|e| StoaError::Storage(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        // Second call should be idempotent
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        assert!(tables.contains(&"session_state".to_string()));
    }
}
