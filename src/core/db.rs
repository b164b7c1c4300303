use crate::core::broker::DbBroker;
use crate::core::error::WardenError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, WardenError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn records_db_path(root: &Path) -> PathBuf {
    root.join(schemas::RECORDS_DB_NAME)
}

/// Create the store root and apply the schema. Idempotent.
pub fn initialize_records_db(root: &Path, actor: &str) -> Result<PathBuf, WardenError> {
    fs::create_dir_all(root)?;
    let db_path = records_db_path(root);

    let broker = DbBroker::new(root);
    broker.with_conn(&db_path, actor, None, "records.init", |conn| {
        for statement in schemas::RECORDS_DB_SCHEMA {
            conn.execute(statement, [])?;
        }
        Ok(())
    })?;

    tracing::debug!(db = %db_path.display(), "records database ready");
    Ok(db_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let first = initialize_records_db(&root, "test").unwrap();
        let second = initialize_records_db(&root, "test").unwrap();
        assert_eq!(first, second);

        let conn = db_connect(&first.to_string_lossy()).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('records','record_agents')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
