use crate::core::db;
use crate::core::error::WardenError;
use crate::core::schemas;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serialized access point for every write to a store database.
///
/// Each call runs under a process-wide lock and appends one [`BrokerEvent`]
/// to the store's audit log, whatever the outcome.
#[derive(Debug, Clone)]
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub intent_ref: Option<String>,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(schemas::AUDIT_LOG_NAME),
        }
    }

    pub fn audit_log_path(&self) -> &Path {
        &self.audit_log_path
    }

    /// Execute a closure with a serialized connection to the specified DB.
    ///
    /// `intent_ref` ties the event to the record being touched, when known.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, WardenError>
    where
        F: FnOnce(&mut Connection) -> Result<R, WardenError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        // A poisoned lock only means another caller panicked mid-operation;
        // SQLite has already rolled back anything it left open.
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let mut conn = db::db_connect(&db_path.to_string_lossy())?;

        let result = f(&mut conn);

        let status = if result.is_ok() { "success" } else { "error" };
        if let Err(e) = self.log_event(actor, intent_ref, op_name, &db_id, status) {
            tracing::warn!(op = op_name, error = %e, "failed to append broker audit event");
        }

        result
    }

    fn log_event(
        &self,
        actor: &str,
        intent_ref: Option<&str>,
        op: &str,
        db_id: &str,
        status: &str,
    ) -> Result<(), WardenError> {
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            intent_ref: intent_ref.map(|s| s.to_string()),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }

    /// Audit events in append order. A missing log reads as empty.
    pub fn read_events(&self) -> Result<Vec<BrokerEvent>, WardenError> {
        if !self.audit_log_path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.audit_log_path)?;
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_call_is_audited_with_its_status() {
        let dir = tempfile::tempdir().unwrap();
        let broker = DbBroker::new(dir.path());
        let db_path = dir.path().join("scratch.db");

        broker
            .with_conn(&db_path, "user:1", Some("rec-1"), "records.create", |conn| {
                conn.execute("CREATE TABLE t (x INTEGER)", [])?;
                Ok(())
            })
            .unwrap();
        let err = broker.with_conn(&db_path, "user:1", None, "records.bad", |conn| {
            conn.execute("INSERT INTO missing VALUES (1)", [])?;
            Ok(())
        });
        assert!(err.is_err());

        let events = broker.read_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].op, "records.create");
        assert_eq!(events[0].intent_ref.as_deref(), Some("rec-1"));
        assert_eq!(events[0].status, "success");
        assert_eq!(events[1].status, "error");
        assert_eq!(events[1].db_id, "scratch.db");
    }
}
