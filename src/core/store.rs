//! Record storage: the [`RecordStore`] contract and its SQLite implementation.
//!
//! Stores exchange [`StoredRecord`] values and never see the in-memory access
//! object. Agent filters are answered from the access dump found under the
//! store's `access_field` key, which every write re-indexes.

use crate::core::access::AccessRole;
use crate::core::agent::{Agent, AgentId, AgentLoader};
use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::WardenError;
use crate::core::pagination::Pagination;
use crate::core::record::{DEFAULT_ACCESS_FIELD, StoredRecord};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Search criteria. Soft-deleted rows are excluded unless `include_deleted`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub include_deleted: bool,
    pub service: Option<String>,
    pub user_id: Option<AgentId>,
    pub finished: Option<bool>,
    pub agent: Option<Agent>,
    pub role: Option<AccessRole>,
}

impl RecordFilter {
    /// In-process evaluation, equivalent to the SQL built by [`SqliteRecordStore`].
    pub fn matches(&self, record: &StoredRecord, access_field: &str) -> bool {
        if record.is_deleted && !self.include_deleted {
            return false;
        }
        if let Some(service) = &self.service {
            if record.service.as_deref() != Some(service.as_str()) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if record.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(finished) = self.finished {
            if record.is_finished != finished {
                return false;
            }
        }
        if self.agent.is_none() && self.role.is_none() {
            return true;
        }
        access_entries(record, access_field).iter().any(|entry| {
            let role_ok = self.role.is_none_or(|r| r == entry.role);
            let agent_ok = self.agent.as_ref().is_none_or(|a| {
                a.agent_type() == entry.agent_type && a.agent_id() == &entry.agent_id
            });
            role_ok && agent_ok
        })
    }
}

/// One `(role, type, id)` triple of a persisted access dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub role: AccessRole,
    pub agent_type: String,
    pub agent_id: AgentId,
}

/// Read the access dump stored under `access_field`. Malformed entries are skipped.
pub fn access_entries(record: &StoredRecord, access_field: &str) -> Vec<AccessEntry> {
    let Some(Value::Object(access)) = record.data.get(access_field) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for role in [AccessRole::Owner, AccessRole::Contributor] {
        let Some(Value::Array(list)) = access.get(role.dump_key()) else {
            continue;
        };
        for item in list {
            let Some(mapping) = item.as_object().filter(|m| m.len() == 1) else {
                continue;
            };
            for (agent_type, raw_id) in mapping {
                if let Some(agent_id) = AgentId::from_value(raw_id) {
                    entries.push(AccessEntry {
                        role,
                        agent_type: agent_type.clone(),
                        agent_id,
                    });
                }
            }
        }
    }
    entries
}

/// One page of a query plus the unpaginated match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<StoredRecord>,
    pub total: u64,
}

/// Storage collaborator used by [`crate::core::service::RecordService`].
///
/// Results are ordered by insertion.
pub trait RecordStore {
    /// Insert a new record. A `pid` clash fails with `DuplicateIdentifier` and
    /// leaves nothing behind.
    fn create(&self, record: &StoredRecord) -> Result<StoredRecord, WardenError>;

    fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<StoredRecord, WardenError>;

    fn get_by_pid(&self, pid: &str, include_deleted: bool) -> Result<StoredRecord, WardenError>;

    /// True for any record holding `pid`, soft-deleted ones included.
    fn pid_exists(&self, pid: &str) -> Result<bool, WardenError>;

    fn query(&self, filter: &RecordFilter, pagination: &Pagination) -> Result<Page, WardenError>;

    /// Insert or merge the full record in one transaction.
    fn commit(&self, record: &StoredRecord) -> Result<(), WardenError>;

    /// Data key holding the access dump that agent filters read.
    fn access_field(&self) -> &str;
}

/// SQLite-backed store rooted at a directory (`records.db` + audit log).
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
    broker: DbBroker,
    access_field: String,
    actor: String,
}

struct RawRow {
    id: String,
    pid: Option<String>,
    created: String,
    updated: String,
    is_deleted: bool,
    is_finished: bool,
    user_id: Option<String>,
    service: Option<String>,
    data: String,
}

const SELECT_COLUMNS: &str =
    "id, pid, created, updated, is_deleted, is_finished, user_id, service, data";

impl SqliteRecordStore {
    /// Open (and initialize, if needed) the store under `root`.
    pub fn open(root: &Path) -> Result<Self, WardenError> {
        let db_path = db::initialize_records_db(root, "warden")?;
        Ok(Self {
            db_path,
            broker: DbBroker::new(root),
            access_field: DEFAULT_ACCESS_FIELD.to_string(),
            actor: "warden".to_string(),
        })
    }

    pub fn with_access_field(mut self, access_field: &str) -> Self {
        self.access_field = access_field.to_string();
        self
    }

    /// Name recorded as the actor of every audit event.
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn broker(&self) -> &DbBroker {
        &self.broker
    }

    /// Loader for `project` agents: the stored record with that id, as JSON.
    pub fn project_loader(&self) -> AgentLoader {
        let store = self.clone();
        Arc::new(move |id: &AgentId| {
            let stored = store.get_by_id(&id.to_string(), false).ok()?;
            serde_json::to_value(stored).ok()
        })
    }

    fn with_conn<F, R>(&self, intent_ref: Option<&str>, op: &str, f: F) -> Result<R, WardenError>
    where
        F: FnOnce(&mut Connection) -> Result<R, WardenError>,
    {
        self.broker
            .with_conn(&self.db_path, &self.actor, intent_ref, op, f)
    }

    fn fetch_one(
        &self,
        column: &str,
        key: &str,
        include_deleted: bool,
    ) -> Result<StoredRecord, WardenError> {
        let sql = format!(
            "SELECT {} FROM records WHERE {} = ?1 AND (?2 OR is_deleted = 0)",
            SELECT_COLUMNS, column
        );
        let raw = self.with_conn(Some(key), "records.get", |conn| {
            Ok(conn
                .query_row(&sql, params![key, include_deleted], read_raw)
                .optional()?)
        })?;
        match raw {
            Some(raw) => raw_to_stored(raw),
            None => Err(WardenError::RecordNotFound(key.to_string())),
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(&self, record: &StoredRecord) -> Result<StoredRecord, WardenError> {
        let access_field = self.access_field.clone();
        self.with_conn(Some(&record.id), "records.create", |conn| {
            let (user_id, data) = encode_columns(record)?;
            let mut tx = conn.transaction()?;
            {
                let sp = tx.savepoint()?;
                match insert_record(&sp, record, user_id.as_deref(), &data) {
                    Ok(()) => {}
                    Err(e) if is_pid_conflict(&e) => {
                        return Err(WardenError::DuplicateIdentifier {
                            field: "id".to_string(),
                            value: record.pid.clone().unwrap_or_default(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
                index_agents(&sp, record, &access_field)?;
                sp.commit()?;
            }
            tx.commit()?;
            Ok(())
        })?;
        Ok(record.clone())
    }

    fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<StoredRecord, WardenError> {
        self.fetch_one("id", id, include_deleted)
    }

    fn get_by_pid(&self, pid: &str, include_deleted: bool) -> Result<StoredRecord, WardenError> {
        self.fetch_one("pid", pid, include_deleted)
    }

    fn pid_exists(&self, pid: &str) -> Result<bool, WardenError> {
        self.with_conn(Some(pid), "records.pid_exists", |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE pid = ?1",
                params![pid],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn query(&self, filter: &RecordFilter, pagination: &Pagination) -> Result<Page, WardenError> {
        let (clause, args) = where_clause(filter)?;
        let count_sql = format!("SELECT COUNT(*) FROM records WHERE {}", clause);
        let page_sql = format!(
            "SELECT {} FROM records WHERE {} ORDER BY rowid LIMIT {} OFFSET {}",
            SELECT_COLUMNS,
            clause,
            pagination.limit(),
            pagination.offset()
        );

        let (total, raws) = self.with_conn(None, "records.query", |conn| {
            let total: i64 =
                conn.query_row(&count_sql, params_from_iter(args.iter()), |row| row.get(0))?;
            let mut stmt = conn.prepare(&page_sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), read_raw)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })?;

        let items = raws
            .into_iter()
            .map(raw_to_stored)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    fn commit(&self, record: &StoredRecord) -> Result<(), WardenError> {
        let access_field = self.access_field.clone();
        self.with_conn(Some(&record.id), "records.commit", |conn| {
            let tx = conn.transaction()?;
            let (user_id, data) = encode_columns(record)?;
            let upsert = tx.execute(
                "INSERT INTO records (id, pid, created, updated, is_deleted, is_finished, user_id, service, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    pid = excluded.pid,
                    updated = excluded.updated,
                    is_deleted = excluded.is_deleted,
                    is_finished = excluded.is_finished,
                    user_id = excluded.user_id,
                    service = excluded.service,
                    data = excluded.data",
                params![
                    record.id,
                    record.pid,
                    record.created,
                    record.updated,
                    record.is_deleted,
                    record.is_finished,
                    user_id,
                    record.service,
                    data
                ],
            );
            if let Err(e) = upsert {
                if is_pid_conflict(&e) {
                    return Err(WardenError::DuplicateIdentifier {
                        field: "id".to_string(),
                        value: record.pid.clone().unwrap_or_default(),
                    });
                }
                return Err(e.into());
            }
            index_agents(&tx, record, &access_field)?;
            tx.commit()?;
            Ok(())
        })
    }
    fn access_field(&self) -> &str {
        &self.access_field
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        pid: row.get(1)?,
        created: row.get(2)?,
        updated: row.get(3)?,
        is_deleted: row.get(4)?,
        is_finished: row.get(5)?,
        user_id: row.get(6)?,
        service: row.get(7)?,
        data: row.get(8)?,
    })
}

fn raw_to_stored(raw: RawRow) -> Result<StoredRecord, WardenError> {
    let user_id = match raw.user_id {
        Some(text) => Some(serde_json::from_str(&text)?),
        None => None,
    };
    let data = match serde_json::from_str(&raw.data)? {
        Value::Object(map) => map,
        other => {
            return Err(WardenError::ConfigError(format!(
                "record {} has non-object data: {}",
                raw.id, other
            )));
        }
    };
    Ok(StoredRecord {
        id: raw.id,
        pid: raw.pid,
        created: raw.created,
        updated: raw.updated,
        is_deleted: raw.is_deleted,
        is_finished: raw.is_finished,
        user_id,
        service: raw.service,
        data,
    })
}

fn encode_columns(record: &StoredRecord) -> Result<(Option<String>, String), WardenError> {
    let user_id = match &record.user_id {
        Some(id) => Some(serde_json::to_string(id)?),
        None => None,
    };
    let data = serde_json::to_string(&record.data)?;
    Ok((user_id, data))
}

fn insert_record(
    conn: &Connection,
    record: &StoredRecord,
    user_id: Option<&str>,
    data: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO records (id, pid, created, updated, is_deleted, is_finished, user_id, service, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.pid,
            record.created,
            record.updated,
            record.is_deleted,
            record.is_finished,
            user_id,
            record.service,
            data
        ],
    )?;
    Ok(())
}

fn index_agents(conn: &Connection, record: &StoredRecord, access_field: &str) -> Result<(), WardenError> {
    conn.execute(
        "DELETE FROM record_agents WHERE record_id = ?1",
        params![record.id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO record_agents (record_id, role, agent_type, agent_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for entry in access_entries(record, access_field) {
        stmt.execute(params![
            record.id,
            entry.role.as_str(),
            entry.agent_type,
            serde_json::to_string(&entry.agent_id)?
        ])?;
    }
    Ok(())
}

fn is_pid_conflict(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(code, Some(msg)) => {
            code.code == ErrorCode::ConstraintViolation && msg.contains("records.pid")
        }
        _ => false,
    }
}

fn where_clause(filter: &RecordFilter) -> Result<(String, Vec<SqlValue>), WardenError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if !filter.include_deleted {
        clauses.push("is_deleted = 0".to_string());
    }
    if let Some(service) = &filter.service {
        args.push(SqlValue::Text(service.clone()));
        clauses.push(format!("service = ?{}", args.len()));
    }
    if let Some(user_id) = &filter.user_id {
        args.push(SqlValue::Text(serde_json::to_string(user_id)?));
        clauses.push(format!("user_id = ?{}", args.len()));
    }
    if let Some(finished) = filter.finished {
        args.push(SqlValue::Integer(i64::from(finished)));
        clauses.push(format!("is_finished = ?{}", args.len()));
    }
    if filter.agent.is_some() || filter.role.is_some() {
        let mut sub = Vec::new();
        if let Some(agent) = &filter.agent {
            args.push(SqlValue::Text(agent.agent_type().to_string()));
            sub.push(format!("agent_type = ?{}", args.len()));
            args.push(SqlValue::Text(serde_json::to_string(agent.agent_id())?));
            sub.push(format!("agent_id = ?{}", args.len()));
        }
        if let Some(role) = filter.role {
            args.push(SqlValue::Text(role.as_str().to_string()));
            sub.push(format!("role = ?{}", args.len()));
        }
        clauses.push(format!(
            "id IN (SELECT record_id FROM record_agents WHERE {})",
            sub.join(" AND ")
        ));
    }

    if clauses.is_empty() {
        clauses.push("1 = 1".to_string());
    }
    Ok((clauses.join(" AND "), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentRegistry;
    use serde_json::json;

    fn stored(id: &str, pid: Option<&str>, access: Value) -> StoredRecord {
        let mut data = serde_json::Map::new();
        data.insert("metadata".to_string(), json!({"title": id}));
        data.insert("access".to_string(), access);
        StoredRecord {
            id: id.to_string(),
            pid: pid.map(str::to_string),
            created: "1Z".to_string(),
            updated: "1Z".to_string(),
            is_deleted: false,
            is_finished: false,
            user_id: Some(AgentId::Int(1)),
            service: Some("storage".to_string()),
            data,
        }
    }

    #[test]
    fn create_rejects_pid_collisions_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::open(dir.path()).unwrap();
        store.create(&stored("a", Some("alpha"), json!({}))).unwrap();

        let err = store.create(&stored("b", Some("alpha"), json!({}))).unwrap_err();
        assert!(matches!(err, WardenError::DuplicateIdentifier { ref value, .. } if value == "alpha"));
        assert!(matches!(store.get_by_id("b", true), Err(WardenError::RecordNotFound(_))));
        assert!(store.pid_exists("alpha").unwrap());
    }

    #[test]
    fn agent_filter_uses_indexed_access_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::open(dir.path()).unwrap();
        store
            .create(&stored("a", None, json!({"owned_by": [{"project": "p1"}], "contributed_by": [{"user": 1}]})))
            .unwrap();
        store
            .create(&stored("b", None, json!({"owned_by": [{"project": "p2"}], "contributed_by": [{"user": 2}]})))
            .unwrap();

        let registry = AgentRegistry::default();
        let filter = RecordFilter {
            agent: Some(registry.agent("user", 2).unwrap()),
            ..RecordFilter::default()
        };
        let page = store.query(&filter, &Pagination::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "b");
        assert!(filter.matches(&page.items[0], "access"));

        let filter = RecordFilter {
            agent: Some(registry.agent("user", 2).unwrap()),
            role: Some(AccessRole::Owner),
            ..RecordFilter::default()
        };
        assert_eq!(store.query(&filter, &Pagination::default()).unwrap().total, 0);
    }

    #[test]
    fn commit_merges_and_soft_deleted_rows_hide_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::open(dir.path()).unwrap();
        let mut record = stored("a", None, json!({}));
        store.create(&record).unwrap();

        record.is_deleted = true;
        store.commit(&record).unwrap();

        assert!(matches!(store.get_by_id("a", false), Err(WardenError::RecordNotFound(_))));
        assert!(store.get_by_id("a", true).unwrap().is_deleted);
        assert_eq!(store.query(&RecordFilter::default(), &Pagination::default()).unwrap().total, 0);

        let loader = store.project_loader();
        assert!(loader(&AgentId::from("a")).is_none());
    }
}
