//! Database schema definitions for the record store.
//!
//! A store root holds one SQLite database (`records.db`) with two tables:
//! 1. records: one row per record; service data kept as a JSON document.
//! 2. record_agents: denormalized access entries, rewritten on every commit,
//!    so that agent/role filters can be answered with a join.

pub const RECORDS_DB_NAME: &str = "records.db";
pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";

pub const RECORDS_DB_SCHEMA_RECORDS: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        pid TEXT UNIQUE,
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        is_finished INTEGER NOT NULL DEFAULT 0,
        user_id TEXT,
        service TEXT,
        data TEXT NOT NULL
    )
";
pub const RECORDS_DB_SCHEMA_RECORD_AGENTS: &str = "
    CREATE TABLE IF NOT EXISTS record_agents (
        record_id TEXT NOT NULL,
        role TEXT NOT NULL,
        agent_type TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        PRIMARY KEY(record_id, role, agent_type, agent_id),
        FOREIGN KEY(record_id) REFERENCES records(id) ON DELETE CASCADE
    )
";
pub const RECORDS_DB_INDEX_AGENTS: &str =
    "CREATE INDEX IF NOT EXISTS idx_record_agents_agent ON record_agents(agent_type, agent_id)";
pub const RECORDS_DB_INDEX_SERVICE: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_service ON records(service)";

/// Statements applied, in order, by [`crate::core::db::initialize_records_db`].
pub const RECORDS_DB_SCHEMA: &[&str] = &[
    RECORDS_DB_SCHEMA_RECORDS,
    RECORDS_DB_SCHEMA_RECORD_AGENTS,
    RECORDS_DB_INDEX_AGENTS,
    RECORDS_DB_INDEX_SERVICE,
];
