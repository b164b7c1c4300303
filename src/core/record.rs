//! Records under access control, and their persisted form.

use crate::core::access::RecordAccess;
use crate::core::agent::{AgentId, AgentRegistry};
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;

pub const DEFAULT_ACCESS_FIELD: &str = "access";

/// Plain persisted representation exchanged with a [`crate::core::store::RecordStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub pid: Option<String>,
    pub created: String,
    pub updated: String,
    pub is_deleted: bool,
    pub is_finished: bool,
    pub user_id: Option<AgentId>,
    pub service: Option<String>,
    pub data: Map<String, Value>,
}

/// In-memory record with an attached access field.
///
/// The access object is built from `data[access_key]` on first use and then kept
/// in an explicit cache slot. Mutations stay in the slot until [`Record::pre_commit`]
/// dumps them back into `data`; the slot is only invalidated by
/// [`Record::reload_data`] or re-synced by [`Record::refresh_access`].
#[derive(Debug, Clone)]
pub struct Record {
    stored: StoredRecord,
    access_key: String,
    access_slot: Option<RecordAccess>,
    registry: Arc<AgentRegistry>,
}

impl Record {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        let ts = time::now_epoch_z();
        let stored = StoredRecord {
            id: time::new_event_id(),
            pid: None,
            created: ts.clone(),
            updated: ts,
            is_deleted: false,
            is_finished: false,
            user_id: None,
            service: None,
            data: Map::new(),
        };
        Self::from_stored(registry, stored)
    }

    pub fn from_stored(registry: Arc<AgentRegistry>, stored: StoredRecord) -> Self {
        Self {
            stored,
            access_key: DEFAULT_ACCESS_FIELD.to_string(),
            access_slot: None,
            registry,
        }
    }

    /// Back the access field with a different data key.
    pub fn with_access_field(mut self, key: &str) -> Self {
        self.access_key = key.to_string();
        self.access_slot = None;
        self
    }

    pub fn id(&self) -> &str {
        &self.stored.id
    }

    pub fn pid(&self) -> Option<&str> {
        self.stored.pid.as_deref()
    }

    pub fn created(&self) -> &str {
        &self.stored.created
    }

    pub fn updated(&self) -> &str {
        &self.stored.updated
    }

    pub fn is_deleted(&self) -> bool {
        self.stored.is_deleted
    }

    pub fn is_finished(&self) -> bool {
        self.stored.is_finished
    }

    pub fn user_id(&self) -> Option<&AgentId> {
        self.stored.user_id.as_ref()
    }

    pub fn service(&self) -> Option<&str> {
        self.stored.service.as_deref()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.stored.data.get("metadata")
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.stored.data
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn access_field(&self) -> &str {
        &self.access_key
    }

    pub fn set_pid(&mut self, pid: &str) {
        self.stored.pid = Some(pid.to_string());
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.stored.is_deleted = deleted;
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.stored.is_finished = finished;
    }

    pub fn set_user_id(&mut self, user_id: Option<AgentId>) {
        self.stored.user_id = user_id;
    }

    pub fn set_service(&mut self, service: Option<String>) {
        self.stored.service = service;
    }

    pub fn set_metadata(&mut self, metadata: Value) {
        self.stored.data.insert("metadata".to_string(), metadata);
    }

    pub fn touch(&mut self) {
        self.stored.updated = time::now_epoch_z();
    }

    /// Access object, built and cached on first call.
    pub fn access(&mut self) -> &RecordAccess {
        self.access_mut()
    }

    pub fn access_mut(&mut self) -> &mut RecordAccess {
        let registry = &self.registry;
        let data = &self.stored.data;
        let key = &self.access_key;
        self.access_slot
            .get_or_insert_with(|| build_access(registry, data.get(key)))
    }

    /// Read-only view that does not populate the cache.
    pub fn peek_access(&self) -> Cow<'_, RecordAccess> {
        match &self.access_slot {
            Some(access) => Cow::Borrowed(access),
            None => Cow::Owned(build_access(&self.registry, self.stored.data.get(&self.access_key))),
        }
    }

    pub fn is_access_cached(&self) -> bool {
        self.access_slot.is_some()
    }

    /// Replace the access object. Not dumped into `data` until commit.
    pub fn set_access(&mut self, access: RecordAccess) {
        self.access_slot = Some(access);
    }

    /// Re-sync a cached access object from the current `data`.
    pub fn refresh_access(&mut self) {
        if let Some(access) = self.access_slot.as_mut() {
            let value = self
                .stored
                .data
                .get(&self.access_key)
                .cloned()
                .unwrap_or(Value::Null);
            access.refresh_from_value(&self.registry, &value);
        }
    }

    /// Swap in reloaded data; the access cache is dropped with the old data.
    pub fn reload_data(&mut self, data: Map<String, Value>) {
        self.stored.data = data;
        self.access_slot = None;
    }

    /// Materialize cached field objects into `data` right before a store write.
    pub fn pre_commit(&mut self) {
        let dumped = self.access_mut().dump();
        self.stored.data.insert(self.access_key.clone(), dumped);
    }

    pub fn to_stored(&self) -> StoredRecord {
        self.stored.clone()
    }

    /// Flat document view: system columns, then `data`, with the live access dump.
    pub fn document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("id".to_string(), Value::from(self.stored.id.as_str()));
        doc.insert(
            "pid".to_string(),
            self.stored.pid.as_deref().map(Value::from).unwrap_or(Value::Null),
        );
        doc.insert("created".to_string(), Value::from(self.stored.created.as_str()));
        doc.insert("updated".to_string(), Value::from(self.stored.updated.as_str()));
        doc.insert("is_deleted".to_string(), Value::Bool(self.stored.is_deleted));
        doc.insert("is_finished".to_string(), Value::Bool(self.stored.is_finished));
        doc.insert(
            "user_id".to_string(),
            self.stored.user_id.as_ref().map(AgentId::to_value).unwrap_or(Value::Null),
        );
        doc.insert(
            "service".to_string(),
            self.stored.service.as_deref().map(Value::from).unwrap_or(Value::Null),
        );
        for (k, v) in &self.stored.data {
            doc.insert(k.clone(), v.clone());
        }
        doc.insert(self.access_key.clone(), self.peek_access().dump());
        Value::Object(doc)
    }

    /// Dotted-path lookup into [`Record::document`], e.g. `metadata.title`.
    pub fn field(&self, path: &str) -> Option<Value> {
        lookup_path(&self.document(), path).cloned()
    }
}

fn build_access(registry: &AgentRegistry, value: Option<&Value>) -> RecordAccess {
    match value {
        Some(v) => RecordAccess::from_value(registry, v),
        None => RecordAccess::new(),
    }
}

/// Walk `a.b.c` through objects (and numeric indexes through arrays).
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Falsy: null, false, zero, empty string/list/object.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
