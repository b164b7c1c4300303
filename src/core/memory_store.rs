use crate::core::error::WardenError;
use crate::core::pagination::Pagination;
use crate::core::record::{DEFAULT_ACCESS_FIELD, StoredRecord};
use crate::core::store::{Page, RecordFilter, RecordStore};
use std::cell::RefCell;

/// In-process [`RecordStore`] with the same semantics as the SQLite one.
#[derive(Debug)]
pub struct MemoryRecordStore {
    rows: RefCell<Vec<StoredRecord>>,
    access_field: String,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self {
            rows: RefCell::new(Vec::new()),
            access_field: DEFAULT_ACCESS_FIELD.to_string(),
        }
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_field(mut self, access_field: &str) -> Self {
        self.access_field = access_field.to_string();
        self
    }

    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    fn find(&self, include_deleted: bool, pred: impl Fn(&StoredRecord) -> bool) -> Option<StoredRecord> {
        self.rows
            .borrow()
            .iter()
            .find(|r| pred(r) && (include_deleted || !r.is_deleted))
            .cloned()
    }

    fn pid_taken_by_other(&self, record: &StoredRecord) -> bool {
        let Some(pid) = record.pid.as_deref() else {
            return false;
        };
        self.rows
            .borrow()
            .iter()
            .any(|r| r.id != record.id && r.pid.as_deref() == Some(pid))
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, record: &StoredRecord) -> Result<StoredRecord, WardenError> {
        if self.pid_taken_by_other(record) {
            return Err(WardenError::DuplicateIdentifier {
                field: "id".to_string(),
                value: record.pid.clone().unwrap_or_default(),
            });
        }
        let mut rows = self.rows.borrow_mut();
        if rows.iter().any(|r| r.id == record.id) {
            return Err(WardenError::DuplicateIdentifier {
                field: "id".to_string(),
                value: record.id.clone(),
            });
        }
        rows.push(record.clone());
        Ok(record.clone())
    }

    fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<StoredRecord, WardenError> {
        self.find(include_deleted, |r| r.id == id)
            .ok_or_else(|| WardenError::RecordNotFound(id.to_string()))
    }

    fn get_by_pid(&self, pid: &str, include_deleted: bool) -> Result<StoredRecord, WardenError> {
        self.find(include_deleted, |r| r.pid.as_deref() == Some(pid))
            .ok_or_else(|| WardenError::RecordNotFound(pid.to_string()))
    }

    fn pid_exists(&self, pid: &str) -> Result<bool, WardenError> {
        Ok(self.find(true, |r| r.pid.as_deref() == Some(pid)).is_some())
    }

    fn query(&self, filter: &RecordFilter, pagination: &Pagination) -> Result<Page, WardenError> {
        let rows = self.rows.borrow();
        let matching: Vec<&StoredRecord> = rows
            .iter()
            .filter(|r| filter.matches(r, &self.access_field))
            .collect();
        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(pagination.limit()).unwrap_or_default();
        Ok(Page {
            total: matching.len() as u64,
            items: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    fn commit(&self, record: &StoredRecord) -> Result<(), WardenError> {
        if self.pid_taken_by_other(record) {
            return Err(WardenError::DuplicateIdentifier {
                field: "id".to_string(),
                value: record.pid.clone().unwrap_or_default(),
            });
        }
        let mut rows = self.rows.borrow_mut();
        match rows.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => rows.push(record.clone()),
        }
        Ok(())
    }
    fn access_field(&self) -> &str {
        &self.access_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn stored(id: &str, deleted: bool) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            pid: None,
            created: "1Z".to_string(),
            updated: "1Z".to_string(),
            is_deleted: deleted,
            is_finished: false,
            user_id: None,
            service: None,
            data: Map::new(),
        }
    }

    #[test]
    fn query_pages_in_insertion_order() {
        let store = MemoryRecordStore::new();
        for id in ["a", "b", "c", "d"] {
            store.create(&stored(id, false)).unwrap();
        }
        store.create(&stored("gone", true)).unwrap();

        let page = store
            .query(&RecordFilter::default(), &Pagination::new(2, 2, 100))
            .unwrap();
        assert_eq!(page.total, 4);
        let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn commit_replaces_in_place() {
        let store = MemoryRecordStore::new();
        store.create(&stored("a", false)).unwrap();
        let mut updated = stored("a", false);
        updated.is_finished = true;
        store.commit(&updated).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get_by_id("a", false).unwrap().is_finished);
    }
}
