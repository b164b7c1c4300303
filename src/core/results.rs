//! Operation results: a record (or page of records) bound to the caller's
//! identity, the schema used to serialize it, and optional link templates.

use crate::core::agent::AgentRegistry;
use crate::core::identity::Identity;
use crate::core::links::LinksTemplate;
use crate::core::pagination::Pagination;
use crate::core::record::Record;
use crate::core::registry::PluginRegistry;
use crate::core::validation::{RecordSchema, SchemaContext};
use serde_json::{Value, json};
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Everything needed to serialize records outside the service.
#[derive(Clone)]
pub struct Serializer {
    pub schema: Arc<dyn RecordSchema>,
    pub agents: Arc<AgentRegistry>,
    pub plugins: Arc<dyn PluginRegistry>,
}

impl Serializer {
    fn dump(&self, record: &Record, identity: &Identity) -> Value {
        let ctx = SchemaContext {
            identity,
            record: Some(record),
            agents: &self.agents,
            plugins: self.plugins.as_ref(),
        };
        self.schema.dump(record, &ctx)
    }
}

/// Single record result. Serialized on first use, then cached.
pub struct ItemResult {
    record: Record,
    identity: Identity,
    serializer: Serializer,
    links: Option<Arc<LinksTemplate>>,
    data: OnceCell<Value>,
}

impl ItemResult {
    pub fn new(
        record: Record,
        identity: Identity,
        serializer: Serializer,
        links: Option<Arc<LinksTemplate>>,
    ) -> Self {
        Self {
            record,
            identity,
            serializer,
            links,
            data: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn links(&self) -> Option<Value> {
        self.links
            .as_ref()
            .map(|tpl| tpl.expand(&self.record.document()))
    }

    /// Schema dump of the record, with `links` appended when templated.
    pub fn data(&self) -> &Value {
        self.data.get_or_init(|| {
            let mut data = self.serializer.dump(&self.record, &self.identity);
            if let (Some(links), Value::Object(map)) = (self.links(), &mut data) {
                map.insert("links".to_string(), links);
            }
            data
        })
    }

    pub fn to_value(&self) -> Value {
        self.data().clone()
    }
}

impl fmt::Debug for ItemResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemResult")
            .field("id", &self.record.id())
            .field("identity", &self.identity)
            .finish()
    }
}

/// One page of search results plus the total match count.
pub struct ListResult {
    items: Vec<ItemResult>,
    total: u64,
    pagination: Pagination,
    links: Option<Arc<LinksTemplate>>,
}

impl ListResult {
    pub fn new(
        items: Vec<ItemResult>,
        total: u64,
        pagination: Pagination,
        links: Option<Arc<LinksTemplate>>,
    ) -> Self {
        Self {
            items,
            total,
            pagination,
            links,
        }
    }

    pub fn items(&self) -> &[ItemResult] {
        &self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Variables available to search link templates.
    pub fn pagination_context(&self) -> Value {
        json!({
            "page": self.pagination.page,
            "size": self.pagination.size,
            "total": self.total,
            "prev_page": self.pagination.prev_page(),
            "next_page": self.pagination.next_page(self.total),
        })
    }

    pub fn to_value(&self) -> Value {
        let hits: Vec<Value> = self.items.iter().map(ItemResult::to_value).collect();
        let mut out = json!({"hits": {"hits": hits, "total": self.total}});
        if let (Some(tpl), Value::Object(map)) = (&self.links, &mut out) {
            map.insert("links".to_string(), tpl.expand(&self.pagination_context()));
        }
        out
    }
}

impl fmt::Debug for ListResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListResult")
            .field("total", &self.total)
            .field("pagination", &self.pagination)
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::links::LinkSpec;
    use crate::core::registry::PluginManager;
    use crate::core::validation::FieldSchema;
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn serializer() -> Serializer {
        Serializer {
            schema: Arc::new(FieldSchema::default_record_schema()),
            agents: Arc::new(AgentRegistry::default()),
            plugins: Arc::new(PluginManager::default()),
        }
    }

    fn search_links() -> Arc<LinksTemplate> {
        let mut links = BTreeMap::new();
        links.insert("self".to_string(), LinkSpec::new("/records?page={page}&size={size}"));
        links.insert(
            "prev".to_string(),
            LinkSpec::new("/records?page={prev_page}&size={size}").when("prev_page"),
        );
        links.insert(
            "next".to_string(),
            LinkSpec::new("/records?page={next_page}&size={size}").when("next_page"),
        );
        Arc::new(LinksTemplate::new(links, Map::new()))
    }

    #[test]
    fn item_data_carries_links() {
        let mut record = Record::new(Arc::new(AgentRegistry::default()));
        record.set_metadata(json!({"title": "T"}));
        let mut links = BTreeMap::new();
        links.insert("self".to_string(), LinkSpec::new("/records/{id}"));
        let tpl = Arc::new(LinksTemplate::new(links, Map::new()));
        let id = record.id().to_string();

        let item = ItemResult::new(record, Identity::user(1), serializer(), Some(tpl));
        assert_eq!(item.data()["metadata"]["title"], "T");
        assert_eq!(item.data()["links"]["self"], format!("/records/{}", id));
    }

    #[test]
    fn list_shape_and_pagination_links() {
        let registry = Arc::new(AgentRegistry::default());
        let items = (0..2)
            .map(|_| ItemResult::new(Record::new(registry.clone()), Identity::user(1), serializer(), None))
            .collect();
        let list = ListResult::new(items, 5, Pagination::new(2, 2, 100), Some(search_links()));
        let out = list.to_value();
        assert_eq!(out["hits"]["total"], 5);
        assert_eq!(out["hits"]["hits"].as_array().unwrap().len(), 2);
        assert_eq!(out["links"]["self"], "/records?page=2&size=2");
        assert_eq!(out["links"]["prev"], "/records?page=1&size=2");
        assert_eq!(out["links"]["next"], "/records?page=3&size=2");

        let last = ListResult::new(Vec::new(), 5, Pagination::new(3, 2, 100), Some(search_links()));
        assert!(last.to_value()["links"].get("next").is_none());
    }
}
