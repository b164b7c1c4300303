//! Service plugin registry: the narrow `exists`/`get`/`list` interface the
//! record service and schemas consume.

use crate::core::error::WardenError;
use crate::core::validation::FieldSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// A service a record may be attached to (e.g. a storage or compute backend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlugin {
    pub id: String,
    #[serde(default)]
    pub metadata: Value,
    /// Fields the plugin expects in its custom payload section.
    #[serde(default)]
    pub schema: Vec<FieldSpec>,
}

pub trait PluginRegistry {
    fn exists(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Result<&ServicePlugin, WardenError>;

    /// `[{id, metadata}]` for every registered service.
    fn list(&self) -> Vec<Value>;
}

/// Registry backed by a fixed, id-ordered set of plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginManager {
    services: BTreeMap<String, ServicePlugin>,
}

impl PluginManager {
    pub fn new(plugins: impl IntoIterator<Item = ServicePlugin>) -> Self {
        Self {
            services: plugins.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn register(&mut self, plugin: ServicePlugin) -> &mut Self {
        self.services.insert(plugin.id.clone(), plugin);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

impl PluginRegistry for PluginManager {
    fn exists(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    fn get(&self, name: &str) -> Result<&ServicePlugin, WardenError> {
        self.services
            .get(name)
            .ok_or_else(|| WardenError::PluginNotFound(name.to_string()))
    }

    fn list(&self) -> Vec<Value> {
        self.services
            .values()
            .map(|p| json!({"id": p.id, "metadata": p.metadata}))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_and_listing() {
        let manager = PluginManager::new([
            ServicePlugin {
                id: "zenodo".to_string(),
                metadata: json!({"title": "Zenodo"}),
                schema: Vec::new(),
            },
            ServicePlugin {
                id: "b2share".to_string(),
                metadata: Value::Null,
                schema: Vec::new(),
            },
        ]);
        assert!(manager.exists("zenodo"));
        assert!(!manager.exists("figshare"));
        assert!(matches!(manager.get("figshare"), Err(WardenError::PluginNotFound(_))));
        assert_eq!(
            manager.list(),
            vec![
                json!({"id": "b2share", "metadata": null}),
                json!({"id": "zenodo", "metadata": {"title": "Zenodo"}}),
            ]
        );
    }
}
