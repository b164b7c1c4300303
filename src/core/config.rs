//! Service configuration, loaded from `warden.toml`.

use crate::core::error::WardenError;
use crate::core::links::{LinkSpec, LinksTemplate};
use crate::core::pagination::PaginationOptions;
use crate::core::policy::{Generator, RecordPermissionPolicy};
use crate::core::record::DEFAULT_ACCESS_FIELD;
use crate::core::registry::{PluginManager, ServicePlugin};
use crate::core::validation::{FieldSchema, SchemaConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const CONFIG_FILE_NAME: &str = "warden.toml";

/// Written by `warden init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# warden service configuration
service_id = "records"
access_field = "access"
components = ["metadata", "pid", "user", "service", "access", "soft_delete", "finish_status"]

[pagination]
default_results_per_page = 25
default_max_results = 10000

# [permissions]
# update = [{ kind = "if_field", field = "is_finished", then = [{ kind = "system_process" }], else = [{ kind = "authenticated_user" }] }]

[schema]
unknown = "exclude"

[links.context]
api = "/api"

[links.item]
self = "{+api}/records/{id}"

[links.actions]
finish = "{+api}/records/{id}/actions/finish"

[links.search]
self = "{+api}/records?page={page}&size={size}"
prev = { href = "{+api}/records?page={prev_page}&size={size}", when = "prev_page" }
next = { href = "{+api}/records?page={next_page}&size={size}", when = "next_page" }
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinksConfig {
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub item: BTreeMap<String, LinkSpec>,
    #[serde(default)]
    pub actions: BTreeMap<String, LinkSpec>,
    #[serde(default)]
    pub search: BTreeMap<String, LinkSpec>,
}

impl LinksConfig {
    /// Item template (with actions); `None` when nothing is configured.
    pub fn item_template(&self) -> Option<Arc<LinksTemplate>> {
        let tpl = LinksTemplate::new(self.item.clone(), self.context.clone())
            .with_actions(self.actions.clone());
        (!tpl.is_empty()).then(|| Arc::new(tpl))
    }

    pub fn search_template(&self) -> Option<Arc<LinksTemplate>> {
        let tpl = LinksTemplate::new(self.search.clone(), self.context.clone());
        (!tpl.is_empty()).then(|| Arc::new(tpl))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_id")]
    pub service_id: String,
    #[serde(default = "default_access_field")]
    pub access_field: String,
    /// Component names, in pipeline order.
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    #[serde(default)]
    pub pagination: PaginationOptions,
    /// Action name to generator list; replaces the default rule of that action.
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<Generator>>,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub plugins: Vec<ServicePlugin>,
}

fn default_service_id() -> String {
    "records".to_string()
}

fn default_access_field() -> String {
    DEFAULT_ACCESS_FIELD.to_string()
}

pub fn default_components() -> Vec<String> {
    [
        "metadata",
        "pid",
        "user",
        "service",
        "access",
        "soft_delete",
        "finish_status",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            access_field: default_access_field(),
            components: default_components(),
            pagination: PaginationOptions::default(),
            permissions: BTreeMap::new(),
            schema: SchemaConfig::default(),
            links: LinksConfig::default(),
            plugins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml(content: &str) -> Result<Self, WardenError> {
        toml::from_str(content).map_err(|e| WardenError::ConfigError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| WardenError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// A missing file means defaults, not an error.
    pub fn load_or_default(path: &Path) -> Result<Self, WardenError> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Self::default())
    }

    pub fn policy(&self) -> Result<RecordPermissionPolicy, WardenError> {
        RecordPermissionPolicy::with_overrides(&self.permissions)
    }

    pub fn field_schema(&self) -> Result<FieldSchema, WardenError> {
        FieldSchema::from_config(&self.schema)
    }

    pub fn plugin_manager(&self) -> PluginManager {
        PluginManager::new(self.plugins.iter().cloned())
    }
}
