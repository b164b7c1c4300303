//! Payload validation and record serialization.
//!
//! [`FieldSchema`] is a declarative schema: a list of [`FieldSpec`] rules plus a
//! policy for keys it does not know. Loading collects every violation before
//! failing, so callers see all field errors at once.

use crate::core::agent::{Agent, AgentRegistry};
use crate::core::error::{ValidationErrors, WardenError};
use crate::core::identity::Identity;
use crate::core::record::Record;
use crate::core::registry::PluginRegistry;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MSG_REQUIRED: &str = "Missing data for required field.";
pub const MSG_NULL: &str = "Field may not be null.";
pub const MSG_UNKNOWN: &str = "Unknown field.";
pub const MSG_PATTERN: &str = "String does not match expected pattern.";
pub const MSG_INVALID_PAYLOAD: &str = "Invalid input type.";
pub const PID_MESSAGE: &str = "The ID should contain only letters with numbers or dashes.";
pub const PID_PATTERN: &str = r"^[-\w]+$";

/// What a schema sees besides the payload.
pub struct SchemaContext<'a> {
    pub identity: &'a Identity,
    pub record: Option<&'a Record>,
    pub agents: &'a AgentRegistry,
    pub plugins: &'a dyn PluginRegistry,
}

/// Schema/validation collaborator of the record service.
pub trait RecordSchema {
    /// Validated, known fields of `payload`, or every violation found.
    fn load(&self, payload: &Value, ctx: &SchemaContext<'_>) -> Result<Map<String, Value>, ValidationErrors>;

    fn dump(&self, record: &Record, ctx: &SchemaContext<'_>) -> Value;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Object,
    Array,
    /// A single-key agent mapping such as `{"user": 5}`.
    Agent,
    #[default]
    Any,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    #[default]
    Exclude,
    Raise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotBlank {
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub not_blank: Option<NotBlank>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub pattern_message: Option<String>,
    #[serde(default)]
    pub one_of: Option<Vec<String>>,
    /// Value must be the id of a registered service plugin.
    #[serde(default)]
    pub plugin_service: bool,
    /// Validate this object with the schema of the plugin named by that sibling field.
    #[serde(default)]
    pub plugin_schema_from: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            not_blank: None,
            pattern: None,
            pattern_message: None,
            one_of: None,
            plugin_service: false,
            plugin_schema_from: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn not_blank(mut self, max: usize) -> Self {
        self.not_blank = Some(NotBlank { max });
        self
    }

    pub fn pattern(mut self, pattern: &str, message: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self.pattern_message = Some(message.to_string());
        self
    }

    pub fn one_of(mut self, choices: &[&str]) -> Self {
        self.one_of = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn plugin_service(mut self) -> Self {
        self.plugin_service = true;
        self
    }

    pub fn plugin_schema_from(mut self, sibling: &str) -> Self {
        self.plugin_schema_from = Some(sibling.to_string());
        self
    }
}

/// Serialized form of a schema, as found under `[schema]` in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub unknown: UnknownPolicy,
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
    unknown: UnknownPolicy,
    patterns: FxHashMap<String, Regex>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>, unknown: UnknownPolicy) -> Result<Self, WardenError> {
        let mut patterns = FxHashMap::default();
        for spec in &fields {
            if let Some(pattern) = &spec.pattern {
                let re = Regex::new(pattern).map_err(|e| {
                    WardenError::ConfigError(format!("invalid pattern for '{}': {}", spec.name, e))
                })?;
                patterns.insert(spec.name.clone(), re);
            }
        }
        Ok(Self {
            fields,
            unknown,
            patterns,
        })
    }

    /// Empty configurations fall back to [`FieldSchema::default_record_schema`].
    pub fn from_config(config: &SchemaConfig) -> Result<Self, WardenError> {
        if config.fields.is_empty() {
            let mut schema = Self::default_record_schema();
            schema.unknown = config.unknown;
            return Ok(schema);
        }
        Self::new(config.fields.clone(), config.unknown)
    }

    /// `id` (optional pid), `metadata` (required object), `service` (plugin id).
    pub fn default_record_schema() -> Self {
        let fields = vec![
            FieldSpec::new("id", FieldKind::String).pattern(PID_PATTERN, PID_MESSAGE),
            FieldSpec::new("metadata", FieldKind::Object).required(),
            FieldSpec::new("service", FieldKind::String).plugin_service(),
        ];
        let mut patterns = FxHashMap::default();
        if let Ok(re) = Regex::new(PID_PATTERN) {
            patterns.insert("id".to_string(), re);
        }
        Self {
            fields,
            unknown: UnknownPolicy::Exclude,
            patterns,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn unknown_policy(&self) -> UnknownPolicy {
        self.unknown
    }

    fn check_field(
        &self,
        spec: &FieldSpec,
        value: &Value,
        payload: &Map<String, Value>,
        ctx: &SchemaContext<'_>,
        errors: &mut ValidationErrors,
    ) {
        let name = spec.name.as_str();
        if value.is_null() {
            errors.push(name, MSG_NULL);
            return;
        }
        if let Err(message) = check_kind(spec.kind, value, ctx.agents) {
            errors.push(name, &message);
            return;
        }
        if let (Some(rule), Some(text)) = (spec.not_blank, value.as_str()) {
            let len = text.chars().count();
            if len < 1 || len > rule.max {
                errors.push(
                    name,
                    &format!("Not empty string and less than {} characters allowed.", rule.max),
                );
            }
        }
        if let (Some(re), Some(text)) = (self.patterns.get(name), value.as_str()) {
            if !re.is_match(text) {
                errors.push(name, spec.pattern_message.as_deref().unwrap_or(MSG_PATTERN));
            }
        }
        if let (Some(choices), Some(text)) = (&spec.one_of, value.as_str()) {
            if !choices.iter().any(|c| c == text) {
                errors.push(name, &format!("Must be one of: {}.", choices.join(", ")));
            }
        }
        if spec.plugin_service {
            check_plugin_service(name, value, ctx.plugins, errors);
        }
        if let Some(sibling) = &spec.plugin_schema_from {
            check_plugin_schema(name, value, payload.get(sibling), ctx, errors);
        }
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::default_record_schema()
    }
}

impl RecordSchema for FieldSchema {
    fn load(&self, payload: &Value, ctx: &SchemaContext<'_>) -> Result<Map<String, Value>, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let Value::Object(input) = payload else {
            errors.push("_schema", MSG_INVALID_PAYLOAD);
            return Err(errors);
        };

        let mut out = Map::new();
        for spec in &self.fields {
            match input.get(&spec.name) {
                None if spec.required => errors.push(&spec.name, MSG_REQUIRED),
                None => {}
                Some(value) => {
                    let before = errors.len();
                    self.check_field(spec, value, input, ctx, &mut errors);
                    if errors.len() == before {
                        out.insert(spec.name.clone(), value.clone());
                    }
                }
            }
        }

        if self.unknown == UnknownPolicy::Raise {
            for key in input.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    errors.push(key, MSG_UNKNOWN);
                }
            }
        }

        errors.into_result(out)
    }

    fn dump(&self, record: &Record, _ctx: &SchemaContext<'_>) -> Value {
        record.document()
    }
}

fn check_kind(kind: FieldKind, value: &Value, agents: &AgentRegistry) -> Result<(), String> {
    let ok = match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.as_i64().is_some(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Object => value.is_object(),
        FieldKind::Array => value.is_array(),
        FieldKind::Agent => {
            return Agent::from_value(agents, value).map(|_| ()).map_err(|e| e.to_string());
        }
        FieldKind::Any => true,
    };
    if ok {
        return Ok(());
    }
    let message = match kind {
        FieldKind::String => "Not a valid string.",
        FieldKind::Integer => "Not a valid integer.",
        FieldKind::Boolean => "Not a valid boolean.",
        FieldKind::Object => "Not a valid mapping type.",
        FieldKind::Array => "Not a valid list.",
        FieldKind::Agent | FieldKind::Any => MSG_INVALID_PAYLOAD,
    };
    Err(message.to_string())
}

fn check_plugin_service(name: &str, value: &Value, plugins: &dyn PluginRegistry, errors: &mut ValidationErrors) {
    let available: Vec<String> = plugins
        .list()
        .iter()
        .filter_map(|p| p.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
    // Nothing registered: any service id is accepted.
    if available.is_empty() {
        return;
    }
    let Some(text) = value.as_str() else {
        return;
    };
    if !plugins.exists(text) {
        errors.push(name, &format!("Must be one of: {}.", available.join(", ")));
    }
}

fn check_plugin_schema(
    name: &str,
    value: &Value,
    sibling: Option<&Value>,
    ctx: &SchemaContext<'_>,
    errors: &mut ValidationErrors,
) {
    let Some(service) = sibling.and_then(Value::as_str) else {
        return;
    };
    let plugin = match ctx.plugins.get(service) {
        Ok(plugin) => plugin,
        Err(e) => {
            errors.push(name, &e.to_string());
            return;
        }
    };
    let schema = match FieldSchema::new(plugin.schema.clone(), UnknownPolicy::Exclude) {
        Ok(schema) => schema,
        Err(e) => {
            errors.push(name, &e.to_string());
            return;
        }
    };
    if let Err(nested) = schema.load(value, ctx) {
        for e in nested.iter() {
            errors.push(&format!("{}.{}", name, e.field), &e.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{PluginManager, ServicePlugin};
    use serde_json::json;

    fn load(schema: &FieldSchema, plugins: &PluginManager, payload: Value) -> Result<Map<String, Value>, ValidationErrors> {
        let identity = Identity::user(1);
        let agents = AgentRegistry::default();
        let ctx = SchemaContext {
            identity: &identity,
            record: None,
            agents: &agents,
            plugins,
        };
        schema.load(&payload, &ctx)
    }

    #[test]
    fn all_violations_are_reported_together() {
        let schema = FieldSchema::default_record_schema();
        let errors = load(&schema, &PluginManager::default(), json!({"id": "bad id!"})).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_field("metadata"));
        assert!(errors.iter().any(|e| e.message == PID_MESSAGE));
    }

    #[test]
    fn unknown_fields_follow_the_policy() {
        let schema = FieldSchema::default_record_schema();
        let out = load(&schema, &PluginManager::default(), json!({"metadata": {}, "extra": 1})).unwrap();
        assert!(!out.contains_key("extra"));

        let strict = FieldSchema::new(schema.fields().to_vec(), UnknownPolicy::Raise).unwrap();
        let errors = load(&strict, &PluginManager::default(), json!({"metadata": {}, "extra": 1})).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().message, MSG_UNKNOWN);
    }

    #[test]
    fn not_blank_bounds_length() {
        let schema = FieldSchema::new(
            vec![FieldSpec::new("title", FieldKind::String).required().not_blank(5)],
            UnknownPolicy::Exclude,
        )
        .unwrap();
        let plugins = PluginManager::default();
        assert!(load(&schema, &plugins, json!({"title": "abc"})).is_ok());
        for bad in ["", "abcdef"] {
            let errors = load(&schema, &plugins, json!({"title": bad})).unwrap_err();
            assert_eq!(
                errors.iter().next().unwrap().message,
                "Not empty string and less than 5 characters allowed."
            );
        }
    }

    #[test]
    fn plugin_fields_are_checked_against_the_registry() {
        let plugins = PluginManager::new([ServicePlugin {
            id: "zenodo".to_string(),
            metadata: Value::Null,
            schema: vec![FieldSpec::new("community", FieldKind::String).required()],
        }]);
        let schema = FieldSchema::new(
            vec![
                FieldSpec::new("service", FieldKind::String).plugin_service(),
                FieldSpec::new("custom", FieldKind::Object).plugin_schema_from("service"),
            ],
            UnknownPolicy::Exclude,
        )
        .unwrap();

        let errors = load(&schema, &plugins, json!({"service": "figshare"})).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().message, "Must be one of: zenodo.");

        let errors = load(&schema, &plugins, json!({"service": "zenodo", "custom": {}})).unwrap_err();
        assert!(errors.contains_field("custom.community"));

        assert!(load(&schema, &plugins, json!({"service": "zenodo", "custom": {"community": "c"}})).is_ok());
    }

    #[test]
    fn agent_fields_use_the_agent_registry() {
        let schema = FieldSchema::new(vec![FieldSpec::new("owner", FieldKind::Agent)], UnknownPolicy::Exclude).unwrap();
        let plugins = PluginManager::default();
        assert!(load(&schema, &plugins, json!({"owner": {"user": 1}})).is_ok());
        let errors = load(&schema, &plugins, json!({"owner": {"team": 1}})).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().message, "Unknown agent type: team");
    }

    #[test]
    fn bad_patterns_are_config_errors() {
        let err = FieldSchema::new(
            vec![FieldSpec::new("x", FieldKind::String).pattern("(", "nope")],
            UnknownPolicy::Exclude,
        )
        .unwrap_err();
        assert!(matches!(err, WardenError::ConfigError(_)));
    }
}
