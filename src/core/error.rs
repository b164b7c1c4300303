use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Permission denied: {identity} may not {action}")]
    PermissionDenied { action: String, identity: String },
    #[error("Validation error: {0}")]
    ValidationError(ValidationErrors),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Duplicate identifier for '{field}': {value}")]
    DuplicateIdentifier { field: String, value: String },
    #[error("Invalid querystring: {0}")]
    InvalidQuerystring(String),
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error(transparent)]
    AgentError(#[from] AgentError),
}

impl WardenError {
    /// Shorthand for a single-field validation failure.
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::default();
        errors.push(field, message);
        WardenError::ValidationError(errors)
    }

    /// Field-level view of validation-style failures; empty for everything else.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            WardenError::ValidationError(errors) => errors.iter().cloned().collect(),
            WardenError::DuplicateIdentifier { field, .. } => vec![FieldError {
                field: field.clone(),
                message: "The selected identifier already exists.".to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

/// Failures while building or editing agent lists.
///
/// Cloneable so that partially decoded access objects can keep them around.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),
    #[error("Invalid agent source: {0}")]
    InvalidAgentSource(String),
    #[error("Agent not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every violation found while loading a payload, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, message: &str) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn into_result<T>(self, ok: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(ok) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", rendered)
    }
}
