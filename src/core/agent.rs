//! Agents: the principals (users, projects, ...) that own or contribute to a record.
//!
//! An agent is a tagged pair `(agent_type, agent_id)`. The set of known types is
//! not hardcoded: an [`AgentRegistry`] holds, per type, an optional loader used by
//! [`Agent::resolve`] and an optional native principal type recognized by
//! [`Agent::from_principal`].
//!
//! ```
//! use warden::core::agent::{Agent, AgentRegistry};
//!
//! let registry = AgentRegistry::default();
//! let agent = Agent::from_value(&registry, &serde_json::json!({"user": 5})).unwrap();
//! assert_eq!(agent.agent_type(), "user");
//! assert_eq!(agent.dump(), serde_json::json!({"user": 5}));
//! ```

use crate::core::error::AgentError;
use crate::core::identity::Identity;
use crate::core::record::Record;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Opaque agent identifier. Integer ids stay integers through a dump/load cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentId {
    Int(i64),
    Str(String),
}

impl AgentId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(AgentId::Int),
            Value::String(s) if !s.is_empty() => Some(AgentId::Str(s.clone())),
            _ => None,
        }
    }

    /// Integer-looking text becomes `Int`, anything else `Str`.
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(AgentId::Int)
            .unwrap_or_else(|_| AgentId::Str(raw.to_string()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            AgentId::Int(n) => Value::from(*n),
            AgentId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for AgentId {
    fn from(value: i64) -> Self {
        AgentId::Int(value)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        AgentId::Str(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        AgentId::Str(value)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Int(n) => write!(f, "{}", n),
            AgentId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A single principal attached to a record. Equal iff type and id are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Agent {
    agent_type: String,
    agent_id: AgentId,
}

impl Agent {
    pub(crate) fn new(agent_type: &str, agent_id: AgentId) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            agent_id,
        }
    }

    /// Build from a single-key mapping such as `{"user": 5}`.
    pub fn from_mapping(
        registry: &AgentRegistry,
        mapping: &Map<String, Value>,
    ) -> Result<Self, AgentError> {
        if mapping.len() != 1 {
            return Err(AgentError::InvalidAgentSource(format!(
                "expected exactly one agent type key, got {}",
                Value::Object(mapping.clone())
            )));
        }
        let Some((agent_type, raw_id)) = mapping.iter().next() else {
            return Err(AgentError::InvalidAgentSource("empty agent mapping".to_string()));
        };
        if !registry.is_registered(agent_type) {
            return Err(AgentError::UnknownAgentType(agent_type.clone()));
        }
        let agent_id = AgentId::from_value(raw_id).ok_or_else(|| {
            AgentError::InvalidAgentSource(format!("invalid id for '{}': {}", agent_type, raw_id))
        })?;
        Ok(Self::new(agent_type, agent_id))
    }

    pub fn from_value(registry: &AgentRegistry, value: &Value) -> Result<Self, AgentError> {
        match value {
            Value::Object(mapping) => Self::from_mapping(registry, mapping),
            other => Err(AgentError::InvalidAgentSource(format!(
                "expected an agent mapping, got {}",
                other
            ))),
        }
    }

    /// Build from a native principal (e.g. an [`Identity`] or a [`Record`]).
    pub fn from_principal(registry: &AgentRegistry, principal: &dyn Any) -> Result<Self, AgentError> {
        registry.agent_from_principal(principal)
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn dump(&self) -> Value {
        let mut mapping = Map::new();
        mapping.insert(self.agent_type.clone(), self.agent_id.to_value());
        Value::Object(mapping)
    }

    /// Look the underlying entity up through the registered loader.
    ///
    /// Not cached: every call goes to the loader again.
    pub fn resolve(&self, registry: &AgentRegistry) -> Option<Value> {
        registry.load(self)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.agent_type, self.agent_id)
    }
}

pub type AgentLoader = Arc<dyn Fn(&AgentId) -> Option<Value> + Send + Sync>;

type PrincipalExtractor = Box<dyn Fn(&dyn Any) -> Option<AgentId> + Send + Sync>;

struct AgentKind {
    name: String,
    loader: Option<AgentLoader>,
    principal: Option<(TypeId, PrincipalExtractor)>,
}

/// Type table for agents: known type names, their loaders and native principals.
pub struct AgentRegistry {
    kinds: Vec<AgentKind>,
    index: FxHashMap<String, usize>,
}

impl AgentRegistry {
    /// A registry with no types at all.
    pub fn empty() -> Self {
        Self {
            kinds: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn register_type(&mut self, name: &str) -> &mut Self {
        if !self.index.contains_key(name) {
            self.index.insert(name.to_string(), self.kinds.len());
            self.kinds.push(AgentKind {
                name: name.to_string(),
                loader: None,
                principal: None,
            });
        }
        self
    }

    pub fn register_loader<F>(&mut self, name: &str, loader: F) -> &mut Self
    where
        F: Fn(&AgentId) -> Option<Value> + Send + Sync + 'static,
    {
        let pos = self.ensure(name);
        self.kinds[pos].loader = Some(Arc::new(loader));
        self
    }

    /// Recognize values of `T` as agents of type `name`.
    ///
    /// `extract` returns `None` when the principal has no usable identifier.
    pub fn register_principal<T, F>(&mut self, name: &str, extract: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> Option<AgentId> + Send + Sync + 'static,
    {
        let pos = self.ensure(name);
        let erased: PrincipalExtractor =
            Box::new(move |any: &dyn Any| any.downcast_ref::<T>().and_then(|p| extract(p)));
        self.kinds[pos].principal = Some((TypeId::of::<T>(), erased));
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(|k| k.name.as_str())
    }

    /// Checked constructor for an agent of a known type.
    pub fn agent(&self, agent_type: &str, agent_id: impl Into<AgentId>) -> Result<Agent, AgentError> {
        if !self.is_registered(agent_type) {
            return Err(AgentError::UnknownAgentType(agent_type.to_string()));
        }
        Ok(Agent::new(agent_type, agent_id.into()))
    }

    /// Parse a `type:id` descriptor, e.g. `user:5` or `project:01J...`.
    pub fn parse_descriptor(&self, descriptor: &str) -> Result<Agent, AgentError> {
        let Some((agent_type, raw_id)) = descriptor.split_once(':') else {
            return Err(AgentError::InvalidAgentSource(format!(
                "expected 'type:id', got '{}'",
                descriptor
            )));
        };
        if raw_id.is_empty() {
            return Err(AgentError::InvalidAgentSource(format!(
                "missing id in '{}'",
                descriptor
            )));
        }
        self.agent(agent_type, AgentId::parse(raw_id))
    }

    pub fn load(&self, agent: &Agent) -> Option<Value> {
        let pos = self.index.get(agent.agent_type())?;
        let loader = self.kinds[*pos].loader.as_ref()?;
        loader(agent.agent_id())
    }

    fn agent_from_principal(&self, principal: &dyn Any) -> Result<Agent, AgentError> {
        let type_id = principal.type_id();
        for kind in &self.kinds {
            let Some((expected, extract)) = &kind.principal else {
                continue;
            };
            if *expected != type_id {
                continue;
            }
            return extract(principal)
                .map(|id| Agent::new(&kind.name, id))
                .ok_or_else(|| {
                    AgentError::InvalidAgentSource(format!(
                        "{} principal has no identifier",
                        kind.name
                    ))
                });
        }
        Err(AgentError::InvalidAgentSource(
            "principal type is not registered".to_string(),
        ))
    }

    fn ensure(&mut self, name: &str) -> usize {
        self.register_type(name);
        self.index[name]
    }
}

impl Default for AgentRegistry {
    /// `user` (principal: [`Identity`]) and `project` (principal: [`Record`]).
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_principal::<Identity, _>("user", |identity| identity.id.clone())
            .register_principal::<Record, _>("project", |record| Some(AgentId::from(record.id())));
        registry
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("types", &self.types().collect::<Vec<_>>())
            .finish()
    }
}
