//! Record access: the owners and contributors lists attached to a record.

use crate::core::agent::{Agent, AgentRegistry};
use crate::core::error::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const OWNED_BY: &str = "owned_by";
pub const CONTRIBUTED_BY: &str = "contributed_by";

/// Which of the two access lists an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Owner,
    Contributor,
}

impl AccessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessRole::Owner => "owner",
            AccessRole::Contributor => "contributor",
        }
    }

    /// Key of the matching list in a dumped access mapping.
    pub fn dump_key(self) -> &'static str {
        match self {
            AccessRole::Owner => OWNED_BY,
            AccessRole::Contributor => CONTRIBUTED_BY,
        }
    }
}

impl FromStr for AccessRole {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" | "owners" | OWNED_BY => Ok(AccessRole::Owner),
            "contributor" | "contributors" | CONTRIBUTED_BY => Ok(AccessRole::Contributor),
            other => Err(AgentError::InvalidAgentSource(format!(
                "unknown access role '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of agents: no duplicates, insertion order kept for display.
#[derive(Debug, Clone, Default)]
pub struct AgentList {
    agents: Vec<Agent>,
}

impl AgentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an equal agent is already present.
    pub fn add(&mut self, agent: Agent) {
        if !self.contains(&agent) {
            self.agents.push(agent);
        }
    }

    /// Build an agent from a raw mapping and add it.
    pub fn add_value(&mut self, registry: &AgentRegistry, source: &Value) -> Result<(), AgentError> {
        let agent = Agent::from_value(registry, source)?;
        self.add(agent);
        Ok(())
    }

    pub fn remove(&mut self, agent: &Agent) -> Result<Agent, AgentError> {
        let pos = self
            .agents
            .iter()
            .position(|a| a == agent)
            .ok_or_else(|| AgentError::NotFound(agent.to_string()))?;
        Ok(self.agents.remove(pos))
    }

    pub fn remove_value(&mut self, registry: &AgentRegistry, source: &Value) -> Result<Agent, AgentError> {
        let agent = Agent::from_value(registry, source)?;
        self.remove(&agent)
    }

    pub fn contains(&self, agent: &Agent) -> bool {
        self.agents.iter().any(|a| a == agent)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Agent> {
        self.agents.iter()
    }

    pub fn dump(&self) -> Vec<Value> {
        self.agents.iter().map(Agent::dump).collect()
    }
}

impl Extend<Agent> for AgentList {
    fn extend<I: IntoIterator<Item = Agent>>(&mut self, iter: I) {
        for agent in iter {
            self.add(agent);
        }
    }
}

impl FromIterator<Agent> for AgentList {
    fn from_iter<I: IntoIterator<Item = Agent>>(iter: I) -> Self {
        let mut list = AgentList::new();
        list.extend(iter);
        list
    }
}

impl<'a> IntoIterator for &'a AgentList {
    type Item = &'a Agent;
    type IntoIter = std::slice::Iter<'a, Agent>;

    fn into_iter(self) -> Self::IntoIter {
        self.agents.iter()
    }
}

/// Set equality: order is a display concern only.
impl PartialEq for AgentList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.agents.iter().all(|a| other.contains(a))
    }
}

impl Eq for AgentList {}

/// Owners and contributors of a record.
///
/// Built best-effort from persisted data: entries that fail to decode are kept
/// in [`RecordAccess::errors`] instead of failing the whole load.
#[derive(Debug, Clone, Default)]
pub struct RecordAccess {
    pub owned_by: AgentList,
    pub contributed_by: AgentList,
    errors: Vec<AgentError>,
}

impl RecordAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists(owned_by: AgentList, contributed_by: AgentList) -> Self {
        Self {
            owned_by,
            contributed_by,
            errors: Vec::new(),
        }
    }

    /// Decode `{"owned_by": [...], "contributed_by": [...]}`; both keys optional.
    pub fn from_value(registry: &AgentRegistry, value: &Value) -> Self {
        let mut access = Self::new();
        let mapping = match value {
            Value::Object(mapping) => mapping,
            Value::Null => return access,
            other => {
                access.errors.push(AgentError::InvalidAgentSource(format!(
                    "expected an access mapping, got {}",
                    other
                )));
                return access;
            }
        };
        for role in [AccessRole::Owner, AccessRole::Contributor] {
            access.load_list(registry, mapping, role);
        }
        access
    }

    fn load_list(&mut self, registry: &AgentRegistry, mapping: &Map<String, Value>, role: AccessRole) {
        let entries = match mapping.get(role.dump_key()) {
            None | Some(Value::Null) => return,
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                self.errors.push(AgentError::InvalidAgentSource(format!(
                    "'{}' must be a list, got {}",
                    role.dump_key(),
                    other
                )));
                return;
            }
        };
        for entry in entries {
            match Agent::from_value(registry, entry) {
                Ok(agent) => self.list_mut(role).add(agent),
                Err(e) => self.errors.push(e),
            }
        }
    }

    pub fn owners(&self) -> &AgentList {
        &self.owned_by
    }

    pub fn owners_mut(&mut self) -> &mut AgentList {
        &mut self.owned_by
    }

    pub fn contributors(&self) -> &AgentList {
        &self.contributed_by
    }

    pub fn contributors_mut(&mut self) -> &mut AgentList {
        &mut self.contributed_by
    }

    pub fn list(&self, role: AccessRole) -> &AgentList {
        match role {
            AccessRole::Owner => &self.owned_by,
            AccessRole::Contributor => &self.contributed_by,
        }
    }

    pub fn list_mut(&mut self, role: AccessRole) -> &mut AgentList {
        match role {
            AccessRole::Owner => &mut self.owned_by,
            AccessRole::Contributor => &mut self.contributed_by,
        }
    }

    /// Entries skipped during the last decode. Callers must check this.
    pub fn errors(&self) -> &[AgentError] {
        &self.errors
    }

    pub fn dump(&self) -> Value {
        serde_json::json!({
            OWNED_BY: self.owned_by.dump(),
            CONTRIBUTED_BY: self.contributed_by.dump(),
        })
    }

    /// Re-derive lists and errors in place from freshly reloaded data.
    pub fn refresh_from_value(&mut self, registry: &AgentRegistry, value: &Value) {
        *self = Self::from_value(registry, value);
    }
}

/// Equal when both agent sets are equal; decode errors are not compared.
impl PartialEq for RecordAccess {
    fn eq(&self, other: &Self) -> bool {
        self.owned_by == other.owned_by && self.contributed_by == other.contributed_by
    }
}

impl fmt::Display for RecordAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<RecordAccess (owners: {}, contributors: {})>",
            self.owned_by.len(),
            self.contributed_by.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_default_to_empty_lists() {
        let registry = AgentRegistry::default();
        let access = RecordAccess::from_value(&registry, &json!({}));
        assert!(access.owners().is_empty());
        assert!(access.contributors().is_empty());
        assert!(access.errors().is_empty());
        assert_eq!(access.dump(), json!({"owned_by": [], "contributed_by": []}));
    }

    #[test]
    fn remove_missing_agent_leaves_list_untouched() {
        let registry = AgentRegistry::default();
        let mut list = AgentList::new();
        list.add(registry.agent("user", 1).unwrap());
        let err = list.remove(&registry.agent("user", 2).unwrap()).unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn list_equality_ignores_order() {
        let registry = AgentRegistry::default();
        let a = registry.agent("user", 1).unwrap();
        let b = registry.agent("project", "p").unwrap();
        let left: AgentList = [a.clone(), b.clone()].into_iter().collect();
        let right: AgentList = [b, a].into_iter().collect();
        assert_eq!(left, right);
        assert_eq!(left.dump(), vec![json!({"user": 1}), json!({"project": "p"})]);
    }

    #[test]
    fn non_list_entries_are_recorded_as_errors() {
        let registry = AgentRegistry::default();
        let access = RecordAccess::from_value(
            &registry,
            &json!({"owned_by": {"user": 1}, "contributed_by": [{"user": 2}]}),
        );
        assert_eq!(access.errors().len(), 1);
        assert!(access.owners().is_empty());
        assert_eq!(access.contributors().len(), 1);
    }

    #[test]
    fn roles_parse_from_admin_spellings() {
        assert_eq!("owner".parse::<AccessRole>().unwrap(), AccessRole::Owner);
        assert_eq!("contributors".parse::<AccessRole>().unwrap(), AccessRole::Contributor);
        assert!("reader".parse::<AccessRole>().is_err());
    }
}
