//! Permission policy: named actions mapped to lists of need generators.
//!
//! An action is allowed when any generator in its list grants the identity,
//! unless a `disable` generator is in effect, which denies everyone.
//! Conditional generators (`if_field`, `all_fields`) pick their `then` or `else`
//! branch from dotted field paths into the record document and fall back to
//! `else` when no record is involved (e.g. `create`, `search`).

use crate::core::agent::Agent;
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::record::{Record, is_truthy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Search,
    ManageAccess,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Search,
        Action::ManageAccess,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Search => "search",
            Action::ManageAccess => "manage_access",
        }
    }
}

impl FromStr for Action {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| WardenError::ConfigError(format!("unknown action '{}'", s)))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Permission-policy collaborator of the record service.
pub trait PermissionPolicy {
    fn evaluate(&self, action: Action, identity: &Identity, record: Option<&Record>) -> Decision;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    AnyUser,
    AuthenticatedUser,
    SystemProcess,
    Role {
        name: String,
    },
    /// The caller is in the record's `owned_by` list.
    RecordOwner,
    RecordContributor,
    Disable,
    IfField {
        field: String,
        #[serde(default)]
        then: Vec<Generator>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Generator>,
    },
    AllFields {
        fields: Vec<String>,
        #[serde(default)]
        then: Vec<Generator>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Generator>,
    },
}

impl Generator {
    pub fn role(name: &str) -> Self {
        Generator::Role {
            name: name.to_string(),
        }
    }

    /// Flatten conditionals against `record` into leaf generators.
    fn expand<'g>(&'g self, record: Option<&Record>, out: &mut Vec<&'g Generator>) {
        match self {
            Generator::IfField {
                field,
                then,
                otherwise,
            } => {
                let branch = match record.and_then(|r| r.field(field)) {
                    Some(value) if is_truthy(&value) => then,
                    _ => otherwise,
                };
                branch.iter().for_each(|g| g.expand(record, out));
            }
            Generator::AllFields {
                fields,
                then,
                otherwise,
            } => {
                let all_set = record.is_some_and(|r| {
                    fields
                        .iter()
                        .all(|f| r.field(f).is_some_and(|v| is_truthy(&v)))
                });
                let branch = if all_set { then } else { otherwise };
                branch.iter().for_each(|g| g.expand(record, out));
            }
            leaf => out.push(leaf),
        }
    }

    fn grants(&self, identity: &Identity, record: Option<&Record>) -> bool {
        match self {
            Generator::AnyUser => true,
            Generator::AuthenticatedUser => identity.is_authenticated(),
            Generator::SystemProcess => identity.system,
            Generator::Role { name } => identity.has_role(name),
            Generator::RecordOwner => listed(identity, record, |r, agent| {
                r.peek_access().owners().contains(agent)
            }),
            Generator::RecordContributor => listed(identity, record, |r, agent| {
                r.peek_access().contributors().contains(agent)
            }),
            Generator::Disable | Generator::IfField { .. } | Generator::AllFields { .. } => false,
        }
    }
}

fn listed(identity: &Identity, record: Option<&Record>, check: impl Fn(&Record, &Agent) -> bool) -> bool {
    let Some(record) = record else {
        return false;
    };
    match Agent::from_principal(record.registry(), identity) {
        Ok(agent) => check(record, &agent),
        Err(_) => false,
    }
}

/// Generator-based policy. Actions without an entry are denied.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPermissionPolicy {
    rules: BTreeMap<Action, Vec<Generator>>,
}

impl Default for RecordPermissionPolicy {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        for action in [
            Action::Create,
            Action::Read,
            Action::Update,
            Action::Delete,
            Action::Search,
        ] {
            rules.insert(
                action,
                vec![Generator::AuthenticatedUser, Generator::SystemProcess],
            );
        }
        rules.insert(
            Action::ManageAccess,
            vec![Generator::SystemProcess, Generator::role("admin")],
        );
        Self { rules }
    }
}

impl RecordPermissionPolicy {
    /// A policy that denies everything until rules are added.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Defaults with the given per-action rules replacing theirs.
    ///
    /// Keys are action names as written in configuration files.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<Generator>>) -> Result<Self, WardenError> {
        let mut policy = Self::default();
        for (action, generators) in overrides {
            policy.rules.insert(action.parse()?, generators.clone());
        }
        Ok(policy)
    }

    pub fn set(&mut self, action: Action, generators: Vec<Generator>) -> &mut Self {
        self.rules.insert(action, generators);
        self
    }

    pub fn generators(&self, action: Action) -> &[Generator] {
        self.rules.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PermissionPolicy for RecordPermissionPolicy {
    fn evaluate(&self, action: Action, identity: &Identity, record: Option<&Record>) -> Decision {
        let mut leaves = Vec::new();
        for generator in self.generators(action) {
            generator.expand(record, &mut leaves);
        }
        if leaves.iter().any(|g| matches!(g, Generator::Disable)) {
            return Decision::Deny;
        }
        if leaves.iter().any(|g| g.grants(identity, record)) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
