//! The acting principal of a service call.

use crate::core::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Authorization context supplied by the caller for one operation.
///
/// `id` is the user id (`None` for anonymous callers); `system` marks
/// internal processes that act outside any user session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Option<AgentId>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub system: bool,
}

impl Identity {
    pub fn user(id: impl Into<AgentId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn system_process() -> Self {
        Self {
            system: true,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.insert(role.to_string());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, self.system) {
            (_, true) => write!(f, "system"),
            (Some(id), false) => write!(f, "user:{}", id),
            (None, false) => write!(f, "anonymous"),
        }
    }
}
