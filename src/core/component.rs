//! Component pipeline: side-effecting hooks run by the record service.
//!
//! A [`Component`] is a named set of handlers keyed by [`Operation`]. The
//! [`Pipeline`] runs, in registration order, every component that has a handler
//! for the current operation and skips the others. The first handler error
//! aborts the run; nothing has been persisted at that point.

use crate::core::access::AccessRole;
use crate::core::agent::{Agent, AgentId};
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::record::Record;
use crate::core::store::RecordStore;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Finish,
    /// Admin add/remove of an agent; details in [`CallContext::access_edit`].
    EditAccess,
    ListAgents,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Finish => "finish",
            Operation::EditAccess => "edit_access",
            Operation::ListAgents => "list_agents",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOperation {
    Add,
    Remove,
}

impl AccessOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessOperation::Add => "add",
            AccessOperation::Remove => "remove",
        }
    }
}

/// Target of an admin access edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEdit {
    pub operation: AccessOperation,
    pub role: AccessRole,
    pub agent: Agent,
}

/// Request-scoped parameters that are not part of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Project the record is created under; becomes its owner.
    pub project_id: Option<AgentId>,
    /// Service the caller is acting through; wins over the payload's `service`.
    pub service: Option<String>,
    pub access_edit: Option<AccessEdit>,
}

impl CallContext {
    pub fn with_project(mut self, project_id: impl Into<AgentId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }
}

/// Arguments handed to every handler of one pipeline run.
pub struct ComponentCall<'a> {
    pub operation: Operation,
    pub identity: &'a Identity,
    pub record: &'a mut Record,
    /// Validated payload (empty for operations without one).
    pub data: &'a mut Map<String, Value>,
    pub context: &'a CallContext,
    pub store: &'a dyn RecordStore,
}

pub type Handler = Box<dyn Fn(&mut ComponentCall<'_>) -> Result<(), WardenError> + Send + Sync>;

pub struct Component {
    name: String,
    handlers: Vec<(Operation, Handler)>,
}

impl Component {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handlers: Vec::new(),
        }
    }

    /// Register the handler for `operation`, replacing any previous one.
    pub fn on<F>(mut self, operation: Operation, handler: F) -> Self
    where
        F: Fn(&mut ComponentCall<'_>) -> Result<(), WardenError> + Send + Sync + 'static,
    {
        self.handlers.retain(|(op, _)| *op != operation);
        self.handlers.push((operation, Box::new(handler)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self, operation: Operation) -> bool {
        self.handler(operation).is_some()
    }

    fn handler(&self, operation: Operation) -> Option<&Handler> {
        self.handlers
            .iter()
            .find(|(op, _)| *op == operation)
            .map(|(_, h)| h)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field(
                "operations",
                &self.handlers.iter().map(|(op, _)| op.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Pipeline {
    components: Vec<Component>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Component) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(Component::name).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn run(&self, call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
        let operation = call.operation;
        for component in &self.components {
            let Some(handler) = component.handler(operation) else {
                continue;
            };
            tracing::debug!(component = component.name(), op = %operation, record = call.record.id(), "running component");
            handler(&mut *call).inspect_err(|e| {
                tracing::debug!(component = component.name(), op = %operation, error = %e, "component aborted operation");
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentRegistry;
    use crate::core::memory_store::MemoryRecordStore;
    use std::sync::{Arc, Mutex};

    fn tracer(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Component {
        let create_log = Arc::clone(&log);
        Component::new(name)
            .on(Operation::Create, move |_| {
                create_log.lock().unwrap().push(format!("{}:create", name));
                Ok(())
            })
            .on(Operation::Delete, move |_| {
                log.lock().unwrap().push(format!("{}:delete", name));
                Ok(())
            })
    }

    #[test]
    fn runs_matching_handlers_in_order_and_stops_on_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .register(tracer("first", Arc::clone(&log)))
            .register(Component::new("read_only").on(Operation::Read, |_| Ok(())))
            .register(Component::new("failing").on(Operation::Delete, |_| {
                Err(WardenError::ConfigError("boom".to_string()))
            }))
            .register(tracer("last", Arc::clone(&log)));

        let identity = Identity::user(1);
        let mut record = Record::new(Arc::new(AgentRegistry::default()));
        let mut data = Map::new();
        let context = CallContext::default();
        let store = MemoryRecordStore::new();
        let mut call = ComponentCall {
            operation: Operation::Create,
            identity: &identity,
            record: &mut record,
            data: &mut data,
            context: &context,
            store: &store,
        };
        pipeline.run(&mut call).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first:create", "last:create"]);

        call.operation = Operation::Delete;
        assert!(pipeline.run(&mut call).is_err());
        assert_eq!(log.lock().unwrap().last().unwrap(), "first:delete");
    }

    #[test]
    fn later_registration_replaces_handler() {
        let component = Component::new("c")
            .on(Operation::Update, |_| Ok(()))
            .on(Operation::Update, |_| Err(WardenError::RecordNotFound("x".to_string())));
        assert!(component.handles(Operation::Update));
        assert!(!component.handles(Operation::Finish));
        assert!(format!("{:?}", component).contains("update"));
    }
}
