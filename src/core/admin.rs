//! Administrative access edits on existing records.
//!
//! All three operations are authorized under [`Action::ManageAccess`] against
//! the loaded record. Edits go through the component pipeline as
//! [`Operation::EditAccess`] and are committed like any update.

use crate::core::access::AccessRole;
use crate::core::agent::Agent;
use crate::core::component::{AccessEdit, AccessOperation, CallContext, Operation};
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::policy::Action;
use crate::core::results::ItemResult;
use crate::core::service::RecordService;
use serde_json::{Map, Value};

impl RecordService {
    /// Add `agent` to the `role` list. Adding a present agent is a no-op that still commits.
    pub fn admin_add_agent(
        &self,
        identity: &Identity,
        id: &str,
        role: AccessRole,
        agent: Agent,
    ) -> Result<ItemResult, WardenError> {
        self.edit_record_access(identity, id, AccessOperation::Add, role, agent)
    }

    /// Remove `agent` from the `role` list; `NotFound` when it is not there.
    pub fn admin_remove_agent(
        &self,
        identity: &Identity,
        id: &str,
        role: AccessRole,
        agent: Agent,
    ) -> Result<ItemResult, WardenError> {
        self.edit_record_access(identity, id, AccessOperation::Remove, role, agent)
    }

    /// Dumped access object: `{owned_by: [..], contributed_by: [..]}`.
    pub fn admin_list_agents(&self, identity: &Identity, id: &str) -> Result<Value, WardenError> {
        let mut record = self.load(id, false)?;
        self.require_permission(identity, Action::ManageAccess, Some(&record))?;
        self.run_components(
            Operation::ListAgents,
            identity,
            &mut record,
            &mut Map::new(),
            &CallContext::default(),
        )?;
        Ok(record.access().dump())
    }

    fn edit_record_access(
        &self,
        identity: &Identity,
        id: &str,
        operation: AccessOperation,
        role: AccessRole,
        agent: Agent,
    ) -> Result<ItemResult, WardenError> {
        let mut record = self.load(id, false)?;
        self.require_permission(identity, Action::ManageAccess, Some(&record))?;

        let context = CallContext {
            access_edit: Some(AccessEdit {
                operation,
                role,
                agent: agent.clone(),
            }),
            ..CallContext::default()
        };
        self.run_components(
            Operation::EditAccess,
            identity,
            &mut record,
            &mut Map::new(),
            &context,
        )?;
        self.commit(&mut record)?;
        tracing::info!(
            record = record.id(),
            op = operation.as_str(),
            role = role.as_str(),
            agent = %agent,
            identity = %identity,
            "record access changed"
        );
        Ok(self.result_item(record, identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::OWNED_BY;
    use crate::core::error::AgentError;
    use crate::core::memory_store::MemoryRecordStore;
    use serde_json::json;

    fn seeded() -> (RecordService, String) {
        let service = RecordService::new(Box::new(MemoryRecordStore::new()));
        let created = service
            .create(
                &Identity::user(1),
                &json!({"metadata": {}}),
                &CallContext::default().with_project("p1"),
            )
            .unwrap();
        let id = created.id().to_string();
        (service, id)
    }

    #[test]
    fn admin_can_add_and_remove_owners() {
        let (service, id) = seeded();
        let admin = Identity::user(99).with_role("admin");
        let agent = service.agents().agent("user", 5).unwrap();

        service
            .admin_add_agent(&admin, &id, AccessRole::Owner, agent.clone())
            .unwrap();
        let listed = service.admin_list_agents(&admin, &id).unwrap();
        assert_eq!(listed[OWNED_BY], json!([{"project": "p1"}, {"user": 5}]));

        service
            .admin_remove_agent(&admin, &id, AccessRole::Owner, agent.clone())
            .unwrap();
        let err = service
            .admin_remove_agent(&admin, &id, AccessRole::Owner, agent)
            .unwrap_err();
        assert!(matches!(err, WardenError::AgentError(AgentError::NotFound(_))));
    }

    #[test]
    fn non_admin_is_denied() {
        let (service, id) = seeded();
        let err = service.admin_list_agents(&Identity::user(1), &id).unwrap_err();
        assert!(matches!(err, WardenError::PermissionDenied { .. }));
    }
}
