//! `access` component: initial ownership on create, admin edits afterwards.
//!
//! On create the request project becomes the owner and the calling user a
//! contributor. Admin edits add (idempotent) or remove (`NotFound` when the
//! agent is absent) on the list selected by the edit's role.

use crate::core::access::AccessRole;
use crate::core::agent::Agent;
use crate::core::component::{AccessOperation, Component, ComponentCall, Operation};
use crate::core::error::{AgentError, WardenError};

pub const NAME: &str = "access";

pub fn component() -> Component {
    Component::new(NAME)
        .on(Operation::Create, assign_creators)
        .on(Operation::EditAccess, edit_access)
        .on(Operation::ListAgents, report_decode_errors)
}

fn assign_creators(call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
    let registry = call.record.registry().clone();
    let project = match &call.context.project_id {
        Some(project_id) => Some(registry.agent("project", project_id.clone())?),
        None => None,
    };
    // System processes create records without a user contributor.
    let user = if call.identity.is_authenticated() {
        Some(Agent::from_principal(&registry, call.identity)?)
    } else {
        None
    };

    let access = call.record.access_mut();
    if let Some(project) = project {
        access.list_mut(AccessRole::Owner).add(project);
    }
    if let Some(user) = user {
        access.list_mut(AccessRole::Contributor).add(user);
    }
    Ok(())
}

fn edit_access(call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
    let Some(edit) = call.context.access_edit.clone() else {
        return Ok(());
    };
    let list = call.record.access_mut().list_mut(edit.role);
    match edit.operation {
        AccessOperation::Add => list.add(edit.agent.clone()),
        AccessOperation::Remove => {
            list.remove(&edit.agent)?;
        }
    }
    tracing::debug!(
        record = call.record.id(),
        op = edit.operation.as_str(),
        role = edit.role.as_str(),
        agent = %edit.agent,
        "access list edited"
    );
    Ok(())
}

fn report_decode_errors(call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
    let errors: Vec<AgentError> = call.record.access().errors().to_vec();
    for e in &errors {
        tracing::warn!(record = call.record.id(), error = %e, "skipped malformed access entry");
    }
    Ok(())
}
