use crate::core::component::{Component, ComponentCall, Operation};

pub const USER: &str = "user";
pub const SERVICE: &str = "service";

/// Records the creating user's id on the record.
pub fn user_component() -> Component {
    Component::new(USER).on(Operation::Create, |call: &mut ComponentCall<'_>| {
        call.record.set_user_id(call.identity.id.clone());
        Ok(())
    })
}

/// Binds the record to a service: the call context's, else the payload's.
pub fn service_component() -> Component {
    Component::new(SERVICE).on(Operation::Create, |call: &mut ComponentCall<'_>| {
        let service = call.context.service.clone().or_else(|| {
            call.data
                .get("service")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        call.record.set_service(service);
        Ok(())
    })
}
