use crate::core::component::{Component, ComponentCall, Operation};

pub const SOFT_DELETE: &str = "soft_delete";
pub const FINISH_STATUS: &str = "finish_status";

/// Delete flips `is_deleted`; rows are never removed.
pub fn soft_delete_component() -> Component {
    Component::new(SOFT_DELETE).on(Operation::Delete, |call: &mut ComponentCall<'_>| {
        call.record.set_deleted(true);
        Ok(())
    })
}

pub fn finish_status_component() -> Component {
    Component::new(FINISH_STATUS)
        .on(Operation::Create, |call: &mut ComponentCall<'_>| {
            call.record.set_finished(false);
            Ok(())
        })
        .on(Operation::Finish, |call: &mut ComponentCall<'_>| {
            call.record.set_finished(true);
            Ok(())
        })
}
