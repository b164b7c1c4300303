//! `pid` component: caller-chosen, human-readable record identifiers.

use crate::core::component::{Component, ComponentCall, Operation};
use crate::core::error::WardenError;
use crate::core::validation::{PID_MESSAGE, PID_PATTERN};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const NAME: &str = "pid";

static PID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PID_PATTERN).expect("static regex"));

pub fn component() -> Component {
    Component::new(NAME).on(Operation::Create, assign_pid)
}

/// Lower-case the payload `id`, validate it and reserve it as the record pid.
///
/// Records created without an `id` are only addressable by their generated id.
fn assign_pid(call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
    let Some(raw) = call.data.get("id").and_then(Value::as_str) else {
        return Ok(());
    };
    let pid = raw.to_lowercase();
    validate(&pid)?;
    if call.store.pid_exists(&pid)? {
        return Err(WardenError::DuplicateIdentifier {
            field: "id".to_string(),
            value: pid,
        });
    }
    call.data.insert("id".to_string(), Value::String(pid.clone()));
    call.record.set_pid(&pid);
    Ok(())
}

pub fn validate(pid: &str) -> Result<(), WardenError> {
    if PID_RE.is_match(pid) {
        Ok(())
    } else {
        Err(WardenError::field("id", PID_MESSAGE))
    }
}
