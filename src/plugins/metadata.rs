use crate::core::component::{Component, ComponentCall, Operation};
use crate::core::error::WardenError;
use serde_json::{Map, Value};

pub const NAME: &str = "metadata";

/// Copies the payload `metadata` (or `{}`) onto the record on create and update.
pub fn component() -> Component {
    Component::new(NAME)
        .on(Operation::Create, inject_metadata)
        .on(Operation::Update, inject_metadata)
}

fn inject_metadata(call: &mut ComponentCall<'_>) -> Result<(), WardenError> {
    let metadata = call
        .data
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    call.record.set_metadata(metadata);
    Ok(())
}
