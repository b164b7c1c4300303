//! Service components and their registration table.
//!
//! Adding a new component: append one entry to `COMPONENTS`.

pub mod access;
pub mod metadata;
pub mod pid;
pub mod relationship;
pub mod status;

use crate::core::component::{Component, Pipeline};
use crate::core::error::WardenError;

pub(crate) struct ComponentInit {
    pub name: &'static str,
    pub build: fn() -> Component,
}

/// Every component that configuration may name.
pub(crate) const COMPONENTS: &[ComponentInit] = &[
    ComponentInit { name: metadata::NAME, build: metadata::component },
    ComponentInit { name: pid::NAME, build: pid::component },
    ComponentInit { name: relationship::USER, build: relationship::user_component },
    ComponentInit { name: relationship::SERVICE, build: relationship::service_component },
    ComponentInit { name: access::NAME, build: access::component },
    ComponentInit { name: status::SOFT_DELETE, build: status::soft_delete_component },
    ComponentInit { name: status::FINISH_STATUS, build: status::finish_status_component },
];

pub fn available() -> impl Iterator<Item = &'static str> {
    COMPONENTS.iter().map(|c| c.name)
}

/// Build a pipeline from component names, keeping their order.
pub fn build_pipeline<S: AsRef<str>>(names: &[S]) -> Result<Pipeline, WardenError> {
    let mut pipeline = Pipeline::new();
    for name in names {
        let name = name.as_ref();
        let init = COMPONENTS.iter().find(|c| c.name == name).ok_or_else(|| {
            WardenError::ConfigError(format!(
                "unknown component '{}' (available: {})",
                name,
                available().collect::<Vec<_>>().join(", ")
            ))
        })?;
        pipeline.register((init.build)());
    }
    Ok(pipeline)
}

/// All components, in table order.
pub fn default_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new();
    for init in COMPONENTS {
        pipeline.register((init.build)());
    }
    pipeline
}
