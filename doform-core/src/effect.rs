//! Effect - Side effects expressed as values
//!
//! An Effect describes one upstream operation. Nothing happens until an
//! Interpreter executes it.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Evaluate a data source
    Read { resource: Resource },
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update attributes in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed: Vec<String>,
    },
    /// Delete then re-create because a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed: Vec<String>,
    },
    /// Delete a resource known by its upstream handle
    Delete { id: ResourceId, identifier: String },
    /// Adopt an existing upstream object
    Import { id: ResourceId, import_id: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read { resource } | Effect::Create(resource) => &resource.id,
            Effect::Update { id, .. }
            | Effect::Replace { id, .. }
            | Effect::Delete { id, .. }
            | Effect::Import { id, .. } => id,
        }
    }

    /// Whether executing this Effect changes upstream state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read { .. } | Effect::Import { .. })
    }

    /// Plan symbol shown next to the resource
    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Read { .. } => "<=",
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Replace { .. } => "-/+",
            Effect::Delete { .. } => "-",
            Effect::Import { .. } => "<-",
        }
    }
}
