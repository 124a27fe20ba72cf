//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired attributes declared by the user with the state observed
//! upstream, using each attribute's comparator, and generates the Effects
//! required to converge (Plan).

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Attributes, Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Attributes whose desired value differs from the observed one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changed: Vec<String>,
    replace: Vec<String>,
}

impl ChangeSet {
    /// Compare observed attributes with desired ones through the schema's comparators.
    ///
    /// Keys starting with `_`, computed-only attributes and attributes the user
    /// left unset are never reported.
    pub fn between(schema: &ResourceSchema, observed: &Attributes, desired: &Attributes) -> Self {
        let desired = schema.normalize(desired);
        let mut changes = ChangeSet::default();

        for (key, desired_value) in &desired {
            if key.starts_with('_') {
                continue;
            }
            let attr = schema.get(key);
            if attr.is_some_and(|a| a.computed_only) {
                continue;
            }

            let equal = match (attr, observed.get(key)) {
                (Some(attr), Some(observed_value)) => {
                    attr.comparator
                        .equal(desired_value, &attr.normalize(observed_value), &desired)
                }
                (None, Some(observed_value)) => desired_value == observed_value,
                // Unset upstream equals an empty desired value
                (_, None) => desired_value.is_empty(),
            };
            if equal {
                continue;
            }

            if attr.is_some_and(|a| a.force_new) {
                changes.replace.push(key.clone());
            }
            changes.changed.push(key.clone());
        }

        changes.changed.sort();
        changes.replace.sort();
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn has(&self, name: &str) -> bool {
        self.changed.iter().any(|c| c == name)
    }

    /// Whether any of `names` changed
    pub fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has(n))
    }

    pub fn changed(&self) -> &[String] {
        &self.changed
    }

    pub fn requires_replace(&self) -> bool {
        !self.replace.is_empty()
    }

    pub fn replace_reasons(&self) -> &[String] {
        &self.replace
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(schema: Option<&ResourceSchema>, desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changes = match schema {
        Some(schema) => ChangeSet::between(schema, &current.attributes, &desired.attributes),
        None => ChangeSet::between(
            &ResourceSchema::new(desired.id.resource_type.clone()),
            &current.attributes,
            &desired.attributes,
        ),
    };

    if changes.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else if changes.requires_replace() {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changes.changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changes.changed,
        }
    }
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Data sources always produce a Read. States present in `current_states` but
/// absent from `desired` are deleted when they still hold an upstream handle.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read {
                resource: resource.clone(),
            });
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(schemas.get(&resource.id.resource_type), resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed: changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed: changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
    for state in orphans {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}

/// Value of `key` in the desired config, falling back to the observed state
pub fn effective<'a>(key: &str, desired: &'a Attributes, observed: &'a Attributes) -> Option<&'a Value> {
    desired.get(key).or_else(|| observed.get(key))
}
