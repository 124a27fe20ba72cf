//! digitalocean_project and digitalocean_project_resources
//!
//! A project owns its fields and its exact member set ([`update_membership`]).
//! A project_resources block only moves the URNs it lists
//! ([`adjust_membership`]).

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, Comparator, ResourceSchema};
use log::warn;
use serde_json::{Map, json};

use crate::client::ApiClient;
use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::{canonical_urn, urn_sets_equal};
use crate::projects::{Membership, Project as ProjectRecord, adjust_membership, update_membership};
use crate::wire::{insert_present, json_id, required_str, unwrap_object};

fn resources_attribute() -> AttributeSchema {
    AttributeSchema::new("resources", AttributeType::set_of(AttributeType::String))
        .with_comparator(Comparator::Custom(urn_sets_equal))
}

async fn member_urns(api: &ApiClient, project_id: &str) -> ProviderResult<Value> {
    let members = api.project_resources(project_id).await?;
    Ok(Value::string_set(members.into_iter().map(|m| m.urn)))
}

fn gone_as_not_found(project_id: &str, membership: Membership) -> ProviderResult<()> {
    match membership {
        Membership::Updated(_) => Ok(()),
        Membership::Gone => Err(ProviderError::not_found(format!(
            "project {project_id} no longer exists"
        ))),
    }
}

/// Reconcile membership; a vanished project reads as not found
async fn reconcile(api: &ApiClient, project_id: &str, desired: &[String]) -> ProviderResult<()> {
    gone_as_not_found(project_id, update_membership(api, project_id, desired).await?)
}

/// Move `remove` out and assign `add`, leaving other members alone
async fn adjust(api: &ApiClient, project_id: &str, remove: &[String], add: &[String]) -> ProviderResult<()> {
    gone_as_not_found(project_id, adjust_membership(api, project_id, remove, add).await?)
}

pub struct Project;

const PROJECT_FIELDS: &[&str] = &["name", "description", "purpose", "environment", "is_default"];

impl Project {
    fn observe(id: &ResourceId, project: &ProjectRecord, members: Value) -> State {
        let mut attributes = Attributes::from([
            ("name".to_string(), Value::from(project.name.as_str())),
            ("description".to_string(), Value::from(project.description.as_str())),
            ("purpose".to_string(), Value::from(project.purpose.as_str())),
            ("is_default".to_string(), Value::Bool(project.is_default)),
            ("owner_uuid".to_string(), Value::from(project.owner_uuid.as_str())),
            ("owner_id".to_string(), Value::Int(project.owner_id)),
            ("resources".to_string(), members),
        ]);
        if !project.environment.is_empty() {
            attributes.insert("environment".into(), Value::from(project.environment.as_str()));
        }
        for (key, value) in [("created_at", &project.created_at), ("updated_at", &project.updated_at)] {
            if let Some(v) = value {
                attributes.insert(key.into(), Value::from(v.as_str()));
            }
        }
        State::existing(id.clone(), attributes).with_identifier(project.id.as_str())
    }
}

#[async_trait]
impl ResourceLifecycle for Project {
    fn name(&self) -> &'static str {
        "digitalocean_project"
    }

    fn schema(&self) -> ResourceSchema {
        let environments = ["Development", "Staging", "Production"]
            .iter()
            .map(|e| e.to_string())
            .collect();
        ResourceSchema::new(self.name())
            .with_description("A project grouping resources")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("description", AttributeType::String).with_default(""))
            .attribute(AttributeSchema::new("purpose", AttributeType::String).with_default("Web Application"))
            .attribute(AttributeSchema::new("environment", AttributeType::Enum(environments)))
            .attribute(AttributeSchema::new("is_default", AttributeType::Bool).with_default(false))
            .attribute(resources_attribute().computed())
            .attribute(AttributeSchema::new("owner_uuid", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("owner_id", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("updated_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert(
            "purpose".into(),
            json!(resource.get_string("purpose").unwrap_or("Web Application")),
        );
        for key in ["description", "environment", "is_default"] {
            insert_present(&mut body, resource, key);
        }
        let created: serde_json::Value = ctx.api().post("v2/projects", &body).await?;
        let project = unwrap_object(created, "project")?;
        let project_id = json_id(&project)
            .ok_or_else(|| ProviderError::new("project create response has no ID"))?;

        let desired = resource.get_strings("resources");
        if !desired.is_empty()
            && let Err(e) = reconcile(ctx.api(), &project_id, &desired).await
        {
            warn!("Project {project_id} was created but assigning its resources failed: {e}");
        }
        self.read(ctx, &resource.id, &project_id).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let project = ctx.api().get_project(identifier).await?;
        let members = member_urns(ctx.api(), identifier).await?;
        Ok(Self::observe(id, &project, members))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State> {
        if changes.has_any(PROJECT_FIELDS) {
            let mut body = Map::new();
            for key in PROJECT_FIELDS {
                insert_present(&mut body, to, key);
            }
            let _: serde_json::Value = ctx
                .api()
                .patch(&format!("v2/projects/{identifier}"), &body)
                .await?;
        }
        if changes.has("resources") {
            reconcile(ctx.api(), identifier, &to.get_strings("resources")).await?;
        }
        self.read(ctx, id, identifier).await
    }

    /// Members move to the default project first; the API refuses to delete a non-empty project
    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        reconcile(ctx.api(), identifier, &[]).await?;
        ctx.api().delete(&format!("v2/projects/{identifier}")).await
    }
}

/// Membership of an existing project.
///
/// Only the listed URNs are managed; other members of the project are left
/// alone. The handle `<project-id>/<urn>,<urn>` carries the managed set so
/// refresh and delete know it without the configuration. A bare project ID
/// (an import) manages every current member.
pub struct ProjectResources;

impl ProjectResources {
    fn handle(project_id: &str, managed: &[String]) -> String {
        let mut urns: Vec<String> = managed.iter().map(|u| canonical_urn(u)).collect();
        urns.sort();
        urns.dedup();
        format!("{project_id}/{}", urns.join(","))
    }

    fn parse_handle(identifier: &str) -> (&str, Option<Vec<String>>) {
        match identifier.split_once('/') {
            Some((project_id, urns)) => (
                project_id,
                Some(urns.split(',').filter(|u| !u.is_empty()).map(str::to_string).collect()),
            ),
            None => (identifier, None),
        }
    }

    fn observe(id: &ResourceId, project_id: &str, managed: &[String], members: &[String]) -> State {
        let held: Vec<String> = members
            .iter()
            .filter(|m| managed.contains(m))
            .cloned()
            .collect();
        let attributes = Attributes::from([
            ("project".to_string(), Value::from(project_id)),
            ("resources".to_string(), Value::string_set(held)),
        ]);
        State::existing(id.clone(), attributes).with_identifier(Self::handle(project_id, managed))
    }
}

#[async_trait]
impl ResourceLifecycle for ProjectResources {
    fn name(&self) -> &'static str {
        "digitalocean_project_resources"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("project", AttributeType::String).required().force_new())
            .attribute(resources_attribute().required())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let project_id = required_str(resource, "project")?;
        let managed = resource.get_strings("resources");
        adjust(ctx.api(), project_id, &[], &managed).await?;
        self.read(ctx, &resource.id, &Self::handle(project_id, &managed)).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (project_id, managed) = Self::parse_handle(identifier);
        let members: Vec<String> = ctx
            .api()
            .project_resources(project_id)
            .await?
            .into_iter()
            .map(|m| canonical_urn(&m.urn))
            .collect();
        let managed = managed.unwrap_or_else(|| members.clone());
        Ok(Self::observe(id, project_id, &managed, &members))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        _changes: &ChangeSet,
    ) -> ProviderResult<State> {
        let (project_id, managed) = Self::parse_handle(identifier);
        let old = managed.unwrap_or_else(|| from.get_strings("resources"));
        let new = to.get_strings("resources");
        adjust(ctx.api(), project_id, &old, &new).await?;
        self.read(ctx, id, &Self::handle(project_id, &new)).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (project_id, managed) = Self::parse_handle(identifier);
        match managed {
            Some(managed) => adjust(ctx.api(), project_id, &managed, &[]).await,
            None => reconcile(ctx.api(), project_id, &[]).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_carries_canonical_managed_set() {
        let managed = vec!["do:floatingip:45.55.96.47".to_string(), "do:droplet:3164444".to_string()];
        let handle = ProjectResources::handle("4e1bfbc3", &managed);
        assert_eq!(handle, "4e1bfbc3/do:droplet:3164444,do:reservedip:45.55.96.47");

        let (project_id, parsed) = ProjectResources::parse_handle(&handle);
        assert_eq!(project_id, "4e1bfbc3");
        assert_eq!(
            parsed,
            Some(vec!["do:droplet:3164444".to_string(), "do:reservedip:45.55.96.47".to_string()])
        );
        assert_eq!(ProjectResources::parse_handle("4e1bfbc3"), ("4e1bfbc3", None));
        assert_eq!(ProjectResources::parse_handle("4e1bfbc3/"), ("4e1bfbc3", Some(vec![])));
    }

    #[test]
    fn unmanaged_members_are_not_reported() {
        let id = ResourceId::new("digitalocean_project_resources", "web");
        let managed = vec!["do:droplet:3164444".to_string()];
        let members = vec!["do:droplet:3164444".to_string(), "do:volume:506f78a4".to_string()];
        let state = ProjectResources::observe(&id, "4e1bfbc3", &managed, &members);
        assert_eq!(state.get_strings("resources"), vec!["do:droplet:3164444"]);
    }
}
