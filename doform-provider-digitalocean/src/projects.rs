//! Project membership reconciliation
//!
//! The API has no "remove from project" call: a resource leaves a project by
//! being assigned to the default project.

use std::collections::BTreeSet;

use doform_core::provider::ProviderResult;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::client::ApiClient;
use crate::normalize::canonical_urn;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectResource {
    pub urn: String,
    #[serde(default)]
    pub assigned_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub owner_id: i64,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Deserialize)]
struct ProjectEnvelope {
    project: Project,
}

/// Outcome of a membership update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// Members after the update, canonical URNs sorted
    Updated(Vec<String>),
    /// The project no longer exists upstream
    Gone,
}

impl ApiClient {
    pub async fn get_project(&self, id: &str) -> ProviderResult<Project> {
        let envelope: ProjectEnvelope = self.get(&format!("v2/projects/{id}")).await?;
        Ok(envelope.project)
    }

    pub async fn default_project(&self) -> ProviderResult<Project> {
        self.get_project("default").await
    }

    pub async fn project_resources(&self, project_id: &str) -> ProviderResult<Vec<ProjectResource>> {
        self.list(&format!("v2/projects/{project_id}/resources"), "resources")
            .await
    }

    pub async fn assign_resources(&self, project_id: &str, urns: &[String]) -> ProviderResult<()> {
        if urns.is_empty() {
            return Ok(());
        }
        let body = json!({ "resources": urns });
        let _: serde_json::Value = self
            .post(&format!("v2/projects/{project_id}/resources"), &body)
            .await?;
        Ok(())
    }
}

/// Make `desired` the exact member set of `project_id`.
///
/// Members that are no longer wanted move to the default project; missing ones
/// are assigned. Calling it again with the same set issues no writes.
pub async fn update_membership(
    api: &ApiClient,
    project_id: &str,
    desired: &[String],
) -> ProviderResult<Membership> {
    let Some(current) = current_members(api, project_id).await? else {
        return Ok(Membership::Gone);
    };
    let desired = canonical_set(desired);
    let to_remove: Vec<String> = current.difference(&desired).cloned().collect();
    let to_add: Vec<String> = desired.difference(&current).cloned().collect();
    apply(api, project_id, current, to_remove, to_add).await
}

/// Move `remove` out of `project_id` and assign `add` to it.
///
/// Members named in neither list stay where they are. A URN in both lists
/// stays a member.
pub async fn adjust_membership(
    api: &ApiClient,
    project_id: &str,
    remove: &[String],
    add: &[String],
) -> ProviderResult<Membership> {
    let Some(current) = current_members(api, project_id).await? else {
        return Ok(Membership::Gone);
    };
    let add = canonical_set(add);
    let to_remove: Vec<String> = canonical_set(remove)
        .into_iter()
        .filter(|u| current.contains(u) && !add.contains(u))
        .collect();
    let to_add: Vec<String> = add.difference(&current).cloned().collect();
    apply(api, project_id, current, to_remove, to_add).await
}

fn canonical_set(urns: &[String]) -> BTreeSet<String> {
    urns.iter().map(|u| canonical_urn(u)).collect()
}

/// Canonical member URNs, or `None` once the project is gone
async fn current_members(api: &ApiClient, project_id: &str) -> ProviderResult<Option<BTreeSet<String>>> {
    match api.project_resources(project_id).await {
        Ok(resources) => Ok(Some(resources.iter().map(|r| canonical_urn(&r.urn)).collect())),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn apply(
    api: &ApiClient,
    project_id: &str,
    mut members: BTreeSet<String>,
    to_remove: Vec<String>,
    to_add: Vec<String>,
) -> ProviderResult<Membership> {
    if !to_remove.is_empty() {
        let default = api.default_project().await?;
        if default.id == project_id {
            warn!(
                "{} resource(s) stay in default project {project_id}; assign them to another project to move them",
                to_remove.len()
            );
        } else {
            info!(
                "Moving {} resource(s) from project {project_id} to the default project",
                to_remove.len()
            );
            api.assign_resources(&default.id, &to_remove).await?;
            for urn in &to_remove {
                members.remove(urn);
            }
        }
    }

    if !to_add.is_empty() {
        info!("Assigning {} resource(s) to project {project_id}", to_add.len());
        match api.assign_resources(project_id, &to_add).await {
            Err(e) if e.is_not_found() => return Ok(Membership::Gone),
            other => other?,
        }
        members.extend(to_add);
    }

    Ok(Membership::Updated(members.into_iter().collect()))
}
