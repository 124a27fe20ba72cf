//! digitalocean_tag and tag (un)assignment shared by taggable resources

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::debug;
use serde_json::json;

use crate::client::ApiClient;
use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{copy_field, required_str, unwrap_object};

pub struct Tag;

#[async_trait]
impl ResourceLifecycle for Tag {
    fn name(&self) -> &'static str {
        "digitalocean_tag"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A tag that can be applied to droplets, volumes and other resources")
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("total_resource_count", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("droplets_count", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("volumes_count", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("databases_count", AttributeType::Int).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let name = required_str(resource, "name")?;
        let body: serde_json::Value = ctx.api().post("v2/tags", &json!({ "name": name })).await?;
        let tag = unwrap_object(body, "tag")?;
        Ok(observe(&resource.id, &tag, name))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/tags/{identifier}")).await?;
        let tag = unwrap_object(body, "tag")?;
        Ok(observe(id, &tag, identifier))
    }

    async fn update(
        &self,
        _ctx: &Context,
        _id: &ResourceId,
        _identifier: &str,
        _from: &State,
        _to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State> {
        Err(ProviderError::invalid(format!(
            "tags cannot be updated in place (changed: {})",
            changes.changed().join(", ")
        )))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/tags/{identifier}")).await
    }
}

fn observe(id: &ResourceId, tag: &serde_json::Value, name: &str) -> State {
    let mut attributes = Attributes::new();
    attributes.insert("name".to_string(), Value::from(name));
    let resources = tag.get("resources").cloned().unwrap_or_default();
    copy_field(&mut attributes, &resources, "count", "total_resource_count");
    for (kind, attr) in [
        ("droplets", "droplets_count"),
        ("volumes", "volumes_count"),
        ("databases", "databases_count"),
    ] {
        let count = resources.get(kind).cloned().unwrap_or_default();
        copy_field(&mut attributes, &count, "count", attr);
    }
    State::existing(id.clone(), attributes).with_identifier(name)
}

/// Make the tags on one resource match `desired`.
///
/// Tags are created on demand; the API answers an existing tag with success.
pub async fn sync_resource_tags(
    api: &ApiClient,
    resource_id: &str,
    resource_type: &str,
    current: &[String],
    desired: &[String],
) -> ProviderResult<()> {
    let target = json!({
        "resources": [{ "resource_id": resource_id, "resource_type": resource_type }]
    });
    for tag in current.iter().filter(|t| !desired.contains(t)) {
        debug!("Untagging {resource_type} {resource_id} from {tag}");
        api.delete_with_body(&format!("v2/tags/{tag}/resources"), &target)
            .await?;
    }
    for tag in desired.iter().filter(|t| !current.contains(t)) {
        debug!("Tagging {resource_type} {resource_id} with {tag}");
        let _: serde_json::Value = api.post("v2/tags", &json!({ "name": tag })).await?;
        api.post_no_response(&format!("v2/tags/{tag}/resources"), &target)
            .await?;
    }
    Ok(())
}
