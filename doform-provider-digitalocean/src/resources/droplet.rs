use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use doform_core::waiter::Poll;
use log::info;
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::resources::tag::sync_resource_tags;
use crate::wire::{
    copy_field, insert_present, json_id, nested_slug, numeric_id, required_str, string_set,
    unwrap_object,
};

pub struct Droplet;

const PENDING: &[&str] = &["new"];
const ACTIVE: &[&str] = &["active"];

#[async_trait]
impl ResourceLifecycle for Droplet {
    fn name(&self) -> &'static str {
        "digitalocean_droplet"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A virtual machine")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("size", AttributeType::String).required())
            .attribute(AttributeSchema::new("image", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("ssh_keys", AttributeType::set_of(AttributeType::String)).force_new())
            .attribute(AttributeSchema::new("backups", AttributeType::Bool).computed())
            .attribute(AttributeSchema::new("ipv6", AttributeType::Bool).computed().force_new())
            .attribute(AttributeSchema::new("monitoring", AttributeType::Bool).computed().force_new())
            .attribute(AttributeSchema::new("vpc_uuid", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("user_data", AttributeType::String).force_new().sensitive())
            .attribute(AttributeSchema::new("resize_disk", AttributeType::Bool).with_default(true))
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("ipv4_address", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("ipv4_address_private", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("ipv6_address", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("memory", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("vcpus", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("disk", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("locked", AttributeType::Bool).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        body.insert("size".into(), json!(required_str(resource, "size")?));
        body.insert("image".into(), json!(required_str(resource, "image")?));
        body.insert("ssh_keys".into(), json!(resource.get_strings("ssh_keys")));
        body.insert("tags".into(), json!(resource.get_strings("tags")));
        for key in ["backups", "ipv6", "monitoring", "vpc_uuid", "user_data"] {
            insert_present(&mut body, resource, key);
        }

        let created: serde_json::Value = ctx.api().post("v2/droplets", &body).await?;
        let droplet = unwrap_object(created, "droplet")?;
        let id = json_id(&droplet)
            .ok_or_else(|| ProviderError::new("droplet create response has no ID"))?;
        info!("Created droplet {id}; waiting for it to become active");

        let timeout = self.schema().timeouts.create;
        let path = format!("v2/droplets/{id}");
        let (api, path) = (ctx.api(), path.as_str());
        let active = ctx
            .waiter(format!("droplet ({id}) to become active"), PENDING, ACTIVE, timeout)
            .wait(|| async move {
                let body: serde_json::Value = api.get(&path).await?;
                let droplet = unwrap_object(body, "droplet")?;
                let status = droplet["status"].as_str().unwrap_or_default().to_string();
                Ok(Poll::Status(droplet, status))
            })
            .await
            .map_err(|e| e.with_identifier(id.clone()))?;

        Ok(observe(&resource.id, &active, resource))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/droplets/{identifier}")).await?;
        let droplet = unwrap_object(body, "droplet")?;
        Ok(observe(id, &droplet, &Resource::new(&id.resource_type, &id.name)))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State> {
        numeric_id(identifier)?;
        let timeout = self.schema().timeouts.update;
        let actions = format!("v2/droplets/{identifier}/actions");

        if changes.has("name") {
            let action = ctx
                .api()
                .post_action(&actions, &json!({ "type": "rename", "name": required_str(to, "name")? }))
                .await?;
            ctx.wait_for_action(&action, timeout).await?;
        }

        if changes.has("size") {
            // Resizing requires the droplet to be powered off
            if from.get_string("status") == Some("active") {
                let action = ctx.api().post_action(&actions, &json!({ "type": "power_off" })).await?;
                ctx.wait_for_action(&action, timeout).await?;
            }
            let action = ctx
                .api()
                .post_action(
                    &actions,
                    &json!({
                        "type": "resize",
                        "size": required_str(to, "size")?,
                        "disk": to.get_bool_or("resize_disk", true),
                    }),
                )
                .await?;
            ctx.wait_for_action(&action, timeout).await?;
            let action = ctx.api().post_action(&actions, &json!({ "type": "power_on" })).await?;
            ctx.wait_for_action(&action, timeout).await?;
        }

        if changes.has("backups") {
            let kind = if to.get_bool_or("backups", false) {
                "enable_backups"
            } else {
                "disable_backups"
            };
            let action = ctx.api().post_action(&actions, &json!({ "type": kind })).await?;
            ctx.wait_for_action(&action, timeout).await?;
        }

        if changes.has("tags") {
            let current = from.get("tags").map(Value::string_elements).unwrap_or_default();
            sync_resource_tags(ctx.api(), identifier, "droplet", &current, &to.get_strings("tags"))
                .await?;
        }

        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/droplets/{identifier}")).await
    }
}

/// Observed state of a droplet; inputs the API never echoes come from `desired`
fn observe(id: &ResourceId, droplet: &serde_json::Value, desired: &Resource) -> State {
    let mut attributes = Attributes::new();
    for key in ["name", "status", "memory", "vcpus", "disk", "locked", "created_at", "vpc_uuid"] {
        copy_field(&mut attributes, droplet, key, key);
    }
    if let Some(region) = nested_slug(droplet, "region") {
        attributes.insert("region".into(), Value::from(region));
    }
    let size = droplet
        .get("size_slug")
        .and_then(|s| s.as_str())
        .map(str::to_string)
        .or_else(|| nested_slug(droplet, "size"));
    if let Some(size) = size {
        attributes.insert("size".into(), Value::from(size));
    }
    if let Some(image) = nested_slug(droplet, "image").or_else(|| json_id(&droplet["image"])) {
        attributes.insert("image".into(), Value::from(image));
    }
    attributes.insert("tags".into(), string_set(droplet, "tags"));

    let features = string_set(droplet, "features").string_elements();
    attributes.insert("backups".into(), Value::Bool(features.iter().any(|f| f == "backups")));
    attributes.insert("ipv6".into(), Value::Bool(features.iter().any(|f| f == "ipv6")));
    attributes.insert("monitoring".into(), Value::Bool(features.iter().any(|f| f == "monitoring")));

    for (network, kind, attr) in [
        ("v4", "public", "ipv4_address"),
        ("v4", "private", "ipv4_address_private"),
        ("v6", "public", "ipv6_address"),
    ] {
        let address = droplet["networks"][network]
            .as_array()
            .and_then(|nets| nets.iter().find(|n| n["type"] == kind))
            .and_then(|n| n["ip_address"].as_str());
        if let Some(address) = address {
            attributes.insert(attr.into(), Value::from(address));
        }
    }

    let handle = json_id(droplet).unwrap_or_default();
    attributes.insert("urn".into(), Value::from(format!("do:droplet:{handle}")));
    for key in ["ssh_keys", "user_data", "resize_disk"] {
        if let Some(v) = desired.get(key) {
            attributes.insert(key.into(), v.clone());
        }
    }
    State::existing(id.clone(), attributes).with_identifier(handle)
}
