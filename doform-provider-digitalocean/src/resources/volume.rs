//! Block storage: digitalocean_volume and digitalocean_volume_attachment

use std::time::Duration;

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::{info, warn};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::resources::tag::sync_resource_tags;
use crate::wire::{
    ALREADY_DETACHED, already_in_state, copy_field, int_set, json_id, nested_slug, required_int, required_str,
    string_set, unique_suffix, unwrap_object,
};

pub struct Volume;

async fn fetch_volume(ctx: &Context, volume_id: &str) -> ProviderResult<serde_json::Value> {
    let body: serde_json::Value = ctx.api().get(&format!("v2/volumes/{volume_id}")).await?;
    unwrap_object(body, "volume")
}

/// Attach or detach; `detach` of a volume that is not attached is a no-op
async fn volume_action(
    ctx: &Context,
    action_type: &str,
    volume_id: &str,
    droplet_id: i64,
    timeout: Duration,
) -> ProviderResult<()> {
    info!("Volume {volume_id}: {action_type} droplet {droplet_id}");
    let result = ctx
        .api()
        .post_action(
            &format!("v2/volumes/{volume_id}/actions"),
            &json!({ "type": action_type, "droplet_id": droplet_id }),
        )
        .await;
    let action = match result {
        Ok(action) => action,
        Err(e) if action_type == "detach" && already_in_state(&e, ALREADY_DETACHED) => {
            warn!("Volume {volume_id} is already detached from droplet {droplet_id}");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    ctx.wait_for_action(&action, timeout).await?;
    Ok(())
}

fn observe(id: &ResourceId, volume: &serde_json::Value, desired: &Resource) -> State {
    let mut attributes = Attributes::new();
    for key in ["name", "description", "filesystem_type", "filesystem_label", "created_at"] {
        copy_field(&mut attributes, volume, key, key);
    }
    copy_field(&mut attributes, volume, "size_gigabytes", "size");
    if let Some(region) = nested_slug(volume, "region") {
        attributes.insert("region".into(), Value::from(region));
    }
    attributes.insert("droplet_ids".into(), int_set(volume, "droplet_ids"));
    attributes.insert("tags".into(), string_set(volume, "tags"));
    let handle = json_id(volume).unwrap_or_default();
    attributes.insert("urn".into(), Value::from(format!("do:volume:{handle}")));
    for key in ["snapshot_id", "initial_filesystem_type", "initial_filesystem_label"] {
        if let Some(v) = desired.get(key) {
            attributes.insert(key.into(), v.clone());
        }
    }
    State::existing(id.clone(), attributes).with_identifier(handle)
}

#[async_trait]
impl ResourceLifecycle for Volume {
    fn name(&self) -> &'static str {
        "digitalocean_volume"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A block storage volume")
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("size", types::positive_int()).required())
            .attribute(AttributeSchema::new("description", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("snapshot_id", AttributeType::String).force_new())
            .attribute(
                AttributeSchema::new(
                    "initial_filesystem_type",
                    AttributeType::Enum(vec!["ext4".to_string(), "xfs".to_string()]),
                )
                .force_new(),
            )
            .attribute(AttributeSchema::new("initial_filesystem_label", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(AttributeSchema::new("filesystem_type", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("filesystem_label", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("droplet_ids", AttributeType::set_of(AttributeType::Int)).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        body.insert("size_gigabytes".into(), json!(required_int(resource, "size")?));
        body.insert("tags".into(), json!(resource.get_strings("tags")));
        for (attr, wire) in [
            ("description", "description"),
            ("snapshot_id", "snapshot_id"),
            ("initial_filesystem_type", "filesystem_type"),
            ("initial_filesystem_label", "filesystem_label"),
        ] {
            if let Some(v) = resource.get_string(attr) {
                body.insert(wire.into(), json!(v));
            }
        }
        let created: serde_json::Value = ctx.api().post("v2/volumes", &body).await?;
        Ok(observe(&resource.id, &unwrap_object(created, "volume")?, resource))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let volume = fetch_volume(ctx, identifier).await?;
        Ok(observe(id, &volume, &Resource::new(&id.resource_type, &id.name)))
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
        if changes.has("size") {
            let current = from.get_int("size").unwrap_or(0);
            let desired = required_int(to, "size")?;
            if desired < current {
                return Err(ProviderError::invalid(format!(
                    "volumes cannot shrink (from {current} GiB to {desired} GiB)"
                )));
            }
            let action = ctx
                .api()
                .post_action(
                    &format!("v2/volumes/{identifier}/actions"),
                    &json!({
                        "type": "resize",
                        "size_gigabytes": desired,
                        "region": required_str(to, "region")?.to_lowercase(),
                    }),
                )
                .await?;
            ctx.wait_for_action(&action, self.schema().timeouts.update).await?;
        }
        if changes.has("tags") {
            let current = from.get("tags").map(Value::string_elements).unwrap_or_default();
            sync_resource_tags(ctx.api(), identifier, "volume", &current, &to.get_strings("tags"))
                .await?;
        }
        let mut state = self.read(ctx, id, identifier).await?;
        for key in ["snapshot_id", "initial_filesystem_type", "initial_filesystem_label"] {
            if let Some(v) = to.get(key) {
                state.attributes.insert(key.into(), v.clone());
            }
        }
        Ok(state)
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let volume = fetch_volume(ctx, identifier).await?;
        let timeout = self.schema().timeouts.delete;
        for droplet_id in int_set(&volume, "droplet_ids").int_elements() {
            volume_action(ctx, "detach", identifier, droplet_id, timeout).await?;
        }
        ctx.api().delete(&format!("v2/volumes/{identifier}")).await
    }
}

/// Attachment of a volume to a droplet, handled as `<droplet>-<volume>-<suffix>`
pub struct VolumeAttachment;

fn attachment_handle(droplet_id: i64, volume_id: &str) -> String {
    format!("{droplet_id}-{volume_id}-{}", unique_suffix())
}

/// Split `<droplet>-<volume uuid>-<suffix>`; the volume UUID contains dashes itself
fn parse_attachment(identifier: &str) -> ProviderResult<(i64, &str)> {
    let invalid = || {
        ProviderError::invalid(format!(
            "invalid ID '{identifier}': expected \"<droplet>-<volume>-<suffix>\""
        ))
    };
    let (droplet, rest) = identifier.split_once('-').ok_or_else(invalid)?;
    let (volume, _suffix) = rest.rsplit_once('-').ok_or_else(invalid)?;
    if volume.is_empty() {
        return Err(invalid());
    }
    Ok((droplet.parse().map_err(|_| invalid())?, volume))
}

#[async_trait]
impl ResourceLifecycle for VolumeAttachment {
    fn name(&self) -> &'static str {
        "digitalocean_volume_attachment"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("droplet_id", AttributeType::Int).required().force_new())
            .attribute(AttributeSchema::new("volume_id", AttributeType::String).required().force_new())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let droplet_id = required_int(resource, "droplet_id")?;
        let volume_id = required_str(resource, "volume_id")?;
        volume_action(ctx, "attach", volume_id, droplet_id, self.schema().timeouts.create).await?;
        self.read(ctx, &resource.id, &attachment_handle(droplet_id, volume_id)).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (droplet_id, volume_id) = parse_attachment(identifier)?;
        let volume = fetch_volume(ctx, volume_id).await?;
        if !int_set(&volume, "droplet_ids").int_elements().contains(&droplet_id) {
            return Err(ProviderError::not_found(format!(
                "volume {volume_id} is not attached to droplet {droplet_id}"
            )));
        }
        let attributes = Attributes::from([
            ("droplet_id".to_string(), Value::Int(droplet_id)),
            ("volume_id".to_string(), Value::from(volume_id)),
        ]);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        _ctx: &Context,
        _id: &ResourceId,
        _identifier: &str,
        _from: &State,
        _to: &Resource,
        _changes: &ChangeSet,
    ) -> ProviderResult<State> {
        Err(ProviderError::invalid("volume attachments are replaced, never updated"))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (droplet_id, volume_id) = parse_attachment(identifier)?;
        volume_action(ctx, "detach", volume_id, droplet_id, self.schema().timeouts.delete).await
    }
}

/// digitalocean_volume_snapshot
pub struct VolumeSnapshot;

#[async_trait]
impl ResourceLifecycle for VolumeSnapshot {
    fn name(&self) -> &'static str {
        "digitalocean_volume_snapshot"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("volume_id", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)).force_new())
            .attribute(AttributeSchema::new("regions", AttributeType::set_of(AttributeType::String)).computed_only())
            .attribute(AttributeSchema::new("size", AttributeType::Float).computed_only())
            .attribute(AttributeSchema::new("min_disk_size", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let volume_id = required_str(resource, "volume_id")?;
        let body = json!({
            "name": required_str(resource, "name")?,
            "tags": resource.get_strings("tags"),
        });
        let created: serde_json::Value = ctx
            .api()
            .post(&format!("v2/volumes/{volume_id}/snapshots"), &body)
            .await?;
        Ok(observe_snapshot(&resource.id, &unwrap_object(created, "snapshot")?))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/snapshots/{identifier}")).await?;
        Ok(observe_snapshot(id, &unwrap_object(body, "snapshot")?))
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
            "volume snapshots cannot be updated in place (changed: {})",
            changes.changed().join(", ")
        )))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/snapshots/{identifier}")).await
    }
}

fn observe_snapshot(id: &ResourceId, snapshot: &serde_json::Value) -> State {
    let mut attributes = Attributes::new();
    for key in ["name", "min_disk_size", "created_at"] {
        copy_field(&mut attributes, snapshot, key, key);
    }
    if let Some(size) = snapshot["size_gigabytes"].as_f64() {
        attributes.insert("size".into(), Value::Float(size));
    }
    copy_field(&mut attributes, snapshot, "resource_id", "volume_id");
    attributes.insert("regions".into(), string_set(snapshot, "regions"));
    attributes.insert("tags".into(), string_set(snapshot, "tags"));
    State::existing(id.clone(), attributes).with_identifier(json_id(snapshot).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_handle_keeps_volume_uuid() {
        let volume = "506f78a4-e098-11e5-ad9f-000f53306ae1";
        let h = attachment_handle(3164494, volume);
        assert_eq!(parse_attachment(&h).unwrap(), (3164494, volume));
        assert!(parse_attachment("3164494").is_err());
        assert!(parse_attachment("web-506f78a4-abcd1234").is_err());
    }

    #[test]
    fn observed_volume_reports_size_and_attachments() {
        let upstream = json!({
            "id": "506f78a4-e098-11e5-ad9f-000f53306ae1",
            "region": { "slug": "nyc1" },
            "droplet_ids": [3164494],
            "name": "example",
            "description": "Block store for examples",
            "size_gigabytes": 10,
            "filesystem_type": "ext4",
            "filesystem_label": "",
            "tags": ["aninterestingtag"],
            "created_at": "2016-03-02T17:00:49Z"
        });
        let desired = Resource::new("digitalocean_volume", "example")
            .with_attribute("initial_filesystem_type", "ext4");
        let state = observe(&desired.id, &upstream, &desired);
        assert_eq!(state.get_int("size"), Some(10));
        assert_eq!(state.get("droplet_ids"), Some(&Value::int_set([3164494])));
        assert_eq!(state.get_string("initial_filesystem_type"), Some("ext4"));
        assert_eq!(state.get_string("urn"), Some("do:volume:506f78a4-e098-11e5-ad9f-000f53306ae1"));
    }
}
