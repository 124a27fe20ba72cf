use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Resource, ResourceId, State};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::json;

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{copy_field, json_id, required_str, unwrap_object};

pub struct SshKey;

#[async_trait]
impl ResourceLifecycle for SshKey {
    fn name(&self) -> &'static str {
        "digitalocean_ssh_key"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("public_key", AttributeType::String)
                    .required()
                    .force_new()
                    .with_state_fn(|v| match v {
                        doform_core::resource::Value::String(s) => s.trim().into(),
                        other => other.clone(),
                    }),
            )
            .attribute(AttributeSchema::new("fingerprint", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let body = json!({
            "name": required_str(resource, "name")?,
            "public_key": required_str(resource, "public_key")?.trim(),
        });
        let created: serde_json::Value = ctx.api().post("v2/account/keys", &body).await?;
        Ok(observe(&resource.id, &unwrap_object(created, "ssh_key")?))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/account/keys/{identifier}")).await?;
        Ok(observe(id, &unwrap_object(body, "ssh_key")?))
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
        _changes: &ChangeSet,
    ) -> ProviderResult<State> {
        let body: serde_json::Value = ctx
            .api()
            .put(
                &format!("v2/account/keys/{identifier}"),
                &json!({ "name": required_str(to, "name")? }),
            )
            .await?;
        Ok(observe(id, &unwrap_object(body, "ssh_key")?))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/account/keys/{identifier}")).await
    }
}

fn observe(id: &ResourceId, key: &serde_json::Value) -> State {
    let mut attributes = Attributes::new();
    for field in ["name", "public_key", "fingerprint"] {
        copy_field(&mut attributes, key, field, field);
    }
    State::existing(id.clone(), attributes).with_identifier(json_id(key).unwrap_or_default())
}
