use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{copy_field, required_str, str_field, unwrap_object};

/// digitalocean_container_registry; an account holds at most one registry
pub struct ContainerRegistry;

const TIERS: &[&str] = &["starter", "basic", "professional"];

#[async_trait]
impl ResourceLifecycle for ContainerRegistry {
    fn name(&self) -> &'static str {
        "digitalocean_container_registry"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new(
                    "subscription_tier_slug",
                    AttributeType::Enum(TIERS.iter().map(|t| t.to_string()).collect()),
                )
                .required(),
            )
            .attribute(
                AttributeSchema::new("region", types::region())
                    .computed()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("server_url", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("storage_usage_bytes", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert(
            "subscription_tier_slug".into(),
            json!(required_str(resource, "subscription_tier_slug")?),
        );
        if let Some(region) = resource.get_string("region") {
            body.insert("region".into(), json!(region.to_lowercase()));
        }
        let _: serde_json::Value = ctx.api().post("v2/registry", &body).await?;
        let name = required_str(resource, "name")?;
        self.read(ctx, &resource.id, name).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get("v2/registry").await?;
        let registry = unwrap_object(body, "registry")?;
        let name = str_field(&registry, "name").unwrap_or_default();
        if name != identifier {
            return Err(ProviderError::not_found(format!(
                "the account's registry is '{name}', not '{identifier}'"
            )));
        }

        let subscription: serde_json::Value = ctx.api().get("v2/registry/subscription").await?;
        let mut attributes = Attributes::new();
        for key in ["name", "region", "storage_usage_bytes", "created_at"] {
            copy_field(&mut attributes, &registry, key, key);
        }
        copy_field(&mut attributes, &subscription["subscription"]["tier"], "slug", "subscription_tier_slug");
        attributes.insert("endpoint".into(), Value::from(format!("registry.digitalocean.com/{name}")));
        attributes.insert("server_url".into(), Value::from("registry.digitalocean.com"));
        Ok(State::existing(id.clone(), attributes).with_identifier(name))
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
        let body = json!({ "tier_slug": required_str(to, "subscription_tier_slug")? });
        let _: serde_json::Value = ctx.api().post("v2/registry/subscription", &body).await?;
        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, _identifier: &str) -> ProviderResult<()> {
        ctx.api().delete("v2/registry").await
    }
}
