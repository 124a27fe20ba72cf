use async_trait::async_trait;
use doform_core::codec::{from_wire, to_wire};
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::json;

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{json_id, required_str, unwrap_object};

pub struct Vpc;

#[async_trait]
impl ResourceLifecycle for Vpc {
    fn name(&self) -> &'static str {
        "digitalocean_vpc"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A virtual private cloud network")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(AttributeSchema::new("ip_range", types::cidr()).computed().force_new())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("default", AttributeType::Bool).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let body = to_wire(&self.schema(), &resource.attributes);
        let created: serde_json::Value = ctx.api().post("v2/vpcs", &body).await?;
        Ok(self.observe(&resource.id, &unwrap_object(created, "vpc")?))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/vpcs/{identifier}")).await?;
        Ok(self.observe(id, &unwrap_object(body, "vpc")?))
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
        let body = json!({
            "name": required_str(to, "name")?,
            "description": to.get_string("description").unwrap_or_default(),
        });
        let updated: serde_json::Value = ctx.api().patch(&format!("v2/vpcs/{identifier}"), &body).await?;
        Ok(self.observe(id, &unwrap_object(updated, "vpc")?))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/vpcs/{identifier}")).await
    }
}

impl Vpc {
    fn observe(&self, id: &ResourceId, vpc: &serde_json::Value) -> State {
        let mut attributes = from_wire(&self.schema(), vpc);
        if let Some(Value::String(region)) = attributes.get("region") {
            let region = region.to_lowercase();
            attributes.insert("region".into(), Value::from(region));
        }
        State::existing(id.clone(), attributes).with_identifier(json_id(vpc).unwrap_or_default())
    }
}
