use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{copy_field, required_str, str_field, unwrap_object};

pub struct Domain;

#[async_trait]
impl ResourceLifecycle for Domain {
    fn name(&self) -> &'static str {
        "digitalocean_domain"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("ip_address", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("ttl", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let name = required_str(resource, "name")?;
        let mut body = Map::new();
        body.insert("name".into(), json!(name));
        if let Some(ip) = resource.get_string("ip_address") {
            body.insert("ip_address".into(), json!(ip));
        }
        let _: serde_json::Value = ctx.api().post("v2/domains", &body).await?;
        let mut state = self.read(ctx, &resource.id, name).await?;
        // The apex A record is created from ip_address but not reported on the domain
        if let Some(ip) = resource.get("ip_address") {
            state.attributes.insert("ip_address".into(), ip.clone());
        }
        Ok(state)
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/domains/{identifier}")).await?;
        let domain = unwrap_object(body, "domain")?;
        let name = str_field(&domain, "name").unwrap_or_else(|| identifier.to_string());

        let mut attributes = Attributes::new();
        copy_field(&mut attributes, &domain, "ttl", "ttl");
        attributes.insert("urn".into(), Value::from(format!("do:domain:{name}")));
        attributes.insert("name".into(), Value::from(name.clone()));
        Ok(State::existing(id.clone(), attributes).with_identifier(name))
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
            "domains cannot be updated in place (changed: {})",
            changes.changed().join(", ")
        )))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/domains/{identifier}")).await
    }
}
