use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::{Map, json};

use crate::certificates::{certificate_name_for_id, resolve_certificate};
use crate::client::ApiClient;
use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::{copy_field, json_id, required_str, str_field, unwrap_object};

/// digitalocean_cdn: a CDN endpoint in front of a Spaces origin
pub struct Cdn;

const DEFAULT_TTL: i64 = 3600;

impl Cdn {
    /// Mutable fields; a custom domain needs a certificate, referenced by name
    async fn settings(api: &ApiClient, resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
        let mut body = Map::new();
        body.insert("ttl".into(), json!(resource.get_int("ttl").unwrap_or(DEFAULT_TTL)));
        let reference = resource
            .get_string("certificate_name")
            .or_else(|| resource.get_string("certificate_id"));
        if let Some(reference) = reference.filter(|r| !r.is_empty()) {
            let cert = resolve_certificate(api, reference).await?;
            body.insert("certificate_id".into(), json!(cert.id));
        }
        body.insert(
            "custom_domain".into(),
            json!(resource.get_string("custom_domain").unwrap_or_default()),
        );
        Ok(body)
    }

    async fn observe(api: &ApiClient, id: &ResourceId, endpoint: &serde_json::Value) -> ProviderResult<State> {
        let mut attributes = Attributes::new();
        for key in ["origin", "endpoint", "ttl", "created_at"] {
            copy_field(&mut attributes, endpoint, key, key);
        }
        if let Some(domain) = str_field(endpoint, "custom_domain").filter(|d| !d.is_empty()) {
            attributes.insert("custom_domain".into(), Value::from(domain));
        }
        if let Some(cert_id) = str_field(endpoint, "certificate_id").filter(|c| !c.is_empty()) {
            if let Some(name) = certificate_name_for_id(api, &cert_id).await? {
                attributes.insert("certificate_name".into(), Value::from(name));
            }
            attributes.insert("certificate_id".into(), Value::from(cert_id));
        }
        Ok(State::existing(id.clone(), attributes).with_identifier(json_id(endpoint).unwrap_or_default()))
    }
}

#[async_trait]
impl ResourceLifecycle for Cdn {
    fn name(&self) -> &'static str {
        "digitalocean_cdn"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("origin", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("ttl", types::positive_int()).with_default(DEFAULT_TTL))
            .attribute(AttributeSchema::new("certificate_name", AttributeType::String).computed())
            .attribute(AttributeSchema::new("certificate_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("custom_domain", AttributeType::String))
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Self::settings(ctx.api(), resource).await?;
        body.insert("origin".into(), json!(required_str(resource, "origin")?));
        let created: serde_json::Value = ctx.api().post("v2/cdn/endpoints", &body).await?;
        Self::observe(ctx.api(), &resource.id, &unwrap_object(created, "endpoint")?).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/cdn/endpoints/{identifier}")).await?;
        Self::observe(ctx.api(), id, &unwrap_object(body, "endpoint")?).await
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
        let body = Self::settings(ctx.api(), to).await?;
        let updated: serde_json::Value = ctx
            .api()
            .put(&format!("v2/cdn/endpoints/{identifier}"), &body)
            .await?;
        Self::observe(ctx.api(), id, &unwrap_object(updated, "endpoint")?).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/cdn/endpoints/{identifier}")).await
    }
}
