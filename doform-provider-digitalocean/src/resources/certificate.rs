//! digitalocean_certificate
//!
//! The handle is the certificate name: Let's Encrypt renewals replace the ID.

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use doform_core::waiter::Poll;
use log::info;
use serde_json::{Map, json};

use crate::certificates::{Certificate as CertificateRecord, resolve_certificate};
use crate::lifecycle::{Context, ResourceLifecycle};
use crate::wire::required_str;

pub struct Certificate;

const PENDING: &[&str] = &["pending"];
const VERIFIED: &[&str] = &["verified"];

#[async_trait]
impl ResourceLifecycle for Certificate {
    fn name(&self) -> &'static str {
        "digitalocean_certificate"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new(
                    "type",
                    AttributeType::Enum(vec!["custom".to_string(), "lets_encrypt".to_string()]),
                )
                .with_default("custom")
                .force_new(),
            )
            .attribute(AttributeSchema::new("private_key", AttributeType::String).sensitive().force_new())
            .attribute(AttributeSchema::new("leaf_certificate", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("certificate_chain", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("domains", AttributeType::set_of(AttributeType::String)).force_new())
            .attribute(AttributeSchema::new("uuid", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("state", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("not_after", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("sha1_fingerprint", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let name = required_str(resource, "name")?;
        let cert_type = resource.get_string("type").unwrap_or("custom");

        let mut body = Map::new();
        body.insert("name".into(), json!(name));
        body.insert("type".into(), json!(cert_type));
        match cert_type {
            "lets_encrypt" => {
                let domains = resource.get_strings("domains");
                if domains.is_empty() {
                    return Err(ProviderError::invalid(
                        "'domains' is required for lets_encrypt certificates",
                    ));
                }
                body.insert("dns_names".into(), json!(domains));
            }
            _ => {
                body.insert("private_key".into(), json!(required_str(resource, "private_key")?));
                body.insert("leaf_certificate".into(), json!(required_str(resource, "leaf_certificate")?));
                if let Some(chain) = resource.get_string("certificate_chain") {
                    body.insert("certificate_chain".into(), json!(chain));
                }
            }
        }

        let _: serde_json::Value = ctx.api().post("v2/certificates", &body).await?;
        info!("Created certificate {name}; waiting for it to be verified");

        let api = ctx.api();
        let verified = ctx
            .waiter(
                format!("certificate ({name}) to be verified"),
                PENDING,
                VERIFIED,
                self.schema().timeouts.create,
            )
            .wait(|| async move {
                let cert = resolve_certificate(api, name).await?;
                let state = cert.state.clone();
                Ok(Poll::Status(cert, state))
            })
            .await?;
        Ok(observe(&resource.id, &verified, resource))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let cert = resolve_certificate(ctx.api(), identifier).await?;
        Ok(observe(id, &cert, &Resource::new(&id.resource_type, &id.name)))
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
            "certificates cannot be updated in place (changed: {})",
            changes.changed().join(", ")
        )))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let cert = resolve_certificate(ctx.api(), identifier).await?;
        ctx.api().delete(&format!("v2/certificates/{}", cert.id)).await
    }
}

fn observe(id: &ResourceId, cert: &CertificateRecord, desired: &Resource) -> State {
    let mut attributes = Attributes::new();
    attributes.insert("name".into(), Value::from(cert.name.as_str()));
    attributes.insert("uuid".into(), Value::from(cert.id.as_str()));
    attributes.insert("state".into(), Value::from(cert.state.as_str()));
    if !cert.certificate_type.is_empty() {
        attributes.insert("type".into(), Value::from(cert.certificate_type.as_str()));
    }
    if let Some(not_after) = &cert.not_after {
        attributes.insert("not_after".into(), Value::from(not_after.as_str()));
    }
    if let Some(fingerprint) = &cert.sha1_fingerprint {
        attributes.insert("sha1_fingerprint".into(), Value::from(fingerprint.as_str()));
    }
    if cert.certificate_type == "lets_encrypt" {
        attributes.insert("domains".into(), Value::string_set(cert.dns_names.clone()));
    }
    for key in ["private_key", "leaf_certificate", "certificate_chain"] {
        if let Some(v) = desired.get(key) {
            attributes.insert(key.into(), v.clone());
        }
    }
    State::existing(id.clone(), attributes).with_identifier(cert.name.as_str())
}
