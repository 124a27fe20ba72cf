//! digitalocean_loadbalancer
//!
//! Forwarding rules form a set keyed by [`hash_forwarding_rule`]. Rules name
//! their certificate by name or ID; either is resolved to the current ID on
//! every write, and the name is read back from the ID on every read.

use async_trait::async_trait;
use doform_core::codec::{from_wire_block, value_to_json};
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value, ValueSet};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema, Comparator, ResourceSchema, types};
use doform_core::waiter::Poll;
use log::{debug, info};
use serde_json::{Map, json};

use crate::certificates::{certificate_name_for_id, resolve_certificate};
use crate::client::ApiClient;
use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::{block_settings_equal, forwarding_rules_equal, hash_forwarding_rule};
use crate::wire::{copy_field, insert_present, int_set, json_id, nested_slug, required_str, unwrap_object};

pub struct LoadBalancer;

const PENDING: &[&str] = &["new"];
const ACTIVE: &[&str] = &["active"];

fn protocol() -> AttributeType {
    AttributeType::Enum(
        ["http", "https", "http2", "http3", "tcp", "udp"]
            .iter()
            .map(|p| p.to_string())
            .collect(),
    )
}

fn forwarding_rule_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("entry_protocol", protocol()).required())
        .attribute(AttributeSchema::new("entry_port", types::port()).required())
        .attribute(AttributeSchema::new("target_protocol", protocol()).required())
        .attribute(AttributeSchema::new("target_port", types::port()).required())
        .attribute(AttributeSchema::new("certificate_name", AttributeType::String).computed())
        .attribute(AttributeSchema::new("certificate_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("tls_passthrough", AttributeType::Bool).with_default(false))
}

fn healthcheck_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("protocol", AttributeType::String).required())
        .attribute(AttributeSchema::new("port", types::port()).required())
        .attribute(AttributeSchema::new("path", AttributeType::String))
        .attribute(AttributeSchema::new("check_interval_seconds", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("response_timeout_seconds", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("unhealthy_threshold", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("healthy_threshold", AttributeType::Int).computed())
}

fn sticky_sessions_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("type", AttributeType::String).with_default("none"))
        .attribute(AttributeSchema::new("cookie_name", AttributeType::String))
        .attribute(AttributeSchema::new("cookie_ttl_seconds", AttributeType::Int))
}

/// Fields sent as-is when the user set them
const PASSTHROUGH: &[&str] = &[
    "size",
    "size_unit",
    "algorithm",
    "droplet_tag",
    "redirect_http_to_https",
    "enable_proxy_protocol",
    "enable_backend_keepalive",
    "http_idle_timeout_seconds",
    "disable_lets_encrypt_dns_records",
    "vpc_uuid",
    "project_id",
];

impl LoadBalancer {
    async fn body(api: &ApiClient, resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        for key in PASSTHROUGH {
            insert_present(&mut body, resource, key);
        }
        if let Some(ids) = resource.get("droplet_ids") {
            body.insert("droplet_ids".into(), json!(ids.int_elements()));
        }
        for key in ["healthcheck", "sticky_sessions"] {
            insert_present(&mut body, resource, key);
        }

        let mut rules = Vec::new();
        for rule in resource
            .get("forwarding_rule")
            .and_then(Value::elements)
            .unwrap_or_default()
        {
            rules.push(forwarding_rule_body(api, rule).await?);
        }
        if rules.is_empty() {
            return Err(ProviderError::invalid(
                "at least one forwarding_rule is required",
            ));
        }
        body.insert("forwarding_rules".into(), json!(rules));
        Ok(body)
    }

    async fn observe(&self, api: &ApiClient, id: &ResourceId, lb: &serde_json::Value) -> ProviderResult<State> {
        let mut attributes = Attributes::new();
        for key in [
            "name",
            "ip",
            "status",
            "size",
            "size_unit",
            "algorithm",
            "droplet_tag",
            "redirect_http_to_https",
            "enable_proxy_protocol",
            "enable_backend_keepalive",
            "http_idle_timeout_seconds",
            "disable_lets_encrypt_dns_records",
            "vpc_uuid",
            "project_id",
        ] {
            copy_field(&mut attributes, lb, key, key);
        }
        if let Some(region) = nested_slug(lb, "region") {
            attributes.insert("region".into(), Value::from(region));
        }
        attributes.insert("droplet_ids".into(), int_set(lb, "droplet_ids"));
        if lb["healthcheck"].is_object() {
            let check = from_wire_block(&healthcheck_block(), &lb["healthcheck"]);
            attributes.insert("healthcheck".into(), Value::Map(check));
        }
        if lb["sticky_sessions"].is_object() {
            let sticky = from_wire_block(&sticky_sessions_block(), &lb["sticky_sessions"]);
            attributes.insert("sticky_sessions".into(), Value::Map(sticky));
        }

        let mut rules = Vec::new();
        for rule in lb["forwarding_rules"].as_array().into_iter().flatten() {
            let mut rule_attrs = from_wire_block(&forwarding_rule_block(), rule);
            if let Some(cert_id) = rule["certificate_id"].as_str().filter(|s| !s.is_empty())
                && let Some(name) = certificate_name_for_id(api, cert_id).await?
            {
                rule_attrs.insert("certificate_name".into(), Value::from(name));
            }
            rules.push(Value::Map(rule_attrs));
        }
        attributes.insert(
            "forwarding_rule".into(),
            Value::Set(ValueSet::with_hasher(rules, hash_forwarding_rule)),
        );

        let handle = json_id(lb).unwrap_or_default();
        attributes.insert("urn".into(), Value::from(format!("do:loadbalancer:{handle}")));
        Ok(State::existing(id.clone(), attributes).with_identifier(handle))
    }

    async fn wait_active(&self, ctx: &Context, lb_id: &str, timeout: std::time::Duration) -> ProviderResult<serde_json::Value> {
        let path = format!("v2/load_balancers/{lb_id}");
        let (api, path) = (ctx.api(), path.as_str());
        ctx.waiter(format!("load balancer ({lb_id}) to become active"), PENDING, ACTIVE, timeout)
            .wait(|| async move {
                let body: serde_json::Value = api.get(path).await?;
                let lb = unwrap_object(body, "load_balancer")?;
                let status = lb["status"].as_str().unwrap_or_default().to_string();
                Ok(Poll::Status(lb, status))
            })
            .await
    }
}

/// Wire form of one rule with its certificate reference resolved to an ID
async fn forwarding_rule_body(api: &ApiClient, rule: &Value) -> ProviderResult<serde_json::Value> {
    let map = rule
        .as_map()
        .ok_or_else(|| ProviderError::invalid("forwarding_rule must be a block"))?;
    let mut body = Map::new();
    for key in ["entry_protocol", "entry_port", "target_protocol", "target_port", "tls_passthrough"] {
        if let Some(v) = map.get(key) {
            body.insert(key.to_string(), value_to_json(v));
        }
    }

    let by_name = map.get("certificate_name").and_then(Value::as_str).filter(|s| !s.is_empty());
    let by_id = map.get("certificate_id").and_then(Value::as_str).filter(|s| !s.is_empty());
    if let Some(reference) = by_name.or(by_id) {
        let cert = resolve_certificate(api, reference).await?;
        debug!("Forwarding rule certificate '{reference}' resolved to {}", cert.id);
        body.insert("certificate_id".into(), json!(cert.id));
    }
    Ok(serde_json::Value::Object(body))
}

#[async_trait]
impl ResourceLifecycle for LoadBalancer {
    fn name(&self) -> &'static str {
        "digitalocean_loadbalancer"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A regional load balancer")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("size", AttributeType::String).computed())
            .attribute(AttributeSchema::new("size_unit", AttributeType::Int).computed())
            .attribute(
                AttributeSchema::new(
                    "algorithm",
                    AttributeType::Enum(vec!["round_robin".to_string(), "least_connections".to_string()]),
                )
                .with_default("round_robin"),
            )
            .attribute(
                AttributeSchema::new(
                    "forwarding_rule",
                    AttributeType::set_of(AttributeType::block(forwarding_rule_block())),
                )
                .required()
                .with_set_hash(hash_forwarding_rule)
                .with_comparator(Comparator::Custom(forwarding_rules_equal)),
            )
            .attribute(
                AttributeSchema::new("healthcheck", AttributeType::block(healthcheck_block()))
                    .computed()
                    .with_comparator(Comparator::Custom(block_settings_equal)),
            )
            .attribute(
                AttributeSchema::new("sticky_sessions", AttributeType::block(sticky_sessions_block()))
                    .computed()
                    .with_comparator(Comparator::Custom(block_settings_equal)),
            )
            .attribute(AttributeSchema::new("droplet_ids", AttributeType::set_of(AttributeType::Int)).computed())
            .attribute(AttributeSchema::new("droplet_tag", AttributeType::String))
            .attribute(AttributeSchema::new("redirect_http_to_https", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("enable_proxy_protocol", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("enable_backend_keepalive", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("http_idle_timeout_seconds", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("disable_lets_encrypt_dns_records", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("vpc_uuid", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("project_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("ip", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let body = Self::body(ctx.api(), resource).await?;
        let created: serde_json::Value = ctx.api().post("v2/load_balancers", &body).await?;
        let lb = unwrap_object(created, "load_balancer")?;
        let lb_id = json_id(&lb)
            .ok_or_else(|| ProviderError::new("load balancer create response has no ID"))?;
        info!("Created load balancer {lb_id}; waiting for it to become active");

        let active = self
            .wait_active(ctx, &lb_id, self.schema().timeouts.create)
            .await
            .map_err(|e| e.with_identifier(lb_id.clone()))?;
        self.observe(ctx.api(), &resource.id, &active).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/load_balancers/{identifier}")).await?;
        self.observe(ctx.api(), id, &unwrap_object(body, "load_balancer")?).await
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
        let body = Self::body(ctx.api(), to).await?;
        let _: serde_json::Value = ctx
            .api()
            .put(&format!("v2/load_balancers/{identifier}"), &body)
            .await?;
        let active = self.wait_active(ctx, identifier, self.schema().timeouts.update).await?;
        self.observe(ctx.api(), id, &active).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/load_balancers/{identifier}")).await
    }
}
