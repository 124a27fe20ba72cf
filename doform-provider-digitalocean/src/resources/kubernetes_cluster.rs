use async_trait::async_trait;
use doform_core::codec::{from_wire_block, value_to_json};
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema, Comparator, ResourceSchema, types};
use doform_core::waiter::Poll;
use log::info;
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::block_settings_equal;
use crate::wire::{copy_field, json_id, nested_slug, required_str, str_field, string_set, unwrap_object};

/// digitalocean_kubernetes_cluster with its default node pool
pub struct KubernetesCluster;

const PROVISIONING: &[&str] = &["provisioning", "upgrading"];
const RUNNING: &[&str] = &["running"];

fn node_pool_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("size", AttributeType::String).required())
        .attribute(AttributeSchema::new("node_count", types::positive_int()))
        .attribute(AttributeSchema::new("auto_scale", AttributeType::Bool).with_default(false))
        .attribute(AttributeSchema::new("min_nodes", AttributeType::Int))
        .attribute(AttributeSchema::new("max_nodes", AttributeType::Int))
        .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("id", AttributeType::String).computed_only())
}

/// Wire form of the node pool block; `node_count` is `count` upstream
fn node_pool_body(pool: &Attributes) -> serde_json::Value {
    let mut body = Map::new();
    for key in ["name", "size", "auto_scale", "min_nodes", "max_nodes"] {
        if let Some(v) = pool.get(key) {
            body.insert(key.into(), value_to_json(v));
        }
    }
    if let Some(count) = pool.get("node_count").and_then(Value::as_int) {
        body.insert("count".into(), json!(count));
    }
    body.insert(
        "tags".into(),
        json!(pool.get("tags").map(Value::string_elements).unwrap_or_default()),
    );
    serde_json::Value::Object(body)
}

fn observe(id: &ResourceId, cluster: &serde_json::Value) -> State {
    let mut attributes = Attributes::new();
    for key in [
        "name",
        "version",
        "vpc_uuid",
        "cluster_subnet",
        "service_subnet",
        "endpoint",
        "ipv4",
        "auto_upgrade",
        "created_at",
    ] {
        copy_field(&mut attributes, cluster, key, key);
    }
    if let Some(region) = str_field(cluster, "region").or_else(|| nested_slug(cluster, "region")) {
        attributes.insert("region".into(), Value::from(region.to_lowercase()));
    }
    copy_field(&mut attributes, &cluster["status"], "state", "status");
    attributes.insert("tags".into(), string_set(cluster, "tags"));

    if let Some(pool) = cluster["node_pools"].as_array().and_then(|pools| pools.first()) {
        let mut pool_attrs = from_wire_block(&node_pool_block(), pool);
        copy_field(&mut pool_attrs, pool, "count", "node_count");
        attributes.insert("node_pool".into(), Value::Map(pool_attrs));
    }

    let handle = json_id(cluster).unwrap_or_default();
    attributes.insert("urn".into(), Value::from(format!("do:kubernetes:{handle}")));
    State::existing(id.clone(), attributes).with_identifier(handle)
}

impl KubernetesCluster {
    async fn wait_running(&self, ctx: &Context, cluster_id: &str, timeout: std::time::Duration) -> ProviderResult<serde_json::Value> {
        let path = format!("v2/kubernetes/clusters/{cluster_id}");
        let (api, path) = (ctx.api(), path.as_str());
        ctx.waiter(format!("kubernetes cluster ({cluster_id}) to be running"), PROVISIONING, RUNNING, timeout)
            .wait(|| async move {
                let body: serde_json::Value = api.get(path).await?;
                let cluster = unwrap_object(body, "kubernetes_cluster")?;
                let state = cluster["status"]["state"].as_str().unwrap_or_default().to_string();
                Ok(Poll::Status(cluster, state))
            })
            .await
    }
}

#[async_trait]
impl ResourceLifecycle for KubernetesCluster {
    fn name(&self) -> &'static str {
        "digitalocean_kubernetes_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A managed Kubernetes cluster")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("version", AttributeType::String).required())
            .attribute(AttributeSchema::new("vpc_uuid", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("auto_upgrade", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(
                AttributeSchema::new("node_pool", AttributeType::block(node_pool_block()))
                    .required()
                    .with_comparator(Comparator::Custom(block_settings_equal)),
            )
            .attribute(AttributeSchema::new("cluster_subnet", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("service_subnet", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("ipv4", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let pool = resource
            .get("node_pool")
            .and_then(Value::as_map)
            .ok_or_else(|| ProviderError::invalid("attribute 'node_pool' is required"))?;
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        body.insert("version".into(), json!(required_str(resource, "version")?));
        body.insert("auto_upgrade".into(), json!(resource.get_bool_or("auto_upgrade", false)));
        body.insert("tags".into(), json!(resource.get_strings("tags")));
        body.insert("node_pools".into(), json!([node_pool_body(pool)]));
        if let Some(vpc) = resource.get_string("vpc_uuid") {
            body.insert("vpc_uuid".into(), json!(vpc));
        }

        let created: serde_json::Value = ctx.api().post("v2/kubernetes/clusters", &body).await?;
        let cluster = unwrap_object(created, "kubernetes_cluster")?;
        let cluster_id = json_id(&cluster)
            .ok_or_else(|| ProviderError::new("kubernetes cluster create response has no ID"))?;
        info!("Created kubernetes cluster {cluster_id}; waiting for it to be running");

        let running = self
            .wait_running(ctx, &cluster_id, self.schema().timeouts.create)
            .await
            .map_err(|e| e.with_identifier(cluster_id.clone()))?;
        Ok(observe(&resource.id, &running))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx
            .api()
            .get(&format!("v2/kubernetes/clusters/{identifier}"))
            .await?;
        Ok(observe(id, &unwrap_object(body, "kubernetes_cluster")?))
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
        let path = format!("v2/kubernetes/clusters/{identifier}");

        if changes.has_any(&["name", "tags", "auto_upgrade"]) {
            let body = json!({
                "name": required_str(to, "name")?,
                "tags": to.get_strings("tags"),
                "auto_upgrade": to.get_bool_or("auto_upgrade", false),
            });
            let _: serde_json::Value = ctx.api().put(&path, &body).await?;
        }

        if changes.has("version") {
            let body = json!({ "version": required_str(to, "version")? });
            ctx.api().post_no_response(&format!("{path}/upgrade"), &body).await?;
            self.wait_running(ctx, identifier, self.schema().timeouts.update).await?;
        }

        if changes.has("node_pool") {
            let pool_id = from
                .get("node_pool")
                .and_then(Value::as_map)
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::new("the default node pool has no ID in state"))?;
            let pool = to
                .get("node_pool")
                .and_then(Value::as_map)
                .ok_or_else(|| ProviderError::invalid("attribute 'node_pool' is required"))?;
            let _: serde_json::Value = ctx
                .api()
                .put(&format!("{path}/node_pools/{pool_id}"), &node_pool_body(pool))
                .await?;
        }

        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api()
            .delete(&format!("v2/kubernetes/clusters/{identifier}"))
            .await
    }
}
