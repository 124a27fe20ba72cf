//! Managed databases
//!
//! [`DatabaseCluster`] owns the cluster itself. Databases, users, connection
//! pools and read replicas live below a cluster and share one lifecycle,
//! [`DatabaseChild`], handled as `<cluster>/<kind>/<name>`.

use std::time::Duration;

use async_trait::async_trait;
use doform_core::codec::from_wire_block;
use doform_core::differ::ChangeSet;
use doform_core::import::ImportId;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema, Comparator, ResourceSchema, types};
use doform_core::waiter::Poll;
use log::{info, warn};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::block_settings_equal;
use crate::resources::tag::sync_resource_tags;
use crate::wire::{
    copy_field, insert_present, json_id, required_int, required_str, split_handle, str_field,
    string_set, unwrap_object,
};

/// Statuses a cluster passes through on its way back to `online`
const CLUSTER_PENDING: &[&str] = &["creating", "resizing", "migrating", "forking"];
const ONLINE: &[&str] = &["online"];

pub const ENGINES: &[&str] = &["pg", "mysql", "redis", "valkey", "mongodb", "kafka", "opensearch"];

fn maintenance_window_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("day", AttributeType::String).required())
        .attribute(AttributeSchema::new("hour", AttributeType::String).required())
}

/// Poll `path` (a cluster or replica) until its status is `online`
async fn wait_online(
    ctx: &Context,
    what: String,
    path: &str,
    envelope: &str,
    timeout: Duration,
) -> ProviderResult<serde_json::Value> {
    let api = ctx.api();
    ctx.waiter(format!("{what} to become online"), CLUSTER_PENDING, ONLINE, timeout)
        .wait(|| async move {
            let body: serde_json::Value = api.get(path).await?;
            let object = unwrap_object(body, envelope)?;
            let status = object["status"].as_str().unwrap_or_default().to_string();
            Ok(Poll::Status(object, status))
        })
        .await
}

pub struct DatabaseCluster;

impl DatabaseCluster {
    async fn put_maintenance_window(ctx: &Context, cluster_id: &str, window: &Value) -> ProviderResult<()> {
        let map = window
            .as_map()
            .ok_or_else(|| ProviderError::invalid("maintenance_window must be a block"))?;
        let body = json!({
            "day": map.get("day").and_then(Value::as_str).unwrap_or_default(),
            "hour": map.get("hour").and_then(Value::as_str).unwrap_or_default(),
        });
        ctx.api()
            .put_no_response(&format!("v2/databases/{cluster_id}/maintenance"), &body)
            .await
    }

    fn observe(id: &ResourceId, cluster: &serde_json::Value) -> State {
        let mut attributes = Attributes::new();
        for key in ["name", "engine", "version", "status", "created_at", "private_network_uuid"] {
            copy_field(&mut attributes, cluster, key, key);
        }
        copy_field(&mut attributes, cluster, "size", "size");
        copy_field(&mut attributes, cluster, "num_nodes", "node_count");
        copy_field(&mut attributes, cluster, "region", "region");
        if let Some(Value::String(region)) = attributes.get("region") {
            let region = region.to_lowercase();
            attributes.insert("region".into(), Value::from(region));
        }
        attributes.insert("tags".into(), string_set(cluster, "tags"));

        let connection = &cluster["connection"];
        for (wire, name) in [
            ("host", "host"),
            ("port", "port"),
            ("uri", "uri"),
            ("database", "database"),
            ("user", "user"),
            ("password", "password"),
        ] {
            copy_field(&mut attributes, connection, wire, name);
        }
        let private = &cluster["private_connection"];
        copy_field(&mut attributes, private, "host", "private_host");
        copy_field(&mut attributes, private, "uri", "private_uri");

        if cluster["maintenance_window"].is_object() {
            let window = from_wire_block(&maintenance_window_block(), &cluster["maintenance_window"]);
            attributes.insert("maintenance_window".into(), Value::Map(window));
        }

        let handle = json_id(cluster).unwrap_or_default();
        attributes.insert("urn".into(), Value::from(format!("do:dbaas:{handle}")));
        State::existing(id.clone(), attributes).with_identifier(handle)
    }
}

#[async_trait]
impl ResourceLifecycle for DatabaseCluster {
    fn name(&self) -> &'static str {
        "digitalocean_database_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let engines = ENGINES.iter().map(|e| e.to_string()).collect();
        ResourceSchema::new(self.name())
            .with_description("A managed database cluster")
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("engine", AttributeType::Enum(engines)).required().force_new())
            .attribute(AttributeSchema::new("version", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("size", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("node_count", types::positive_int()).required())
            .attribute(AttributeSchema::new("private_network_uuid", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(
                AttributeSchema::new("maintenance_window", AttributeType::block(maintenance_window_block()))
                    .computed()
                    .with_comparator(Comparator::Custom(block_settings_equal)),
            )
            .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("host", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("private_host", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("port", AttributeType::Int).computed_only())
            .attribute(AttributeSchema::new("uri", AttributeType::String).computed_only().sensitive())
            .attribute(AttributeSchema::new("private_uri", AttributeType::String).computed_only().sensitive())
            .attribute(AttributeSchema::new("database", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("user", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("password", AttributeType::String).computed_only().sensitive())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        body.insert("engine".into(), json!(required_str(resource, "engine")?));
        body.insert("size".into(), json!(required_str(resource, "size")?));
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        body.insert("num_nodes".into(), json!(required_int(resource, "node_count")?));
        body.insert("tags".into(), json!(resource.get_strings("tags")));
        for key in ["version", "private_network_uuid"] {
            insert_present(&mut body, resource, key);
        }

        let created: serde_json::Value = ctx.api().post("v2/databases", &body).await?;
        let cluster = unwrap_object(created, "database")?;
        let cluster_id = json_id(&cluster)
            .ok_or_else(|| ProviderError::new("database create response has no ID"))?;
        info!("Created database cluster {cluster_id}; waiting for it to come online");

        let path = format!("v2/databases/{cluster_id}");
        let online = wait_online(
            ctx,
            format!("database cluster ({cluster_id})"),
            &path,
            "database",
            self.schema().timeouts.create,
        )
        .await
        .map_err(|e| e.with_identifier(cluster_id.clone()))?;

        // The cluster exists from here on; a failed window is converged by the next plan
        if let Some(window) = resource.get("maintenance_window") {
            if let Err(e) = Self::put_maintenance_window(ctx, &cluster_id, window).await {
                warn!("Database cluster {cluster_id} was created but setting its maintenance window failed: {e}");
                return Ok(Self::observe(&resource.id, &online));
            }
            return self.read(ctx, &resource.id, &cluster_id).await;
        }
        Ok(Self::observe(&resource.id, &online))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/databases/{identifier}")).await?;
        Ok(Self::observe(id, &unwrap_object(body, "database")?))
    }

    /// Resizes run before migrations: a migration needs the cluster online
    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State> {
        let timeout = self.schema().timeouts.update;
        let path = format!("v2/databases/{identifier}");
        let what = format!("database cluster ({identifier})");

        if changes.has_any(&["size", "node_count"]) {
            let body = json!({
                "size": required_str(to, "size")?,
                "num_nodes": required_int(to, "node_count")?,
            });
            info!("Resizing {what}");
            ctx.api().put_no_response(&format!("{path}/resize"), &body).await?;
            wait_online(ctx, what.clone(), &path, "database", timeout).await?;
        }

        if changes.has("region") {
            let body = json!({ "region": required_str(to, "region")?.to_lowercase() });
            info!("Migrating {what}");
            ctx.api().put_no_response(&format!("{path}/migrate"), &body).await?;
            wait_online(ctx, what.clone(), &path, "database", timeout).await?;
        }

        if changes.has("maintenance_window")
            && let Some(window) = to.get("maintenance_window")
        {
            Self::put_maintenance_window(ctx, identifier, window).await?;
        }

        if changes.has("tags") {
            let current = from.get("tags").map(Value::string_elements).unwrap_or_default();
            sync_resource_tags(ctx.api(), identifier, "database", &current, &to.get_strings("tags"))
                .await?;
        }

        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/databases/{identifier}")).await
    }
}

/// Kind of object living below a database cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Db,
    User,
    ConnectionPool,
    Replica,
}

impl ChildKind {
    fn label(self) -> &'static str {
        match self {
            ChildKind::Db => "db",
            ChildKind::User => "user",
            ChildKind::ConnectionPool => "pool",
            ChildKind::Replica => "replica",
        }
    }

    fn collection(self) -> &'static str {
        match self {
            ChildKind::Db => "dbs",
            ChildKind::User => "users",
            ChildKind::ConnectionPool => "pools",
            ChildKind::Replica => "replicas",
        }
    }

    /// Object key of single-object responses
    fn envelope(self) -> &'static str {
        match self {
            ChildKind::Db => "db",
            ChildKind::User => "user",
            ChildKind::ConnectionPool => "pool",
            ChildKind::Replica => "replica",
        }
    }
}

pub struct DatabaseChild {
    pub kind: ChildKind,
}

impl DatabaseChild {
    fn handle(&self, cluster_id: &str, name: &str) -> String {
        format!("{cluster_id}/{}/{name}", self.kind.label())
    }

    fn parse_handle<'a>(&self, identifier: &'a str) -> ProviderResult<(&'a str, &'a str)> {
        let shape = format!("<cluster>/{}/<name>", self.kind.label());
        let parts = split_handle(identifier, 3, &shape)?;
        if parts[1] != self.kind.label() {
            return Err(ProviderError::invalid(format!(
                "invalid ID '{identifier}': expected \"{shape}\""
            )));
        }
        Ok((parts[0], parts[2]))
    }

    fn object_path(&self, cluster_id: &str, name: &str) -> String {
        format!("v2/databases/{cluster_id}/{}/{name}", self.kind.collection())
    }

    fn body(&self, resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
        let mut body = Map::new();
        body.insert("name".into(), json!(required_str(resource, "name")?));
        match self.kind {
            ChildKind::Db => {}
            ChildKind::User => {
                if let Some(plugin) = resource.get_string("mysql_auth_plugin") {
                    body.insert("mysql_settings".into(), json!({ "auth_plugin": plugin }));
                }
            }
            ChildKind::ConnectionPool => {
                body.insert("mode".into(), json!(required_str(resource, "mode")?));
                body.insert("size".into(), json!(required_int(resource, "size")?));
                body.insert("db".into(), json!(required_str(resource, "db_name")?));
                insert_present(&mut body, resource, "user");
            }
            ChildKind::Replica => {
                body.insert("tags".into(), json!(resource.get_strings("tags")));
                if let Some(region) = resource.get_string("region") {
                    body.insert("region".into(), json!(region.to_lowercase()));
                }
                for key in ["size", "private_network_uuid"] {
                    insert_present(&mut body, resource, key);
                }
            }
        }
        Ok(body)
    }

    fn observe(&self, id: &ResourceId, cluster_id: &str, object: &serde_json::Value, desired: &Resource) -> State {
        let mut attributes = Attributes::new();
        attributes.insert("cluster_id".into(), Value::from(cluster_id));
        copy_field(&mut attributes, object, "name", "name");
        match self.kind {
            ChildKind::Db => {}
            ChildKind::User => {
                copy_field(&mut attributes, object, "role", "role");
                copy_field(&mut attributes, object, "password", "password");
                copy_field(&mut attributes, &object["mysql_settings"], "auth_plugin", "mysql_auth_plugin");
            }
            ChildKind::ConnectionPool => {
                for key in ["mode", "size", "user"] {
                    copy_field(&mut attributes, object, key, key);
                }
                copy_field(&mut attributes, object, "db", "db_name");
                for key in ["host", "port", "uri", "password"] {
                    copy_field(&mut attributes, &object["connection"], key, key);
                }
            }
            ChildKind::Replica => {
                for key in ["size", "status", "private_network_uuid", "created_at"] {
                    copy_field(&mut attributes, object, key, key);
                }
                if let Some(region) = str_field(object, "region") {
                    attributes.insert("region".into(), Value::from(region.to_lowercase()));
                }
                copy_field(&mut attributes, object, "id", "uuid");
                attributes.insert("tags".into(), string_set(object, "tags"));
                for key in ["host", "port", "uri"] {
                    copy_field(&mut attributes, &object["connection"], key, key);
                }
                copy_field(&mut attributes, &object["private_connection"], "host", "private_host");
            }
        }
        // Passwords are only returned on create for some engines
        if !attributes.contains_key("password")
            && let Some(password) = desired.get("password")
        {
            attributes.insert("password".into(), password.clone());
        }
        let name = str_field(object, "name").unwrap_or_default();
        State::existing(id.clone(), attributes).with_identifier(self.handle(cluster_id, &name))
    }
}

#[async_trait]
impl ResourceLifecycle for DatabaseChild {
    fn name(&self) -> &'static str {
        match self.kind {
            ChildKind::Db => "digitalocean_database_db",
            ChildKind::User => "digitalocean_database_user",
            ChildKind::ConnectionPool => "digitalocean_database_connection_pool",
            ChildKind::Replica => "digitalocean_database_replica",
        }
    }

    fn schema(&self) -> ResourceSchema {
        let schema = ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("cluster_id", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new());
        match self.kind {
            ChildKind::Db => schema,
            ChildKind::User => schema
                .attribute(AttributeSchema::new(
                    "mysql_auth_plugin",
                    AttributeType::Enum(vec![
                        "mysql_native_password".to_string(),
                        "caching_sha2_password".to_string(),
                    ]),
                ))
                .attribute(AttributeSchema::new("role", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("password", AttributeType::String).computed_only().sensitive()),
            ChildKind::ConnectionPool => schema
                .attribute(
                    AttributeSchema::new(
                        "mode",
                        AttributeType::Enum(vec![
                            "session".to_string(),
                            "transaction".to_string(),
                            "statement".to_string(),
                        ]),
                    )
                    .required(),
                )
                .attribute(AttributeSchema::new("size", types::positive_int()).required())
                .attribute(AttributeSchema::new("db_name", AttributeType::String).required())
                .attribute(AttributeSchema::new("user", AttributeType::String).computed())
                .attribute(AttributeSchema::new("host", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("port", AttributeType::Int).computed_only())
                .attribute(AttributeSchema::new("uri", AttributeType::String).computed_only().sensitive())
                .attribute(AttributeSchema::new("password", AttributeType::String).computed_only().sensitive()),
            ChildKind::Replica => schema
                .attribute(
                    AttributeSchema::new("region", types::region())
                        .computed()
                        .force_new()
                        .with_state_fn(normalize_region_value),
                )
                .attribute(AttributeSchema::new("size", AttributeType::String).computed())
                .attribute(AttributeSchema::new("private_network_uuid", AttributeType::String).computed().force_new())
                .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)).force_new())
                .attribute(AttributeSchema::new("uuid", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("host", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("private_host", AttributeType::String).computed_only())
                .attribute(AttributeSchema::new("port", AttributeType::Int).computed_only())
                .attribute(AttributeSchema::new("uri", AttributeType::String).computed_only().sensitive())
                .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only()),
        }
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let cluster_id = required_str(resource, "cluster_id")?;
        let name = required_str(resource, "name")?;
        let collection = format!("v2/databases/{cluster_id}/{}", self.kind.collection());
        let created: serde_json::Value = ctx.api().post(&collection, &self.body(resource)?).await?;
        let object = unwrap_object(created, self.kind.envelope())?;

        if self.kind == ChildKind::Replica {
            let path = self.object_path(cluster_id, name);
            let online = wait_online(
                ctx,
                format!("database replica ({name})"),
                &path,
                self.kind.envelope(),
                self.schema().timeouts.create,
            )
            .await
            .map_err(|e| e.with_identifier(self.handle(cluster_id, name)))?;
            return Ok(self.observe(&resource.id, cluster_id, &online, resource));
        }
        Ok(self.observe(&resource.id, cluster_id, &object, resource))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (cluster_id, name) = self.parse_handle(identifier)?;
        let body: serde_json::Value = ctx.api().get(&self.object_path(cluster_id, name)).await?;
        let object = unwrap_object(body, self.kind.envelope())?;
        Ok(self.observe(id, cluster_id, &object, &Resource::new(&id.resource_type, &id.name)))
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
        let (cluster_id, name) = self.parse_handle(identifier)?;
        let path = self.object_path(cluster_id, name);
        match self.kind {
            ChildKind::User if changes.has("mysql_auth_plugin") => {
                let body = json!({
                    "mysql_settings": { "auth_plugin": required_str(to, "mysql_auth_plugin")? }
                });
                let _: serde_json::Value = ctx.api().post(&format!("{path}/reset_auth"), &body).await?;
            }
            ChildKind::ConnectionPool => {
                let mut body = self.body(to)?;
                body.remove("name");
                ctx.api().put_no_response(&path, &body).await?;
            }
            ChildKind::Replica if changes.has("size") => {
                let body = json!({ "size": required_str(to, "size")? });
                ctx.api().put_no_response(&format!("{path}/resize"), &body).await?;
                wait_online(
                    ctx,
                    format!("database replica ({name})"),
                    &path,
                    self.kind.envelope(),
                    self.schema().timeouts.update,
                )
                .await?;
            }
            _ => {
                return Err(ProviderError::invalid(format!(
                    "{} cannot be updated in place (changed: {})",
                    self.name(),
                    changes.changed().join(", ")
                )));
            }
        }
        let state = self.read(ctx, id, identifier).await?;
        Ok(state.carry_over(from))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (cluster_id, name) = self.parse_handle(identifier)?;
        ctx.api().delete(&self.object_path(cluster_id, name)).await
    }

    /// Import ID `<cluster>,<name>`
    async fn import(&self, ctx: &Context, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let parsed = ImportId::parse(import_id, ",", &["cluster_id", "name"])?;
        let handle = self.handle(parsed.field("cluster_id")?, parsed.field("name")?);
        self.read(ctx, id, &handle).await
    }
}
