//! digitalocean_reserved_ip and its legacy alias digitalocean_floating_ip
//!
//! Both share one lifecycle parameterized by [`IpKind`]. The droplet
//! assignment is a secondary write: a failure after the IP exists is logged
//! and the next plan converges it.

use std::time::Duration;

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::normalize::normalize_region_value;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::{info, warn};
use serde_json::json;

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::legacy_floating_urn;
use crate::wire::{ALREADY_UNASSIGNED, already_in_state, nested_slug, required_str, str_field, unwrap_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpKind {
    Reserved,
    Floating,
}

impl IpKind {
    pub fn collection(self) -> &'static str {
        match self {
            IpKind::Reserved => "v2/reserved_ips",
            IpKind::Floating => "v2/floating_ips",
        }
    }

    pub fn envelope(self) -> &'static str {
        match self {
            IpKind::Reserved => "reserved_ip",
            IpKind::Floating => "floating_ip",
        }
    }

    pub fn urn(self, ip: &str) -> String {
        let urn = format!("do:reservedip:{ip}");
        match self {
            IpKind::Reserved => urn,
            IpKind::Floating => legacy_floating_urn(&urn),
        }
    }
}

pub struct ReservedIp {
    pub kind: IpKind,
}

/// Assign `ip` to `droplet_id` and wait for the action
pub async fn assign_ip(ctx: &Context, kind: IpKind, ip: &str, droplet_id: i64, timeout: Duration) -> ProviderResult<()> {
    info!("Assigning {ip} to droplet {droplet_id}");
    let action = ctx
        .api()
        .post_action(
            &format!("{}/{ip}/actions", kind.collection()),
            &json!({ "type": "assign", "droplet_id": droplet_id }),
        )
        .await?;
    ctx.wait_for_action(&action, timeout).await?;
    Ok(())
}

/// Unassign `ip`; an IP that is already unassigned is not an error
pub async fn unassign_ip(ctx: &Context, kind: IpKind, ip: &str, timeout: Duration) -> ProviderResult<()> {
    info!("Unassigning {ip}");
    let action = match ctx
        .api()
        .post_action(
            &format!("{}/{ip}/actions", kind.collection()),
            &json!({ "type": "unassign" }),
        )
        .await
    {
        Ok(action) => action,
        Err(e) if already_in_state(&e, ALREADY_UNASSIGNED) => {
            warn!("{ip} is already unassigned: {}", e.message);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    ctx.wait_for_action(&action, timeout).await?;
    Ok(())
}

impl ReservedIp {
    async fn fetch(&self, ctx: &Context, ip: &str) -> ProviderResult<serde_json::Value> {
        let body: serde_json::Value = ctx
            .api()
            .get(&format!("{}/{ip}", self.kind.collection()))
            .await?;
        unwrap_object(body, self.kind.envelope())
    }

    fn observe(&self, id: &ResourceId, ip: &serde_json::Value) -> State {
        let address = str_field(ip, "ip").unwrap_or_default();
        let mut attributes = Attributes::new();
        attributes.insert("ip_address".into(), Value::from(address.as_str()));
        if let Some(region) = nested_slug(ip, "region") {
            attributes.insert("region".into(), Value::from(region));
        }
        let droplet_id = ip["droplet"]["id"].as_i64().unwrap_or(0);
        attributes.insert("droplet_id".into(), Value::Int(droplet_id));
        if let Some(project) = str_field(ip, "project_id") {
            attributes.insert("project_id".into(), Value::from(project));
        }
        attributes.insert("urn".into(), Value::from(self.kind.urn(&address)));
        State::existing(id.clone(), attributes).with_identifier(address)
    }
}

#[async_trait]
impl ResourceLifecycle for ReservedIp {
    fn name(&self) -> &'static str {
        match self.kind {
            IpKind::Reserved => "digitalocean_reserved_ip",
            IpKind::Floating => "digitalocean_floating_ip",
        }
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(
                AttributeSchema::new("region", types::region())
                    .required()
                    .force_new()
                    .with_state_fn(normalize_region_value),
            )
            .attribute(AttributeSchema::new("droplet_id", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("project_id", AttributeType::String).computed().force_new())
            .attribute(AttributeSchema::new("ip_address", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let mut body = serde_json::Map::new();
        body.insert("region".into(), json!(required_str(resource, "region")?.to_lowercase()));
        if let Some(project) = resource.get_string("project_id") {
            body.insert("project_id".into(), json!(project));
        }
        let created: serde_json::Value = ctx.api().post(self.kind.collection(), &body).await?;
        let ip = unwrap_object(created, self.kind.envelope())?;
        let address = str_field(&ip, "ip")
            .ok_or_else(|| ProviderError::new("reserved IP create response has no address"))?;
        info!("Created {} {address}", self.kind.envelope());

        if let Some(droplet_id) = resource.get_int("droplet_id").filter(|d| *d > 0)
            && let Err(e) = assign_ip(ctx, self.kind, &address, droplet_id, self.schema().timeouts.create).await
        {
            warn!("{address} was created but assigning it to droplet {droplet_id} failed: {e}");
        }
        self.read(ctx, &resource.id, &address).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let ip = self.fetch(ctx, identifier).await?;
        Ok(self.observe(id, &ip))
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
        if changes.has("droplet_id") {
            let timeout = self.schema().timeouts.update;
            let current = from.get_int("droplet_id").unwrap_or(0);
            let desired = to.get_int("droplet_id").unwrap_or(0);
            if current > 0 {
                unassign_ip(ctx, self.kind, identifier, timeout).await?;
            }
            if desired > 0 {
                assign_ip(ctx, self.kind, identifier, desired, timeout).await?;
            }
        }
        self.read(ctx, id, identifier).await
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let ip = self.fetch(ctx, identifier).await?;
        if ip["droplet"]["id"].as_i64().is_some() {
            unassign_ip(ctx, self.kind, identifier, self.schema().timeouts.delete).await?;
        }
        ctx.api()
            .delete(&format!("{}/{identifier}", self.kind.collection()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_alias_projects_floating_urn() {
        let upstream = json!({
            "ip": "45.55.96.47",
            "region": { "slug": "nyc3" },
            "droplet": null,
            "project_id": "746c6152-2fa2-11ed-92d3-27aaa54e4988"
        });
        let id = ResourceId::new("digitalocean_floating_ip", "web");
        let floating = ReservedIp { kind: IpKind::Floating }.observe(&id, &upstream);
        assert_eq!(floating.get_string("urn"), Some("do:floatingip:45.55.96.47"));
        assert_eq!(floating.get_int("droplet_id"), Some(0));

        let reserved = ReservedIp { kind: IpKind::Reserved }.observe(&id, &upstream);
        assert_eq!(reserved.get_string("urn"), Some("do:reservedip:45.55.96.47"));
        assert_eq!(reserved.identifier.as_deref(), Some("45.55.96.47"));
    }
}
