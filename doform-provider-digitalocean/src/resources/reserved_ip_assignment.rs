use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::import::ImportId;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::resources::reserved_ip::{IpKind, assign_ip, unassign_ip};
use crate::wire::{required_int, required_str, unique_suffix, unwrap_object};

/// Binding of a reserved IP to a droplet, handled as `<ip>-<droplet>-<suffix>`
pub struct ReservedIpAssignment;

fn handle(ip: &str, droplet_id: i64) -> String {
    format!("{ip}-{droplet_id}-{}", unique_suffix())
}

fn parse_handle(identifier: &str) -> ProviderResult<(&str, i64)> {
    let invalid = || {
        ProviderError::invalid(format!(
            "invalid ID '{identifier}': expected \"<ip>-<droplet>-<suffix>\""
        ))
    };
    let mut parts = identifier.rsplitn(3, '-');
    let (_suffix, droplet, ip) = (
        parts.next().ok_or_else(invalid)?,
        parts.next().ok_or_else(invalid)?,
        parts.next().ok_or_else(invalid)?,
    );
    let droplet_id = droplet.parse().map_err(|_| invalid())?;
    Ok((ip, droplet_id))
}

#[async_trait]
impl ResourceLifecycle for ReservedIpAssignment {
    fn name(&self) -> &'static str {
        "digitalocean_reserved_ip_assignment"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("ip_address", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("droplet_id", AttributeType::Int).required().force_new())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let ip = required_str(resource, "ip_address")?;
        let droplet_id = required_int(resource, "droplet_id")?;
        assign_ip(ctx, IpKind::Reserved, ip, droplet_id, self.schema().timeouts.create).await?;
        self.read(ctx, &resource.id, &handle(ip, droplet_id)).await
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (ip, droplet_id) = parse_handle(identifier)?;
        let body: serde_json::Value = ctx
            .api()
            .get(&format!("{}/{ip}", IpKind::Reserved.collection()))
            .await?;
        let reserved = unwrap_object(body, IpKind::Reserved.envelope())?;
        if reserved["droplet"]["id"].as_i64() != Some(droplet_id) {
            return Err(ProviderError::not_found(format!(
                "{ip} is no longer assigned to droplet {droplet_id}"
            )));
        }
        let attributes = Attributes::from([
            ("ip_address".to_string(), Value::from(ip)),
            ("droplet_id".to_string(), Value::Int(droplet_id)),
        ]);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        _ctx: &Context,
        _id: &ResourceId,
        _identifier: &str,
        _from: &State,
        _to: &Resource,
        _changes: &ChangeSet,
    ) -> ProviderResult<State> {
        Err(ProviderError::invalid("reserved IP assignments are replaced, never updated"))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (ip, _) = parse_handle(identifier)?;
        unassign_ip(ctx, IpKind::Reserved, ip, self.schema().timeouts.delete).await
    }

    /// Import ID `<ip>,<droplet>`
    async fn import(&self, ctx: &Context, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let parsed = ImportId::parse(import_id, ",", &["ip_address", "droplet_id"])?;
        let droplet_id: i64 = parsed
            .field("droplet_id")?
            .parse()
            .map_err(|_| ProviderError::invalid(format!("invalid droplet ID in '{import_id}'")))?;
        self.read(ctx, id, &handle(parsed.field("ip_address")?, droplet_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_splits_from_the_right() {
        let h = handle("192.0.2.10", 101);
        let (ip, droplet) = parse_handle(&h).unwrap();
        assert_eq!(ip, "192.0.2.10");
        assert_eq!(droplet, 101);
        assert!(parse_handle("192.0.2.10").is_err());
        assert!(parse_handle("192.0.2.10-web-abcd1234").is_err());
    }
}
