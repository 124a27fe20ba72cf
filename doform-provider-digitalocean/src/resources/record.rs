//! digitalocean_record
//!
//! The handle is `<domain>/<record-id>` since records only exist below their
//! domain. Host-typed data (CNAME, MX, NS, SRV, CAA) is read back fully
//! qualified with a trailing dot and compared against the configuration with
//! [`record_data_equal`], so `www.example.com` and `www.example.com.` match.

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::import::ImportId;
use doform_core::normalize::normalize_dns_data;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, Comparator, ResourceSchema, types};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::record_data_equal;
use crate::wire::{copy_field, json_id, required_str, split_handle, str_field, unwrap_object};

pub const RECORD_TYPES: &[&str] = &["A", "AAAA", "CAA", "CNAME", "MX", "NS", "TXT", "SRV", "SOA"];

/// Attributes sent on create and update besides the type
const WRITABLE: &[&str] = &["name", "data", "ttl", "priority", "port", "weight", "flags", "tag"];

pub struct Record;

impl Record {
    fn handle(domain: &str, record_id: &str) -> String {
        format!("{domain}/{record_id}")
    }

    fn body(resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
        let record_type = required_str(resource, "type")?;
        let mut body = Map::new();
        body.insert("type".into(), json!(record_type));
        for key in WRITABLE {
            match (key, resource.get(key)) {
                (&"data", Some(Value::String(data))) => {
                    body.insert("data".into(), json!(normalize_dns_data(record_type, data)));
                }
                (_, Some(Value::String(s))) => {
                    body.insert(key.to_string(), json!(s));
                }
                (_, Some(Value::Int(n))) => {
                    body.insert(key.to_string(), json!(n));
                }
                _ => {}
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl ResourceLifecycle for Record {
    fn name(&self) -> &'static str {
        "digitalocean_record"
    }

    fn schema(&self) -> ResourceSchema {
        let record_types = RECORD_TYPES.iter().map(|t| t.to_string()).collect();
        ResourceSchema::new(self.name())
            .attribute(AttributeSchema::new("domain", AttributeType::String).required().force_new())
            .attribute(
                AttributeSchema::new("type", AttributeType::Enum(record_types))
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("data", AttributeType::String)
                    .required()
                    .with_comparator(Comparator::Custom(record_data_equal)),
            )
            .attribute(AttributeSchema::new("ttl", types::positive_int()).computed())
            .attribute(AttributeSchema::new("priority", AttributeType::Int))
            .attribute(AttributeSchema::new("port", AttributeType::Int))
            .attribute(AttributeSchema::new("weight", AttributeType::Int))
            .attribute(AttributeSchema::new("flags", AttributeType::Int))
            .attribute(AttributeSchema::new("tag", AttributeType::String))
            .attribute(AttributeSchema::new("fqdn", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let domain = required_str(resource, "domain")?;
        let created: serde_json::Value = ctx
            .api()
            .post(&format!("v2/domains/{domain}/records"), &Self::body(resource)?)
            .await?;
        let record = unwrap_object(created, "domain_record")?;
        let record_id = json_id(&record)
            .ok_or_else(|| ProviderError::new("record create response has no ID"))?;
        Ok(observe(&resource.id, domain, &record_id, &record))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let parts = split_handle(identifier, 2, "<domain>/<record-id>")?;
        let (domain, record_id) = (parts[0], parts[1]);
        let body: serde_json::Value = ctx
            .api()
            .get(&format!("v2/domains/{domain}/records/{record_id}"))
            .await?;
        Ok(observe(id, domain, record_id, &unwrap_object(body, "domain_record")?))
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
        let parts = split_handle(identifier, 2, "<domain>/<record-id>")?;
        let (domain, record_id) = (parts[0], parts[1]);
        let updated: serde_json::Value = ctx
            .api()
            .put(
                &format!("v2/domains/{domain}/records/{record_id}"),
                &Self::body(to)?,
            )
            .await?;
        Ok(observe(id, domain, record_id, &unwrap_object(updated, "domain_record")?))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let parts = split_handle(identifier, 2, "<domain>/<record-id>")?;
        ctx.api()
            .delete(&format!("v2/domains/{}/records/{}", parts[0], parts[1]))
            .await
    }

    /// Import ID `<domain>,<record-id>`
    async fn import(&self, ctx: &Context, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let parsed = ImportId::parse(import_id, ",", &["domain", "record_id"])?;
        let handle = Self::handle(parsed.field("domain")?, parsed.field("record_id")?);
        self.read(ctx, id, &handle).await
    }
}

fn observe(id: &ResourceId, domain: &str, record_id: &str, record: &serde_json::Value) -> State {
    let mut attributes = Attributes::new();
    for key in ["type", "name", "ttl", "priority", "port", "weight", "flags", "tag"] {
        copy_field(&mut attributes, record, key, key);
    }
    let record_type = str_field(record, "type").unwrap_or_default();
    if let Some(data) = str_field(record, "data") {
        attributes.insert("data".into(), Value::from(normalize_dns_data(&record_type, &data)));
    }
    let name = str_field(record, "name").unwrap_or_default();
    let fqdn = if name == "@" || name.is_empty() {
        domain.to_string()
    } else {
        format!("{name}.{domain}")
    };
    attributes.insert("fqdn".into(), Value::from(fqdn));
    attributes.insert("domain".into(), Value::from(domain));
    State::existing(id.clone(), attributes).with_identifier(Record::handle(domain, record_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_dot_round_trip_has_no_diff() {
        let desired = Resource::new("digitalocean_record", "www")
            .with_attribute("domain", "example.com")
            .with_attribute("type", "CNAME")
            .with_attribute("name", "www")
            .with_attribute("data", "target.example.com");
        let upstream = json!({
            "id": 3352896, "type": "CNAME", "name": "www",
            "data": "target.example.com", "ttl": 1800,
            "priority": null, "port": null, "weight": null, "flags": null, "tag": null
        });
        let state = observe(&desired.id, "example.com", "3352896", &upstream);
        assert_eq!(state.get_string("data"), Some("target.example.com."));
        assert_eq!(state.get_string("fqdn"), Some("www.example.com"));
        assert_eq!(state.identifier.as_deref(), Some("example.com/3352896"));

        let changes = ChangeSet::between(&Record.schema(), &state.attributes, &desired.attributes);
        assert!(changes.is_empty(), "unexpected changes: {:?}", changes.changed());
    }

    #[test]
    fn external_cname_target_converges() {
        let desired = Resource::new("digitalocean_record", "app")
            .with_attribute("domain", "example.com")
            .with_attribute("type", "CNAME")
            .with_attribute("name", "app")
            .with_attribute("data", "foo.herokuapp.com");
        let body = Record::body(&desired).unwrap();
        assert_eq!(body["data"], json!("foo.herokuapp.com."));

        let upstream = json!({
            "id": 3352897, "type": "CNAME", "name": "app",
            "data": "foo.herokuapp.com", "ttl": 1800
        });
        let state = observe(&desired.id, "example.com", "3352897", &upstream);
        let changes = ChangeSet::between(&Record.schema(), &state.attributes, &desired.attributes);
        assert!(changes.is_empty(), "unexpected changes: {:?}", changes.changed());
    }

    #[test]
    fn request_body_qualifies_host_data() {
        let desired = Resource::new("digitalocean_record", "mx")
            .with_attribute("domain", "example.com")
            .with_attribute("type", "MX")
            .with_attribute("name", "@")
            .with_attribute("data", "mail.example.com")
            .with_attribute("priority", 10_i64);
        let body = Record::body(&desired).unwrap();
        assert_eq!(body["data"], json!("mail.example.com."));
        assert_eq!(body["priority"], json!(10));
        assert!(!body.contains_key("domain"));
    }
}
