//! DNS-side listings: domains, the records of one domain, certificates

use async_trait::async_trait;
use doform_core::datalist::DataListConfig;
use doform_core::normalize::normalize_dns_data;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema};

use super::{flatten, required_extra};
use crate::lifecycle::{Context, DataSource};
use crate::wire::str_field;

pub struct Domains;

fn domain_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("ttl", AttributeType::Int))
        .attribute(AttributeSchema::new("zone_file", AttributeType::String))
        .attribute(AttributeSchema::new("urn", AttributeType::String))
}

#[async_trait]
impl DataSource for Domains {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_domains", "domains", domain_record())
            .filter_keys(&["name", "ttl", "urn"])
            .sort_keys(&["name", "ttl", "urn"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let domains: Vec<serde_json::Value> = ctx.api().list("v2/domains", "domains").await?;
        Ok(flatten(&domain_record(), &domains, |domain, attributes| {
            if let Some(name) = str_field(domain, "name") {
                attributes.insert("urn".into(), Value::from(format!("do:domain:{name}")));
            }
        }))
    }
}

/// Records of the domain named by the `domain` query field
pub struct Records;

fn dns_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::Int))
        .attribute(AttributeSchema::new("domain", AttributeType::String))
        .attribute(AttributeSchema::new("type", AttributeType::String))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("data", AttributeType::String))
        .attribute(AttributeSchema::new("priority", AttributeType::Int))
        .attribute(AttributeSchema::new("port", AttributeType::Int))
        .attribute(AttributeSchema::new("ttl", AttributeType::Int))
        .attribute(AttributeSchema::new("weight", AttributeType::Int))
        .attribute(AttributeSchema::new("flags", AttributeType::Int))
        .attribute(AttributeSchema::new("tag", AttributeType::String))
}

#[async_trait]
impl DataSource for Records {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_records", "records", dns_record())
            .filter_keys(&["type", "name", "data", "priority", "port", "ttl", "weight", "flags", "tag"])
            .sort_keys(&["id", "type", "name", "data", "priority", "port", "ttl", "weight"])
            .extra_query(AttributeSchema::new("domain", AttributeType::String).required())
    }

    async fn records(&self, ctx: &Context, extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let domain = required_extra(extra, "domain")?;
        let records: Vec<serde_json::Value> = ctx
            .api()
            .list(&format!("v2/domains/{domain}/records"), "domain_records")
            .await?;
        Ok(flatten(&dns_record(), &records, |record, attributes| {
            attributes.insert("domain".into(), Value::from(domain));
            let record_type = str_field(record, "type").unwrap_or_default();
            if let Some(data) = str_field(record, "data") {
                attributes.insert("data".into(), Value::from(normalize_dns_data(&record_type, &data)));
            }
        }))
    }
}

pub struct Certificates;

fn certificate_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::String))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("type", AttributeType::String))
        .attribute(AttributeSchema::new("state", AttributeType::String))
        .attribute(AttributeSchema::new("not_after", AttributeType::String))
        .attribute(AttributeSchema::new("sha1_fingerprint", AttributeType::String))
        .attribute(AttributeSchema::new("dns_names", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("created_at", AttributeType::String))
}

#[async_trait]
impl DataSource for Certificates {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_certificates", "certificates", certificate_record())
            .filter_keys(&["name", "type", "state", "not_after", "sha1_fingerprint", "dns_names"])
            .sort_keys(&["name", "type", "state", "not_after", "sha1_fingerprint", "created_at"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let certificates: Vec<serde_json::Value> =
            ctx.api().list("v2/certificates", "certificates").await?;
        Ok(flatten(&certificate_record(), &certificates, |_, _| {}))
    }
}
