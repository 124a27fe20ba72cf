//! Account-wide listings: regions, sizes, SSH keys, tags and projects

use async_trait::async_trait;
use doform_core::datalist::DataListConfig;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema};

use super::flatten;
use crate::lifecycle::{Context, DataSource};

pub struct Regions;

fn region_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("slug", AttributeType::String))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("sizes", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("features", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("available", AttributeType::Bool))
}

#[async_trait]
impl DataSource for Regions {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_regions", "regions", region_record())
            .filter_keys(&["slug", "name", "sizes", "features", "available"])
            .sort_keys(&["slug", "name", "available"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let regions: Vec<serde_json::Value> = ctx.api().list("v2/regions", "regions").await?;
        Ok(flatten(&region_record(), &regions, |_, _| {}))
    }
}

pub struct Sizes;

fn size_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("slug", AttributeType::String))
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("memory", AttributeType::Int))
        .attribute(AttributeSchema::new("vcpus", AttributeType::Int))
        .attribute(AttributeSchema::new("disk", AttributeType::Int))
        .attribute(AttributeSchema::new("transfer", AttributeType::Float))
        .attribute(AttributeSchema::new("price_monthly", AttributeType::Float))
        .attribute(AttributeSchema::new("price_hourly", AttributeType::Float))
        .attribute(AttributeSchema::new("regions", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("available", AttributeType::Bool))
}

#[async_trait]
impl DataSource for Sizes {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_sizes", "sizes", size_record())
            .with_description("Droplet sizes offered to the account")
            .filter_keys(&[
                "slug", "regions", "memory", "vcpus", "disk", "transfer", "price_monthly",
                "price_hourly", "available",
            ])
            .sort_keys(&[
                "slug", "memory", "vcpus", "disk", "transfer", "price_monthly", "price_hourly",
                "available",
            ])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let sizes: Vec<serde_json::Value> = ctx.api().list("v2/sizes", "sizes").await?;
        Ok(flatten(&size_record(), &sizes, |_, _| {}))
    }
}

pub struct SshKeys;

fn ssh_key_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::Int))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("fingerprint", AttributeType::String))
        .attribute(AttributeSchema::new("public_key", AttributeType::String))
}

#[async_trait]
impl DataSource for SshKeys {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_ssh_keys", "ssh_keys", ssh_key_record())
            .filter_keys(&["name", "fingerprint", "public_key"])
            .sort_keys(&["id", "name", "fingerprint"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let keys: Vec<serde_json::Value> = ctx.api().list("v2/account/keys", "ssh_keys").await?;
        Ok(flatten(&ssh_key_record(), &keys, |_, _| {}))
    }
}

pub struct Tags;

fn tag_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("total_resource_count", AttributeType::Int))
        .attribute(AttributeSchema::new("droplets_count", AttributeType::Int))
        .attribute(AttributeSchema::new("volumes_count", AttributeType::Int))
        .attribute(AttributeSchema::new("databases_count", AttributeType::Int))
}

/// Per-kind counts live under `resources.<kind>.count`
fn extend_tag(tag: &serde_json::Value, attributes: &mut Attributes) {
    let resources = &tag["resources"];
    if let Some(total) = resources["count"].as_i64() {
        attributes.insert("total_resource_count".into(), Value::Int(total));
    }
    for kind in ["droplets", "volumes", "databases"] {
        if let Some(count) = resources[kind]["count"].as_i64() {
            attributes.insert(format!("{kind}_count"), Value::Int(count));
        }
    }
}

#[async_trait]
impl DataSource for Tags {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_tags", "tags", tag_record())
            .filter_keys(&["name", "total_resource_count", "droplets_count", "volumes_count", "databases_count"])
            .sort_keys(&["name", "total_resource_count", "droplets_count", "volumes_count", "databases_count"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let tags: Vec<serde_json::Value> = ctx.api().list("v2/tags", "tags").await?;
        Ok(flatten(&tag_record(), &tags, extend_tag))
    }
}

pub struct Projects;

fn project_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::String))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("purpose", AttributeType::String))
        .attribute(AttributeSchema::new("environment", AttributeType::String))
        .attribute(AttributeSchema::new("owner_uuid", AttributeType::String))
        .attribute(AttributeSchema::new("owner_id", AttributeType::Int))
        .attribute(AttributeSchema::new("is_default", AttributeType::Bool))
        .attribute(AttributeSchema::new("created_at", AttributeType::String))
        .attribute(AttributeSchema::new("updated_at", AttributeType::String))
}

#[async_trait]
impl DataSource for Projects {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_projects", "projects", project_record())
            .filter_keys(&["id", "name", "description", "purpose", "environment", "owner_uuid", "is_default"])
            .sort_keys(&["name", "purpose", "environment", "is_default", "created_at", "updated_at"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let projects: Vec<serde_json::Value> = ctx.api().list("v2/projects", "projects").await?;
        Ok(flatten(&project_record(), &projects, |_, _| {}))
    }
}

#[cfg(test)]
mod tests {
    use doform_core::datalist::{Direction, Filter, Query, Sort};
    use serde_json::json;

    use super::*;

    #[test]
    fn sizes_filter_on_region_membership() {
        let upstream = vec![
            json!({ "slug": "s-1vcpu-1gb", "memory": 1024, "vcpus": 1, "disk": 25, "transfer": 1.0,
                    "price_monthly": 6.0, "price_hourly": 0.00893, "regions": ["nyc3", "ams3"], "available": true }),
            json!({ "slug": "s-2vcpu-4gb", "memory": 4096, "vcpus": 2, "disk": 80, "transfer": 4.0,
                    "price_monthly": 24.0, "price_hourly": 0.03571, "regions": ["nyc3"], "available": true }),
            json!({ "slug": "s-8vcpu-16gb", "memory": 16384, "vcpus": 8, "disk": 320, "transfer": 6.0,
                    "price_monthly": 96.0, "price_hourly": 0.14286, "regions": ["ams3"], "available": false }),
        ];
        let records = flatten(&size_record(), &upstream, |_, _| {});
        let query = Query {
            filters: vec![Filter::exact("regions", &["nyc3"])],
            sorts: vec![Sort::new("price_monthly", Direction::Desc)],
            extra: Attributes::new(),
        };
        let results = Sizes.config().apply(&query, records).unwrap();
        let slugs: Vec<_> = results.iter().map(|r| r["slug"].clone()).collect();
        assert_eq!(slugs, vec![Value::from("s-2vcpu-4gb"), Value::from("s-1vcpu-1gb")]);
    }

    #[test]
    fn tag_counts_come_from_nested_resources() {
        let upstream = json!({
            "name": "production",
            "resources": {
                "count": 5,
                "droplets": { "count": 3 },
                "volumes": { "count": 2 },
                "databases": { "count": 0 }
            }
        });
        let records = flatten(&tag_record(), &[upstream], extend_tag);
        assert_eq!(records[0]["total_resource_count"], Value::Int(5));
        assert_eq!(records[0]["droplets_count"], Value::Int(3));
        assert_eq!(records[0]["databases_count"], Value::Int(0));
    }
}
