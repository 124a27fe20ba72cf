//! digitalocean_droplets and digitalocean_database_clusters

use async_trait::async_trait;
use doform_core::datalist::DataListConfig;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema};

use super::flatten;
use crate::lifecycle::{Context, DataSource};
use crate::wire::{json_id, nested_slug, str_field};

pub struct Droplets;

fn droplet_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::Int))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("region", AttributeType::String))
        .attribute(AttributeSchema::new("size", AttributeType::String))
        .attribute(AttributeSchema::new("image", AttributeType::String))
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new("vcpus", AttributeType::Int))
        .attribute(AttributeSchema::new("memory", AttributeType::Int))
        .attribute(AttributeSchema::new("disk", AttributeType::Int))
        .attribute(AttributeSchema::new("locked", AttributeType::Bool))
        .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("ipv4_address", AttributeType::String))
        .attribute(AttributeSchema::new("ipv4_address_private", AttributeType::String))
        .attribute(AttributeSchema::new("vpc_uuid", AttributeType::String))
        .attribute(AttributeSchema::new("created_at", AttributeType::String))
        .attribute(AttributeSchema::new("urn", AttributeType::String))
}

/// Reshape a droplet: slugs of nested objects and its public/private v4 addresses
fn extend_droplet(droplet: &serde_json::Value, attributes: &mut Attributes) {
    for key in ["region", "image"] {
        attributes.remove(key);
        if let Some(slug) = nested_slug(droplet, key) {
            attributes.insert(key.into(), Value::from(slug));
        }
    }
    if let Some(size) = str_field(droplet, "size_slug") {
        attributes.insert("size".into(), Value::from(size));
    }
    for (kind, attr) in [("public", "ipv4_address"), ("private", "ipv4_address_private")] {
        let address = droplet["networks"]["v4"]
            .as_array()
            .and_then(|nets| nets.iter().find(|n| n["type"] == kind))
            .and_then(|n| n["ip_address"].as_str());
        if let Some(address) = address {
            attributes.insert(attr.into(), Value::from(address));
        }
    }
    if let Some(id) = json_id(droplet) {
        attributes.insert("urn".into(), Value::from(format!("do:droplet:{id}")));
    }
}

#[async_trait]
impl DataSource for Droplets {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_droplets", "droplets", droplet_record())
            .with_description("Droplets in the account")
            .filter_keys(&[
                "id", "name", "region", "size", "image", "status", "vcpus", "memory", "disk",
                "locked", "tags", "vpc_uuid", "ipv4_address",
            ])
            .sort_keys(&[
                "id", "name", "region", "size", "image", "status", "vcpus", "memory", "disk",
                "created_at",
            ])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let droplets: Vec<serde_json::Value> = ctx.api().list("v2/droplets", "droplets").await?;
        Ok(flatten(&droplet_record(), &droplets, extend_droplet))
    }
}

pub struct DatabaseClusters;

fn cluster_record() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("id", AttributeType::String))
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("engine", AttributeType::String))
        .attribute(AttributeSchema::new("version", AttributeType::String))
        .attribute(AttributeSchema::new("size", AttributeType::String))
        .attribute(AttributeSchema::new("region", AttributeType::String))
        .attribute(AttributeSchema::new("node_count", AttributeType::Int).with_provider_name("num_nodes"))
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new("private_network_uuid", AttributeType::String))
        .attribute(AttributeSchema::new("host", AttributeType::String))
        .attribute(AttributeSchema::new("port", AttributeType::Int))
        .attribute(AttributeSchema::new("created_at", AttributeType::String))
        .attribute(AttributeSchema::new("urn", AttributeType::String))
}

#[async_trait]
impl DataSource for DatabaseClusters {
    fn config(&self) -> DataListConfig {
        DataListConfig::new("digitalocean_database_clusters", "database_clusters", cluster_record())
            .filter_keys(&["id", "name", "engine", "version", "size", "region", "node_count", "status", "tags"])
            .sort_keys(&["name", "engine", "version", "size", "region", "node_count", "status", "created_at"])
    }

    async fn records(&self, ctx: &Context, _extra: &Attributes) -> ProviderResult<Vec<Attributes>> {
        let clusters: Vec<serde_json::Value> = ctx.api().list("v2/databases", "databases").await?;
        Ok(flatten(&cluster_record(), &clusters, |cluster, attributes| {
            if let Some(host) = str_field(&cluster["connection"], "host") {
                attributes.insert("host".into(), Value::from(host));
            }
            if let Some(port) = cluster["connection"]["port"].as_i64() {
                attributes.insert("port".into(), Value::Int(port));
            }
            if let Some(Value::String(region)) = attributes.get("region") {
                let region = region.to_lowercase();
                attributes.insert("region".into(), Value::from(region));
            }
            if let Some(id) = json_id(cluster) {
                attributes.insert("urn".into(), Value::from(format!("do:dbaas:{id}")));
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use doform_core::datalist::{Direction, Filter, Query, Sort};
    use serde_json::json;

    use super::*;

    fn droplets() -> Vec<Attributes> {
        let upstream = vec![
            json!({
                "id": 3164444, "name": "web-1", "status": "active", "memory": 1024, "vcpus": 1,
                "disk": 25, "locked": false, "size_slug": "s-1vcpu-1gb",
                "region": { "slug": "nyc3", "name": "New York 3" },
                "image": { "id": 6918990, "slug": "ubuntu-24-04-x64" },
                "tags": ["web"],
                "networks": { "v4": [
                    { "ip_address": "10.128.192.124", "type": "private" },
                    { "ip_address": "192.241.165.154", "type": "public" }
                ]}
            }),
            json!({
                "id": 3164445, "name": "db-1", "status": "off", "memory": 4096, "vcpus": 2,
                "disk": 80, "locked": false, "size_slug": "s-2vcpu-4gb",
                "region": { "slug": "ams3" }, "image": { "id": 1 }, "tags": [],
                "networks": { "v4": [] }
            }),
        ];
        flatten(&droplet_record(), &upstream, extend_droplet)
    }

    #[test]
    fn nested_objects_flatten_to_slugs() {
        let records = droplets();
        let web = &records[0];
        assert_eq!(web["region"], Value::from("nyc3"));
        assert_eq!(web["size"], Value::from("s-1vcpu-1gb"));
        assert_eq!(web["image"], Value::from("ubuntu-24-04-x64"));
        assert_eq!(web["ipv4_address"], Value::from("192.241.165.154"));
        assert_eq!(web["ipv4_address_private"], Value::from("10.128.192.124"));
        assert_eq!(web["urn"], Value::from("do:droplet:3164444"));
        assert!(!records[1].contains_key("image"));
    }

    #[test]
    fn droplets_filter_and_sort() {
        let config = Droplets.config();
        let query = Query {
            filters: vec![Filter::exact("status", &["active", "off"])],
            sorts: vec![Sort::new("memory", Direction::Desc)],
            extra: Attributes::new(),
        };
        let results = config.apply(&query, droplets()).unwrap();
        let names: Vec<_> = results.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![Value::from("db-1"), Value::from("web-1")]);
    }
}
