//! Desired-state file
//!
//! A JSON document with an optional `provider` block, the managed `resources`
//! and the `data` sources to evaluate:
//!
//! ```json
//! {
//!   "provider": { "api_endpoint": "https://api.digitalocean.com" },
//!   "resources": [
//!     { "type": "digitalocean_tag", "name": "web", "attributes": { "name": "web" } }
//!   ],
//!   "data": [
//!     { "type": "digitalocean_droplets", "name": "nyc",
//!       "attributes": { "filter": [{ "key": "region", "values": ["nyc1"] }] } }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use doform_core::codec::json_to_value;
use doform_core::resource::{Attributes, Resource};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DesiredFile {
    #[serde(default)]
    provider: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resources: Vec<Entry>,
    #[serde(default)]
    data: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

impl Entry {
    fn into_resource(self, read_only: bool) -> Resource {
        let mut resource = Resource::new(self.resource_type, self.name).with_read_only(read_only);
        resource.attributes = to_attributes(&self.attributes);
        resource
    }
}

fn to_attributes(map: &serde_json::Map<String, serde_json::Value>) -> Attributes {
    map.iter()
        .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Parsed desired state: provider settings plus resources in file order
#[derive(Debug)]
pub struct Desired {
    pub provider: Attributes,
    /// Managed resources first, then data sources
    pub resources: Vec<Resource>,
}

impl Desired {
    pub fn parse(content: &str) -> Result<Self, String> {
        let file: DesiredFile =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

        let mut seen = HashSet::new();
        let mut resources = Vec::new();
        let entries = file
            .resources
            .into_iter()
            .map(|e| (e, false))
            .chain(file.data.into_iter().map(|e| (e, true)));
        for (entry, read_only) in entries {
            let resource = entry.into_resource(read_only);
            if !seen.insert(resource.id.clone()) {
                return Err(format!("{} is declared more than once", resource.id));
            }
            resources.push(resource);
        }

        Ok(Self {
            provider: to_attributes(&file.provider),
            resources,
        })
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Managed resources, without data sources
    pub fn managed(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.is_data_source())
    }
}

#[cfg(test)]
mod tests {
    use doform_core::resource::Value;

    use super::*;

    #[test]
    fn parses_resources_and_data_sources() {
        let desired = Desired::parse(
            r#"{
                "provider": { "max_retries": 2 },
                "resources": [
                    { "type": "digitalocean_tag", "name": "web", "attributes": { "name": "web" } }
                ],
                "data": [
                    { "type": "digitalocean_sizes", "name": "all" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(desired.provider.get("max_retries"), Some(&Value::Int(2)));
        assert_eq!(desired.resources.len(), 2);
        assert!(!desired.resources[0].is_data_source());
        assert_eq!(desired.resources[0].get_string("name"), Some("web"));
        assert!(desired.resources[1].is_data_source());
        assert_eq!(desired.managed().count(), 1);
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let err = Desired::parse(
            r#"{ "resources": [
                { "type": "digitalocean_tag", "name": "web", "attributes": { "name": "a" } },
                { "type": "digitalocean_tag", "name": "web", "attributes": { "name": "b" } }
            ] }"#,
        )
        .unwrap_err();
        assert!(err.contains("digitalocean_tag.web"), "{err}");
    }

    #[test]
    fn null_attributes_are_dropped() {
        let desired = Desired::parse(
            r#"{ "resources": [
                { "type": "digitalocean_droplet", "name": "web",
                  "attributes": { "name": "web", "user_data": null } }
            ] }"#,
        )
        .unwrap();
        assert!(desired.resources[0].get("user_data").is_none());
    }

    #[test]
    fn unknown_top_level_key_is_an_error() {
        assert!(Desired::parse(r#"{ "resource": [] }"#).is_err());
    }
}
