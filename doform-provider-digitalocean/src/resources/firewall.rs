//! digitalocean_firewall
//!
//! Rules are flat blocks in the configuration and nested `sources` /
//! `destinations` objects on the wire. Every update replaces the whole rule
//! set with a single PUT.

use async_trait::async_trait;
use doform_core::differ::ChangeSet;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value, ValueSet};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::hash_firewall_rule;
use crate::wire::{copy_field, int_set, json_id, required_str, str_field, string_set, unwrap_object};

pub struct Firewall;

/// Direction of a rule: block name, wire list name and the endpoint prefix
#[derive(Clone, Copy)]
struct Direction {
    block: &'static str,
    wire: &'static str,
    endpoints: &'static str,
    prefix: &'static str,
}

const INBOUND: Direction = Direction {
    block: "inbound_rule",
    wire: "inbound_rules",
    endpoints: "sources",
    prefix: "source",
};

const OUTBOUND: Direction = Direction {
    block: "outbound_rule",
    wire: "outbound_rules",
    endpoints: "destinations",
    prefix: "destination",
};

/// Endpoint kinds: attribute suffix and wire key
const ENDPOINTS: &[(&str, &str)] = &[
    ("addresses", "addresses"),
    ("droplet_ids", "droplet_ids"),
    ("load_balancer_uids", "load_balancer_uids"),
    ("kubernetes_ids", "kubernetes_ids"),
    ("tags", "tags"),
];

fn rule_block(direction: Direction) -> BlockSchema {
    let protocol = AttributeType::Enum(vec!["tcp".to_string(), "udp".to_string(), "icmp".to_string()]);
    let mut block = BlockSchema::new()
        .attribute(AttributeSchema::new("protocol", protocol).required())
        .attribute(AttributeSchema::new("port_range", AttributeType::String));
    for (suffix, _) in ENDPOINTS {
        let element = if *suffix == "droplet_ids" {
            AttributeType::Int
        } else {
            AttributeType::String
        };
        block = block.attribute(AttributeSchema::new(
            format!("{}_{suffix}", direction.prefix),
            AttributeType::set_of(element),
        ));
    }
    block
}

fn rules_to_wire(resource: &Resource, direction: Direction) -> Vec<serde_json::Value> {
    let Some(rules) = resource.get(direction.block).and_then(Value::elements) else {
        return Vec::new();
    };
    rules
        .into_iter()
        .filter_map(Value::as_map)
        .map(|rule| {
            let mut endpoints = Map::new();
            for (suffix, wire) in ENDPOINTS {
                if let Some(v) = rule.get(&format!("{}_{suffix}", direction.prefix)) {
                    let items = if *suffix == "droplet_ids" {
                        json!(v.int_elements())
                    } else {
                        json!(v.string_elements())
                    };
                    endpoints.insert(wire.to_string(), items);
                }
            }
            let protocol = rule.get("protocol").and_then(Value::as_str).unwrap_or_default();
            let mut wire = Map::new();
            wire.insert("protocol".into(), json!(protocol));
            match rule.get("port_range").and_then(Value::as_str) {
                Some(ports) => {
                    wire.insert("ports".into(), json!(ports));
                }
                // tcp and udp rules without a range open every port
                None if protocol != "icmp" => {
                    wire.insert("ports".into(), json!("all"));
                }
                None => {}
            }
            wire.insert(direction.endpoints.into(), serde_json::Value::Object(endpoints));
            serde_json::Value::Object(wire)
        })
        .collect()
}

fn rules_from_wire(firewall: &serde_json::Value, direction: Direction) -> Value {
    let rules = firewall[direction.wire]
        .as_array()
        .into_iter()
        .flatten()
        .map(|rule| {
            let mut attrs = Attributes::new();
            copy_field(&mut attrs, rule, "protocol", "protocol");
            match str_field(rule, "ports").as_deref() {
                None | Some("0") | Some("") => {}
                Some(ports) => {
                    attrs.insert("port_range".into(), Value::from(ports));
                }
            }
            let endpoints = &rule[direction.endpoints];
            for (suffix, wire) in ENDPOINTS {
                let value = if *suffix == "droplet_ids" {
                    int_set(endpoints, wire)
                } else {
                    string_set(endpoints, wire)
                };
                if !value.is_empty() {
                    attrs.insert(format!("{}_{suffix}", direction.prefix), value);
                }
            }
            Value::Map(attrs)
        });
    Value::Set(ValueSet::with_hasher(rules, hash_firewall_rule))
}

fn body(resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
    let mut body = Map::new();
    body.insert("name".into(), json!(required_str(resource, "name")?));
    body.insert(INBOUND.wire.into(), json!(rules_to_wire(resource, INBOUND)));
    body.insert(OUTBOUND.wire.into(), json!(rules_to_wire(resource, OUTBOUND)));
    body.insert(
        "droplet_ids".into(),
        json!(resource.get("droplet_ids").map(Value::int_elements).unwrap_or_default()),
    );
    body.insert("tags".into(), json!(resource.get_strings("tags")));
    Ok(body)
}

fn observe(id: &ResourceId, firewall: &serde_json::Value) -> State {
    let mut attributes = Attributes::new();
    for key in ["name", "status", "created_at"] {
        copy_field(&mut attributes, firewall, key, key);
    }
    attributes.insert(INBOUND.block.into(), rules_from_wire(firewall, INBOUND));
    attributes.insert(OUTBOUND.block.into(), rules_from_wire(firewall, OUTBOUND));
    attributes.insert("droplet_ids".into(), int_set(firewall, "droplet_ids"));
    attributes.insert("tags".into(), string_set(firewall, "tags"));
    State::existing(id.clone(), attributes).with_identifier(json_id(firewall).unwrap_or_default())
}

#[async_trait]
impl ResourceLifecycle for Firewall {
    fn name(&self) -> &'static str {
        "digitalocean_firewall"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("A cloud firewall")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new(
                    INBOUND.block,
                    AttributeType::set_of(AttributeType::block(rule_block(INBOUND))),
                )
                .with_set_hash(hash_firewall_rule),
            )
            .attribute(
                AttributeSchema::new(
                    OUTBOUND.block,
                    AttributeType::set_of(AttributeType::block(rule_block(OUTBOUND))),
                )
                .with_set_hash(hash_firewall_rule),
            )
            .attribute(AttributeSchema::new("droplet_ids", AttributeType::set_of(AttributeType::Int)))
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(AttributeSchema::new("status", AttributeType::String).computed_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let created: serde_json::Value = ctx.api().post("v2/firewalls", &body(resource)?).await?;
        Ok(observe(&resource.id, &unwrap_object(created, "firewall")?))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/firewalls/{identifier}")).await?;
        Ok(observe(id, &unwrap_object(body, "firewall")?))
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
        let updated: serde_json::Value = ctx
            .api()
            .put(&format!("v2/firewalls/{identifier}"), &body(to)?)
            .await?;
        Ok(observe(id, &unwrap_object(updated, "firewall")?))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/firewalls/{identifier}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_survive_the_wire_without_diff() {
        let ssh = Value::Map(Attributes::from([
            ("protocol".to_string(), Value::from("tcp")),
            ("port_range".to_string(), Value::from("22")),
            ("source_addresses".to_string(), Value::List(vec![Value::from("0.0.0.0/0"), Value::from("::/0")])),
        ]));
        let desired = Resource::new("digitalocean_firewall", "web")
            .with_attribute("name", "web")
            .with_attribute("inbound_rule", Value::List(vec![ssh]))
            .with_attribute("droplet_ids", Value::List(vec![Value::Int(8043964)]));

        let sent = body(&desired).unwrap();
        assert_eq!(sent["inbound_rules"][0]["ports"], json!("22"));
        assert_eq!(sent["inbound_rules"][0]["sources"]["addresses"], json!(["0.0.0.0/0", "::/0"]));

        let mut upstream = serde_json::Value::Object(sent);
        upstream["id"] = json!("bb4b2611-3d72-467b-8602-280330ecd65c");
        upstream["status"] = json!("succeeded");
        let state = observe(&desired.id, &upstream);
        let changes = ChangeSet::between(&Firewall.schema(), &state.attributes, &desired.attributes);
        assert!(changes.is_empty(), "unexpected changes: {:?}", changes.changed());
    }
}
