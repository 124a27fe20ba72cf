use async_trait::async_trait;
use doform_core::codec::{from_wire, value_to_json};
use doform_core::differ::ChangeSet;
use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::resource::{Resource, ResourceId, State, Value};
use doform_core::schema::{AttributeSchema, AttributeType, BlockSchema, Comparator, ResourceSchema};
use serde_json::{Map, json};

use crate::lifecycle::{Context, ResourceLifecycle};
use crate::normalize::block_settings_equal;
use crate::wire::{required_str, str_field, unwrap_object};

/// digitalocean_monitor_alert: a metric alert policy, always written whole
pub struct MonitorAlert;

fn slack_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("channel", AttributeType::String).required())
        .attribute(AttributeSchema::new("url", AttributeType::String).required().sensitive())
}

fn alerts_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("email", AttributeType::set_of(AttributeType::String)))
        .attribute(AttributeSchema::new(
            "slack",
            AttributeType::list_of(AttributeType::block(slack_block())),
        ))
}

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

impl MonitorAlert {
    fn body(&self, resource: &Resource) -> ProviderResult<Map<String, serde_json::Value>> {
        let alerts = resource
            .get("alerts")
            .ok_or_else(|| ProviderError::invalid("attribute 'alerts' is required"))?;
        let mut body = Map::new();
        body.insert("alerts".into(), value_to_json(alerts));
        for key in ["type", "compare", "window", "description"] {
            body.insert(key.into(), json!(required_str(resource, key)?));
        }
        let value = resource
            .get("value")
            .and_then(Value::as_float)
            .ok_or_else(|| ProviderError::invalid("attribute 'value' is required"))?;
        body.insert("value".into(), json!(value));
        body.insert("enabled".into(), json!(resource.get_bool_or("enabled", true)));
        body.insert("entities".into(), json!(resource.get_strings("entities")));
        body.insert("tags".into(), json!(resource.get_strings("tags")));
        Ok(body)
    }

    fn observe(&self, id: &ResourceId, policy: &serde_json::Value) -> State {
        let attributes = from_wire(&self.schema(), policy);
        State::existing(id.clone(), attributes).with_identifier(str_field(policy, "uuid").unwrap_or_default())
    }
}

#[async_trait]
impl ResourceLifecycle for MonitorAlert {
    fn name(&self) -> &'static str {
        "digitalocean_monitor_alert"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .attribute(
                AttributeSchema::new("alerts", AttributeType::block(alerts_block()))
                    .required()
                    .with_comparator(Comparator::Custom(block_settings_equal)),
            )
            .attribute(AttributeSchema::new("type", AttributeType::String).required())
            .attribute(AttributeSchema::new("compare", enum_of(&["GreaterThan", "LessThan"])).required())
            .attribute(AttributeSchema::new("value", AttributeType::Float).required())
            .attribute(AttributeSchema::new("window", enum_of(&["5m", "10m", "30m", "1h"])).required())
            .attribute(AttributeSchema::new("description", AttributeType::String).required())
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool).with_default(true))
            .attribute(AttributeSchema::new("entities", AttributeType::set_of(AttributeType::String)))
            .attribute(AttributeSchema::new("tags", AttributeType::set_of(AttributeType::String)))
            .attribute(AttributeSchema::new("uuid", AttributeType::String).computed_only())
    }

    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State> {
        let created: serde_json::Value = ctx
            .api()
            .post("v2/monitoring/alerts", &self.body(resource)?)
            .await?;
        Ok(self.observe(&resource.id, &unwrap_object(created, "policy")?))
    }

    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let body: serde_json::Value = ctx.api().get(&format!("v2/monitoring/alerts/{identifier}")).await?;
        Ok(self.observe(id, &unwrap_object(body, "policy")?))
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
            .put(&format!("v2/monitoring/alerts/{identifier}"), &self.body(to)?)
            .await?;
        Ok(self.observe(id, &unwrap_object(updated, "policy")?))
    }

    async fn delete(&self, ctx: &Context, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        ctx.api().delete(&format!("v2/monitoring/alerts/{identifier}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_reads_back_through_the_schema() {
        let policy = json!({
            "uuid": "78b3da62-27e5-49ba-ac70-5db0b5935c64",
            "type": "v1/insights/droplet/cpu",
            "description": "CPU Alert",
            "compare": "GreaterThan",
            "value": 80,
            "window": "5m",
            "entities": ["192018292"],
            "tags": ["production_droplets"],
            "alerts": {
                "email": ["bob@example.com"],
                "slack": [{ "channel": "Production Alerts", "url": "https://hooks.slack.com/services/T1234567/AAAAAAAA/ZZZZZZ" }]
            },
            "enabled": true
        });
        let id = ResourceId::new("digitalocean_monitor_alert", "cpu");
        let state = MonitorAlert.observe(&id, &policy);
        assert_eq!(state.identifier.as_deref(), Some("78b3da62-27e5-49ba-ac70-5db0b5935c64"));
        assert_eq!(state.get("value"), Some(&Value::Float(80.0)));
        let alerts = state.get("alerts").and_then(Value::as_map).unwrap();
        assert_eq!(alerts["email"], Value::string_set(["bob@example.com"]));
    }
}
