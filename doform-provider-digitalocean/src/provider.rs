//! DigitalOcean provider implementation
//!
//! Dispatches lifecycle calls to the registered resource kinds and data
//! sources, and owns the policy every kind shares:
//!
//! - a read or update that finds the object gone yields `State::not_found`
//! - a delete of an object already gone succeeds
//! - an update whose change set is empty performs no upstream call
//! - every error leaves here tagged with its operation, resource and handle

use std::collections::HashMap;
use std::sync::Arc;

use doform_core::differ::ChangeSet;
use doform_core::provider::{Operation, ProviderError, ProviderResult, ResourceType, ResultExt};
use doform_core::resource::{Attributes, Resource, ResourceId, State};
use doform_core::schema::ResourceSchema;
use doform_core::waiter::WaitConfig;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::{CombinedClient, ConfigError, ProviderConfig};
use crate::data_sources;
use crate::lifecycle::{Context, DataSource, ResourceLifecycle};
use crate::resources;

/// DigitalOcean Provider
pub struct DigitalOceanProvider {
    ctx: Context,
    resources: HashMap<&'static str, Arc<dyn ResourceLifecycle>>,
    data_sources: HashMap<String, Arc<dyn DataSource>>,
}

impl DigitalOceanProvider {
    /// Create a provider for the given configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_client(config.client()?.shared()))
    }

    /// Create a provider from a provider block's attributes, with environment fallback
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, ConfigError> {
        Self::new(&ProviderConfig::from_attributes(attributes)?)
    }

    pub fn from_client(client: Arc<CombinedClient>) -> Self {
        Self {
            ctx: Context::new(client),
            resources: resources::all().into_iter().map(|r| (r.name(), r)).collect(),
            data_sources: data_sources::all()
                .into_iter()
                .map(|d| (d.config().resource_type, d))
                .collect(),
        }
    }

    /// Override the polling cadence of every waiter
    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.ctx.wait = wait;
        self
    }

    /// Token the host cancels to abort pending waits and rate-limit back-offs
    pub fn cancellation(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Names of every data source, sorted
    pub fn data_source_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data_sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn data_source_schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.data_sources.get(resource_type).map(|d| d.config().schema())
    }

    fn lifecycle(&self, resource_type: &str) -> ProviderResult<&Arc<dyn ResourceLifecycle>> {
        self.resources.get(resource_type).ok_or_else(|| {
            ProviderError::invalid(format!("unknown resource type '{resource_type}'"))
        })
    }

    fn validate(schema: &ResourceSchema, attributes: &Attributes) -> ProviderResult<()> {
        schema.validate(attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ProviderError::invalid(messages.join("; "))
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Observe a resource; unknown handles and vanished objects read as not found
    pub async fn read_resource(&self, id: &ResourceId, identifier: Option<&str>) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let lifecycle = self.lifecycle(&id.resource_type)?;
        match lifecycle.read(&self.ctx, id, identifier).await {
            Ok(state) => Ok(state),
            Err(e) if e.is_not_found() => {
                warn!("{id} ({identifier}) not found upstream, removing it from state");
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e).context(Operation::Reading, id, Some(identifier)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let lifecycle = self.lifecycle(&id.resource_type)?;
        let schema = lifecycle.schema();
        Self::validate(&schema, &resource.attributes).context(Operation::Creating, id, None)?;

        let desired = Resource {
            attributes: schema.normalize(&resource.attributes),
            ..resource.clone()
        };
        let state = lifecycle
            .create(&self.ctx, &desired)
            .await
            .context(Operation::Creating, id, None)?;
        info!(
            "Created {id} ({})",
            state.identifier.as_deref().unwrap_or_default()
        );
        Ok(state)
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let lifecycle = self.lifecycle(&id.resource_type)?;
        let schema = lifecycle.schema();
        Self::validate(&schema, &to.attributes).context(Operation::Updating, id, Some(identifier))?;

        let changes = ChangeSet::between(&schema, &from.attributes, &to.attributes);
        if changes.is_empty() {
            debug!("{id} ({identifier}) is up to date");
            return Ok(from.clone());
        }
        if changes.requires_replace() {
            return Err(ProviderError::invalid(format!(
                "changing {} requires replacing the resource",
                changes.replace_reasons().join(", ")
            )))
            .context(Operation::Updating, id, Some(identifier));
        }

        debug!("Updating {id} ({identifier}): {}", changes.changed().join(", "));
        let desired = Resource {
            attributes: schema.normalize(&to.attributes),
            ..to.clone()
        };
        match lifecycle
            .update(&self.ctx, id, identifier, from, &desired, &changes)
            .await
        {
            Ok(state) => Ok(state),
            Err(e) if e.is_not_found() => {
                warn!("{id} ({identifier}) disappeared during update");
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e).context(Operation::Updating, id, Some(identifier)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let lifecycle = self.lifecycle(&id.resource_type)?;
        match lifecycle.delete(&self.ctx, id, identifier).await {
            Ok(()) => {
                info!("Deleted {id} ({identifier})");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("{id} ({identifier}) was already gone");
                Ok(())
            }
            Err(e) => Err(e).context(Operation::Deleting, id, Some(identifier)),
        }
    }

    pub async fn import_resource(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let lifecycle = self.lifecycle(&id.resource_type)?;
        lifecycle
            .import(&self.ctx, id, import_id)
            .await
            .context(Operation::Importing, id, Some(import_id))
    }

    /// Evaluate a list data source: fetch, filter, sort
    pub async fn evaluate_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let source = self.data_sources.get(&id.resource_type).ok_or_else(|| {
            ProviderError::invalid(format!("unknown data source '{}'", id.resource_type))
        })?;
        let config = source.config();
        Self::validate(&config.schema(), &resource.attributes).context(Operation::Reading, id, None)?;

        let query = config
            .parse_query(&resource.attributes)
            .map_err(ProviderError::from)
            .context(Operation::Reading, id, None)?;
        let records = source
            .records(&self.ctx, &query.extra)
            .await
            .context(Operation::Listing, id, None)?;
        debug!("{id}: {} records before filtering", records.len());
        config.read(resource, records).context(Operation::Reading, id, None)
    }

    /// Schemas of every resource kind, for `Provider::resource_types`
    pub(crate) fn registered_types(&self) -> Vec<Box<dyn ResourceType>> {
        let mut types: Vec<Box<dyn ResourceType>> = self
            .resources
            .values()
            .map(|r| {
                Box::new(RegisteredType {
                    name: r.name(),
                    schema: r.schema(),
                }) as Box<dyn ResourceType>
            })
            .collect();
        types.sort_by_key(|t| t.name());
        types
    }
}

/// A resource kind as the host sees it
struct RegisteredType {
    name: &'static str,
    schema: ResourceSchema,
}

impl ResourceType for RegisteredType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }
}

#[cfg(test)]
mod tests {
    use doform_core::error::ErrorKind;
    use doform_core::resource::Value;

    use super::*;

    fn provider() -> DigitalOceanProvider {
        DigitalOceanProvider::new(&ProviderConfig::new("t"))
            .unwrap()
            .with_wait_config(WaitConfig::immediate())
    }

    #[tokio::test]
    async fn read_without_handle_is_not_found() {
        let id = ResourceId::new("digitalocean_tag", "web");
        let state = provider().read_resource(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn unknown_type_is_invalid() {
        let resource = Resource::new("digitalocean_spaceship", "x");
        let err = provider().create_resource(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn missing_required_attribute_fails_before_any_request() {
        let resource = Resource::new("digitalocean_tag", "web");
        let err = provider().create_resource(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
        assert_eq!(err.operation, Some(Operation::Creating));
        assert!(err.message.contains("name"), "{}", err.message);
    }

    #[tokio::test]
    async fn unchanged_update_returns_prior_state() {
        let id = ResourceId::new("digitalocean_tag", "web");
        let from = State::existing(id.clone(), Attributes::from([("name".to_string(), Value::from("web"))]))
            .with_identifier("web");
        let to = Resource::new("digitalocean_tag", "web").with_attribute("name", "web");
        let state = provider().update_resource(&id, "web", &from, &to).await.unwrap();
        assert_eq!(state, from);
    }

    #[tokio::test]
    async fn force_new_change_is_refused_by_update() {
        let id = ResourceId::new("digitalocean_tag", "web");
        let from = State::existing(id.clone(), Attributes::from([("name".to_string(), Value::from("web"))]))
            .with_identifier("web");
        let to = Resource::new("digitalocean_tag", "web").with_attribute("name", "api");
        let err = provider().update_resource(&id, "web", &from, &to).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
        assert!(err.message.contains("requires replacing"), "{}", err.message);
    }

    #[test]
    fn every_kind_is_registered() {
        let provider = provider();
        let types = provider.registered_types();
        assert!(types.iter().any(|t| t.name() == "digitalocean_droplet"));
        assert!(types.iter().any(|t| t.name() == "digitalocean_floating_ip"));
        assert!(provider.data_source_types().contains(&"digitalocean_sizes"));
        assert!(provider.data_source_schema("digitalocean_records").is_some());
    }
}
