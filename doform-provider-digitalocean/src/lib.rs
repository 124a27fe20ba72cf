//! doform DigitalOcean provider
//!
//! Manages DigitalOcean resources through the public REST API and Spaces
//! through its S3-compatible API.
//!
//! ## Module Structure
//!
//! - `config` - Provider settings, environment fallback and client assembly
//! - `client` / `pagination` / `actions` - REST transport, page walking, action polling
//! - `spaces` - Region-keyed S3 sessions for buckets, policies and objects
//! - `lifecycle` - Per-kind lifecycle and data-source contracts
//! - `resources` - One lifecycle per `digitalocean_*` resource kind
//! - `data_sources` - List data sources on the shared filter/sort engine
//! - `provider` - DigitalOceanProvider dispatch and not-found policy

pub mod actions;
pub mod certificates;
pub mod client;
pub mod config;
pub mod data_sources;
pub mod lifecycle;
pub mod normalize;
pub mod pagination;
pub mod projects;
pub mod provider;
pub mod resources;
pub mod spaces;
pub mod wire;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use provider::DigitalOceanProvider;

use doform_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use doform_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for DigitalOceanProvider {
    fn name(&self) -> &'static str {
        "digitalocean"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        self.registered_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.evaluate_data_source(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let import_id = import_id.to_string();
        Box::pin(async move { self.import_resource(&id, &import_id).await })
    }
}
