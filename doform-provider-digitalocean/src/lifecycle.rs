//! Per-resource lifecycle contracts
//!
//! Every managed resource kind implements [`ResourceLifecycle`]; every list
//! data source implements [`DataSource`] on top of the data-list engine. The
//! provider owns the dispatch and the not-found policy, so implementations
//! simply propagate upstream errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doform_core::datalist::DataListConfig;
use doform_core::differ::ChangeSet;
use doform_core::provider::ProviderResult;
use doform_core::resource::{Attributes, Resource, ResourceId, State};
use doform_core::schema::ResourceSchema;
use doform_core::waiter::{StateWaiter, WaitConfig};
use tokio_util::sync::CancellationToken;

use crate::actions::{Action, wait_for_action};
use crate::client::ApiClient;
use crate::config::CombinedClient;
use crate::spaces::SpacesSessions;

/// Everything a lifecycle operation needs from its provider
#[derive(Debug, Clone)]
pub struct Context {
    pub client: Arc<CombinedClient>,
    pub wait: WaitConfig,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(client: Arc<CombinedClient>) -> Self {
        let cancel = client.api().cancellation().clone();
        Self {
            client,
            wait: WaitConfig::default(),
            cancel,
        }
    }

    pub fn api(&self) -> &ApiClient {
        self.client.api()
    }

    pub fn spaces(&self) -> &SpacesSessions {
        self.client.spaces()
    }

    /// Wait for an action issued by this operation
    pub async fn wait_for_action(&self, action: &Action, timeout: Duration) -> ProviderResult<Action> {
        wait_for_action(self.api(), action, timeout, self.wait, &self.cancel).await
    }

    /// Waiter on a resource status field, sharing this context's cadence and cancellation
    pub fn waiter<'a>(
        &self,
        description: impl Into<String>,
        pending: &'a [&'a str],
        target: &'a [&'a str],
        timeout: Duration,
    ) -> StateWaiter<'a> {
        StateWaiter::new(
            description,
            pending,
            target,
            timeout,
            self.wait,
            self.cancel.clone(),
        )
    }
}

/// Create/Read/Update/Delete/Import for one resource kind
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Resource type name (e.g., "digitalocean_droplet")
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create the upstream object and return its observed state with the handle set
    async fn create(&self, ctx: &Context, resource: &Resource) -> ProviderResult<State>;

    /// Observe the upstream object behind `identifier`
    async fn read(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<State>;

    /// Apply `changes` (never empty) to the upstream object
    async fn update(
        &self,
        ctx: &Context,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        changes: &ChangeSet,
    ) -> ProviderResult<State>;

    async fn delete(&self, ctx: &Context, id: &ResourceId, identifier: &str) -> ProviderResult<()>;

    /// Adopt an existing object; by default the import ID is the handle
    async fn import(&self, ctx: &Context, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        self.read(ctx, id, import_id).await
    }
}

/// A list data source: the engine configuration plus a record source
#[async_trait]
pub trait DataSource: Send + Sync {
    fn config(&self) -> DataListConfig;

    /// Fetch every record, flattened against the record schema.
    ///
    /// `extra` holds the extra query fields the user set (e.g. `domain`).
    async fn records(&self, ctx: &Context, extra: &Attributes) -> ProviderResult<Vec<Attributes>>;
}
