//! Long-running upstream actions
//!
//! Resizes, migrations, IP assignments and volume attachments answer with an
//! action record that moves from `new`/`in-progress` to `completed` or
//! `errored`. Freshly created actions may 404 for a while.

use std::time::Duration;

use doform_core::provider::{ProviderError, ProviderResult};
use doform_core::waiter::{Poll, StateWaiter, WaitConfig};
use log::info;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;

pub const ACTION_PENDING: &[&str] = &["new", "in-progress"];
pub const ACTION_COMPLETED: &[&str] = &["completed"];
pub const ACTION_ERRORED: &str = "errored";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Action {
    pub id: u64,
    pub status: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub resource_id: Option<u64>,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

impl ApiClient {
    pub async fn get_action(&self, id: u64) -> ProviderResult<Action> {
        let envelope: ActionEnvelope = self.get(&format!("v2/actions/{id}")).await?;
        Ok(envelope.action)
    }

    /// Issue an action (e.g. `POST v2/droplets/1/actions`) and return the action record
    pub async fn post_action<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<Action> {
        let envelope: ActionEnvelope = self.post(path, body).await?;
        info!("Started action {} ({})", envelope.action.id, envelope.action.action_type);
        Ok(envelope.action)
    }
}

/// Poll an action until it completes.
///
/// An `errored` action fails immediately; a not-found action is tolerated for
/// `config.not_found_checks` consecutive polls.
pub async fn wait_for_action(
    api: &ApiClient,
    action: &Action,
    timeout: Duration,
    config: WaitConfig,
    cancel: &CancellationToken,
) -> ProviderResult<Action> {
    let id = action.id;
    let action_type = action.action_type.clone();
    let waiter = StateWaiter::new(
        format!("action {id} ({action_type}) to complete"),
        ACTION_PENDING,
        ACTION_COMPLETED,
        timeout,
        config,
        cancel.clone(),
    );
    let done = waiter
        .wait(|| async move {
            let action = api.get_action(id).await?;
            if action.status == ACTION_ERRORED {
                return Err(ProviderError::new(format!(
                    "action {} ({}) errored",
                    action.id, action.action_type
                )));
            }
            let status = action.status.clone();
            Ok(Poll::Status(action, status))
        })
        .await?;
    info!("Action {} ({}) completed", done.id, done.action_type);
    Ok(done)
}
