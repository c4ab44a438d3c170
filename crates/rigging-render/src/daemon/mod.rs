//! Daemon confirmation protocol
//!
//! Interactive render passes hand decisions to a control plane: the render
//! flow pushes a step payload, then waits until the user confirms, the
//! control plane exits, or the pass is cancelled. There is no maximum wait;
//! a heartbeat logs that the wait is still pending.

mod control_plane;

pub use control_plane::{ControlPlane, CurrentStep};

use async_trait::async_trait;
use rigging_core::{ConfigGroup, ConfigValues};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RenderError, Result};
use crate::progress::Progress;

/// Why the control plane stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonExit {
    /// Error the control plane stopped with, if any
    pub error: Option<String>,
}

impl DaemonExit {
    fn into_error(self) -> RenderError {
        RenderError::DaemonExited {
            message: self.error.unwrap_or_else(|| "daemon exited".to_string()),
        }
    }
}

/// Exit signal; `None` while the control plane runs
pub type ExitSignal = watch::Receiver<Option<DaemonExit>>;

/// One line of a plan as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub dest: String,
    pub description: String,
}

/// Typed payload of a pushed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StepPayload {
    /// `render/config`: collect config values
    Config { groups: Vec<ConfigGroup> },
    /// Show a message and wait for acknowledgement
    Message { contents: String, level: String },
    /// Show the plan and wait for a yes/no
    Plan { entries: Vec<PlanEntry> },
    /// Render in progress; carries the latest progress update
    Render { progress: Option<Progress> },
}

impl StepPayload {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "render/config",
            Self::Message { .. } => "message",
            Self::Plan { .. } => "render/plan",
            Self::Render { .. } => "render",
        }
    }
}

/// Action the UI may offer for the current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiAction {
    SaveConfig,
    ConfirmMessage,
    ConfirmPlan,
    RejectPlan,
}

/// Control-plane contract used by the render flow
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Start the control plane if needed; every call returns the same exit signal
    async fn ensure_started(&self) -> Result<ExitSignal>;

    /// Make `step` the current step
    async fn push_step(&self, step: StepPayload, actions: Vec<UiAction>) -> Result<()>;

    /// Next submitted config; `None` once the control plane is gone
    async fn recv_config_saved(&self) -> Option<ConfigValues>;

    async fn recv_message_confirmed(&self) -> Option<()>;

    /// Next plan answer; `None` once the control plane is gone
    async fn recv_plan_confirmed(&self) -> Option<bool>;
}

/// Wait for `confirmation` against cancellation, daemon exit and a heartbeat
async fn await_confirmation<T, F>(
    daemon: &dyn Daemon,
    cancel: &CancellationToken,
    heartbeat: Duration,
    waiting_for: &str,
    confirmation: F,
) -> Result<T>
where
    F: Future<Output = Option<T>>,
{
    let mut exit = daemon.ensure_started().await?;
    if let Some(exited) = exit.borrow_and_update().clone() {
        return Err(exited.into_error());
    }

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    tokio::pin!(confirmation);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RenderError::Cancelled),

            changed = exit.changed() => {
                if changed.is_err() {
                    return Err(DaemonExit { error: None }.into_error());
                }
                if let Some(exited) = exit.borrow_and_update().clone() {
                    return Err(exited.into_error());
                }
            }

            received = &mut confirmation => {
                return received.ok_or_else(|| DaemonExit { error: None }.into_error());
            }

            _ = ticker.tick() => {
                debug!(waiting_for, "still waiting for daemon");
            }
        }
    }
}

/// Wait for the user to acknowledge the current message
pub async fn await_message_confirmed(
    daemon: &dyn Daemon,
    cancel: &CancellationToken,
    heartbeat: Duration,
) -> Result<()> {
    await_confirmation(
        daemon,
        cancel,
        heartbeat,
        "message confirmation",
        daemon.recv_message_confirmed(),
    )
    .await
}

/// Wait for the user's answer to the current plan
pub async fn await_plan_confirmed(
    daemon: &dyn Daemon,
    cancel: &CancellationToken,
    heartbeat: Duration,
) -> Result<bool> {
    await_confirmation(
        daemon,
        cancel,
        heartbeat,
        "plan confirmation",
        daemon.recv_plan_confirmed(),
    )
    .await
}

/// Wait for the user to submit config values
pub async fn await_config_saved(
    daemon: &dyn Daemon,
    cancel: &CancellationToken,
    heartbeat: Duration,
) -> Result<ConfigValues> {
    await_confirmation(
        daemon,
        cancel,
        heartbeat,
        "config",
        daemon.recv_config_saved(),
    )
    .await
}
