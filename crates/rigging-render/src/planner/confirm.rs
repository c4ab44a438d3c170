//! Plan confirmation front ends

use async_trait::async_trait;
use console::{Term, style};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::plan::is_yes;
use crate::daemon::{Daemon, PlanEntry, StepPayload, UiAction, await_plan_confirmed};
use crate::error::{RenderError, Result};

/// Asks whether a built plan may run
#[async_trait]
pub trait PlanConfirmer: Send + Sync {
    /// `entries` lists the plan's steps in execution order
    async fn confirm_plan(&self, cancel: &CancellationToken, entries: &[PlanEntry]) -> Result<bool>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirmer;

fn prompt(entries: &[PlanEntry]) -> Result<bool> {
    let term = Term::stdout();
    term.write_line(&format!(
        "{}",
        style("This command will generate the following resources:").bold()
    ))?;
    for entry in entries {
        term.write_line(&format!("  {}", style(&entry.dest).cyan()))?;
        if !entry.description.is_empty() {
            term.write_line(&format!("      {}", style(&entry.description).dim()))?;
        }
    }
    term.write_str("Is this ok? [Y/n]: ")?;
    let answer = term.read_line()?;
    Ok(is_yes(&answer))
}

#[async_trait]
impl PlanConfirmer for TerminalConfirmer {
    async fn confirm_plan(&self, cancel: &CancellationToken, entries: &[PlanEntry]) -> Result<bool> {
        let entries = entries.to_vec();
        let answer = tokio::task::spawn_blocking(move || prompt(&entries));

        tokio::select! {
            _ = cancel.cancelled() => Err(RenderError::Cancelled),
            joined = answer => joined.map_err(|e| RenderError::Io(std::io::Error::other(e)))?,
        }
    }
}

/// Pushes the plan to the control plane and waits for the user's answer
pub struct DaemonConfirmer {
    daemon: Arc<dyn Daemon>,
    heartbeat: Duration,
}

impl DaemonConfirmer {
    pub fn new(daemon: Arc<dyn Daemon>, heartbeat: Duration) -> Self {
        Self { daemon, heartbeat }
    }
}

#[async_trait]
impl PlanConfirmer for DaemonConfirmer {
    async fn confirm_plan(&self, cancel: &CancellationToken, entries: &[PlanEntry]) -> Result<bool> {
        self.daemon.ensure_started().await?;
        self.daemon
            .push_step(
                StepPayload::Plan {
                    entries: entries.to_vec(),
                },
                vec![UiAction::ConfirmPlan, UiAction::RejectPlan],
            )
            .await?;
        await_plan_confirmed(self.daemon.as_ref(), cancel, self.heartbeat).await
    }
}
