//! In-process control plane
//!
//! Holds the step the UI should show and relays the user's answers back to
//! the waiting render flow. A transport (HTTP server, test harness) drives
//! the UI-side methods.

use async_trait::async_trait;
use rigging_core::ConfigValues;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::{Daemon, DaemonExit, ExitSignal, StepPayload, UiAction};
use crate::error::{RenderError, Result};
use crate::progress::{Progress, ProgressSink};

/// Step currently shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStep {
    pub payload: StepPayload,
    pub actions: Vec<UiAction>,
}

#[derive(Debug, Default)]
struct PlaneState {
    current: Option<CurrentStep>,
    past_steps: Vec<StepPayload>,
    config: ConfigValues,
}

/// Receiving halves, taken by the render flow
struct Inbox<T> {
    tx: mpsc::Sender<T>,
    rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
}

impl<T> Inbox<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    fn offer(&self, value: T, what: &str) -> Result<()> {
        self.tx.try_send(value).map_err(|e| RenderError::Daemon {
            message: match e {
                mpsc::error::TrySendError::Full(_) => format!("{} already pending", what),
                mpsc::error::TrySendError::Closed(_) => format!("{} channel closed", what),
            },
        })
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Drop an answer nobody waited for
    ///
    /// A receiver that is already waiting holds the lock and has nothing
    /// buffered.
    fn clear(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

/// In-process implementation of [`Daemon`]
pub struct ControlPlane {
    state: Mutex<PlaneState>,
    started: AtomicBool,
    exit: watch::Sender<Option<DaemonExit>>,
    config_saved: Inbox<ConfigValues>,
    message_confirmed: Inbox<()>,
    plan_confirmed: Inbox<bool>,
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane {
    pub fn new() -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            state: Mutex::new(PlaneState::default()),
            started: AtomicBool::new(false),
            exit,
            config_saved: Inbox::new(),
            message_confirmed: Inbox::new(),
            plan_confirmed: Inbox::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PlaneState>> {
        self.state.lock().map_err(|_| RenderError::Daemon {
            message: "control plane state poisoned".to_string(),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        match self.exit.borrow().as_ref() {
            Some(exit) => Err(RenderError::DaemonExited {
                message: exit.error.clone().unwrap_or_else(|| "daemon exited".to_string()),
            }),
            None => Ok(()),
        }
    }

    fn expect_action(&self, action: UiAction) -> Result<()> {
        self.ensure_running()?;
        let state = self.lock()?;
        match &state.current {
            Some(step) if step.actions.contains(&action) => Ok(()),
            Some(step) => Err(RenderError::Daemon {
                message: format!("step {} does not accept {:?}", step.payload.name(), action),
            }),
            None => Err(RenderError::Daemon {
                message: "no step is active".to_string(),
            }),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn current_step(&self) -> Option<CurrentStep> {
        self.lock().ok().and_then(|s| s.current.clone())
    }

    pub fn past_steps(&self) -> Vec<StepPayload> {
        self.lock().map(|s| s.past_steps.clone()).unwrap_or_default()
    }

    /// Last config the user saved
    pub fn current_config(&self) -> ConfigValues {
        self.lock().map(|s| s.config.clone()).unwrap_or_default()
    }

    /// UI: submit config values for the current `render/config` step
    pub fn save_config(&self, values: ConfigValues) -> Result<()> {
        self.expect_action(UiAction::SaveConfig)?;
        self.config_saved.offer(values.clone(), "config")?;
        self.lock()?.config = values;
        Ok(())
    }

    /// UI: acknowledge the current message
    pub fn confirm_message(&self) -> Result<()> {
        self.expect_action(UiAction::ConfirmMessage)?;
        self.message_confirmed.offer((), "message confirmation")
    }

    /// UI: answer the current plan
    pub fn confirm_plan(&self, approved: bool) -> Result<()> {
        let action = if approved {
            UiAction::ConfirmPlan
        } else {
            UiAction::RejectPlan
        };
        self.expect_action(action)?;
        self.plan_confirmed.offer(approved, "plan confirmation")
    }

    /// Stop the control plane; pending waits fail with `error` or a generic exit
    pub fn shutdown(&self, error: Option<String>) {
        info!(error = ?error, "control plane shutting down");
        self.exit.send_replace(Some(DaemonExit { error }));
    }

    /// Publish render progress on the current `render` step; best effort
    pub fn set_progress(&self, progress: Progress) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(CurrentStep {
            payload: StepPayload::Render { progress: slot },
            ..
        }) = state.current.as_mut()
        {
            *slot = Some(progress);
        }
    }
}

#[async_trait]
impl Daemon for ControlPlane {
    async fn ensure_started(&self) -> Result<ExitSignal> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("control plane started");
        }
        Ok(self.exit.subscribe())
    }

    async fn push_step(&self, step: StepPayload, actions: Vec<UiAction>) -> Result<()> {
        self.ensure_running()?;
        debug!(step = step.name(), ?actions, "pushing step");
        self.config_saved.clear();
        self.message_confirmed.clear();
        self.plan_confirmed.clear();

        let mut state = self.lock()?;
        if let Some(previous) = state.current.take() {
            state.past_steps.push(previous.payload);
        }
        state.current = Some(CurrentStep {
            payload: step,
            actions,
        });
        Ok(())
    }

    async fn recv_config_saved(&self) -> Option<ConfigValues> {
        self.config_saved.recv().await
    }

    async fn recv_message_confirmed(&self) -> Option<()> {
        self.message_confirmed.recv().await
    }

    async fn recv_plan_confirmed(&self) -> Option<bool> {
        self.plan_confirmed.recv().await
    }
}

#[async_trait]
impl ProgressSink for ControlPlane {
    async fn drain(&self, mut rx: mpsc::Receiver<Progress>) {
        while let Some(progress) = rx.recv().await {
            self.set_progress(progress);
        }
    }
}
