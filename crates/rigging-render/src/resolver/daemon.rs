//! Config resolution through the daemon UI

use async_trait::async_trait;
use rigging_core::{ConfigValues, Release};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use super::{ConfigResolver, ResolvedConfig, validate};
use crate::daemon::{Daemon, StepPayload, UiAction, await_config_saved};
use crate::error::{RenderError, Result};
use crate::templates::render_builder;

/// Pushes the `render/config` step and waits for the user to save
pub struct DaemonResolver {
    daemon: Arc<dyn Daemon>,
    heartbeat: Duration,
    state_path: PathBuf,
}

impl DaemonResolver {
    pub fn new(daemon: Arc<dyn Daemon>, heartbeat: Duration, state_path: impl Into<PathBuf>) -> Self {
        Self {
            daemon,
            heartbeat,
            state_path: state_path.into(),
        }
    }
}

#[async_trait]
impl ConfigResolver for DaemonResolver {
    async fn resolve_config(
        &self,
        cancel: &CancellationToken,
        release: &Release,
        previous: &ConfigValues,
    ) -> Result<ResolvedConfig> {
        let span = info_span!("daemon_config", groups = release.config.len());

        async {
            self.daemon.ensure_started().await?;
            self.daemon
                .push_step(
                    StepPayload::Config {
                        groups: release.config.clone(),
                    },
                    vec![UiAction::SaveConfig],
                )
                .await?;

            let saved = await_config_saved(self.daemon.as_ref(), cancel, self.heartbeat).await?;
            info!(items = saved.len(), "config saved from UI");

            let mut values = previous.clone();
            values.extend(saved);

            let builder = render_builder(&release.config, &values, &release.metadata, &self.state_path)?;
            let errors = validate(&builder, &release.config, &values);

            Ok::<_, RenderError>(ResolvedConfig { values, errors })
        }
        .instrument(span)
        .await
    }
}
