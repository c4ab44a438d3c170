//! The `render` lifecycle step
//!
//! One pass: load state, resolve config, persist it, build the plan,
//! optionally confirm it, back up the install root, then execute.

use rigging_core::{Release, StateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use walkdir::WalkDir;

use crate::error::{RenderError, Result, ResultExt};
use crate::options::RenderOptions;
use crate::planner::{PlanConfirmer, Planner, TerminalConfirmer, execute};
use crate::resolver::{ConfigResolver, persistable_values};
use crate::templates::render_builder;

/// How a render pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Every step ran
    Rendered { steps: usize },
    /// The user declined the plan; nothing was written
    Declined,
}

pub struct RenderStep {
    options: RenderOptions,
    state: Arc<dyn StateStore>,
    resolver: Arc<dyn ConfigResolver>,
    planner: Planner,
    confirmer: Option<Arc<dyn PlanConfirmer>>,
    span: Span,
}

impl RenderStep {
    pub fn new(
        options: RenderOptions,
        state: Arc<dyn StateStore>,
        resolver: Arc<dyn ConfigResolver>,
        planner: Planner,
    ) -> Self {
        Self {
            options,
            state,
            resolver,
            planner,
            confirmer: None,
            span: Span::current(),
        }
    }

    /// Parent span for every pass; defaults to the span current at construction
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Confirmer used when the release asks for confirmation
    ///
    /// Without one, the prompt goes to the terminal.
    pub fn with_confirmer(mut self, confirmer: Arc<dyn PlanConfirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    /// Directory assets are written under
    pub fn root(&self, release: &Release) -> PathBuf {
        match release.render_step() {
            Some(spec) if !spec.root.is_empty() => self.options.root_path(&spec.root),
            _ => self.options.install_root.clone(),
        }
    }

    pub async fn run(&self, cancel: &CancellationToken, release: &Release) -> Result<RenderOutcome> {
        let span = info_span!(
            parent: &self.span,
            "render",
            app = %release.metadata.app_slug,
            release = %release.metadata.release_id,
        );
        self.run_pass(cancel, release).instrument(span).await
    }

    async fn run_pass(&self, cancel: &CancellationToken, release: &Release) -> Result<RenderOutcome> {
        let previous = self.state.try_load().await.context("load state")?.v1.config;

        let resolved = self
            .resolver
            .resolve_config(cancel, release, &previous)
            .await
            .context("resolve config")?;
        let values = resolved.into_values()?;

        let builder = render_builder(
            &release.config,
            &values,
            &release.metadata,
            &self.options.state_path(),
        )?;
        let persisted = persistable_values(&builder, &release.config, &values, &previous);
        self.state
            .serialize(&release.assets, &release.metadata, &persisted)
            .await
            .context("save state")?;
        debug!(persisted = persisted.len(), "config persisted");

        let root = self.root(release);
        let plan = self
            .planner
            .build(&root, &release.assets, &release.config, &release.metadata, &values)
            .context("build plan")?;

        if release.render_step().is_some_and(|spec| spec.confirm) {
            let entries = plan.entries();
            let approved = match &self.confirmer {
                Some(confirmer) => confirmer.confirm_plan(cancel, &entries).await,
                None => TerminalConfirmer.confirm_plan(cancel, &entries).await,
            }
            .context("confirm plan")?;

            if !approved {
                info!("plan declined");
                return Ok(RenderOutcome::Declined);
            }
        }

        if self.options.backup {
            backup_root(&root).await.context("back up install root")?;
        }

        let steps = plan.len();
        execute(cancel, plan).await.context("execute plan")?;

        info!(steps, root = %root.display(), "render complete");
        Ok(RenderOutcome::Rendered { steps })
    }
}

/// Copy `root` to `<root>.bak`, replacing any previous backup
///
/// A missing root has nothing to back up.
pub async fn backup_root(root: &Path) -> Result<Option<PathBuf>> {
    if !tokio::fs::try_exists(root).await? {
        return Ok(None);
    }

    let root = tokio::fs::canonicalize(root).await?;
    let mut name = root.as_os_str().to_owned();
    name.push(".bak");
    let backup = PathBuf::from(name);

    if tokio::fs::try_exists(&backup).await? {
        tokio::fs::remove_dir_all(&backup).await?;
    }

    let target = backup.clone();
    tokio::task::spawn_blocking(move || copy_tree(&root, &target))
        .await
        .map_err(|e| RenderError::Io(std::io::Error::other(e)))??;

    info!(backup = %backup.display(), "install root backed up");
    Ok(Some(backup))
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        } else {
            warn!(path = %entry.path().display(), "skipping special file during backup");
        }
    }
    Ok(())
}
