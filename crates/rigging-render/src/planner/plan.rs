//! Plans and their execution

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io::{BufRead, Write};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::daemon::PlanEntry;
use crate::error::{RenderError, Result};

/// Deferred work of one step, run at most once
pub type StepAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// One executable unit, bound to one asset
pub struct Step {
    pub dest: String,
    pub description: String,
    action: StepAction,
}

impl Step {
    pub fn new<F, Fut>(dest: impl Into<String>, description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            dest: dest.into(),
            description: description.into(),
            action: Box::new(move || action().boxed()),
        }
    }

    pub fn entry(&self) -> PlanEntry {
        PlanEntry {
            dest: self.dest.clone(),
            description: self.description.clone(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("dest", &self.dest)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Ordered steps of one render pass
#[derive(Debug, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Destination and description of every step, for display
    pub fn entries(&self) -> Vec<PlanEntry> {
        self.steps.iter().map(Step::entry).collect()
    }

    /// Human-readable listing
    pub fn display(&self) -> String {
        let mut lines = vec![format!("Plan: {} steps", self.steps.len())];
        for step in &self.steps {
            lines.push(format!("  - {}: {}", step.dest, step.description));
        }
        lines.join("\n")
    }
}

/// Run every step in order, stopping at the first failure
///
/// Cancellation drops the in-flight step's future.
pub async fn execute(cancel: &CancellationToken, plan: Plan) -> Result<()> {
    let total = plan.steps.len();

    for (index, step) in plan.steps.into_iter().enumerate() {
        let Step {
            dest,
            description,
            action,
        } = step;
        info!(step = index + 1, total, dest = %dest, "executing step");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RenderError::Cancelled),
            result = action() => result,
        };

        if let Err(source) = result {
            return Err(RenderError::Step {
                dest,
                description,
                source: Box::new(source),
            });
        }
        debug!(dest = %dest, "step complete");
    }

    Ok(())
}

/// List the plan on `output` and ask for confirmation on `input`
///
/// An empty answer, `y` or `yes` confirms; anything else declines.
pub fn confirm(plan: &Plan, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    confirm_entries(&plan.entries(), input, output)
}

pub(crate) fn confirm_entries(
    entries: &[PlanEntry],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool> {
    writeln!(output, "This command will generate the following resources:")?;
    for entry in entries {
        writeln!(output, "  {}", entry.dest)?;
        if !entry.description.is_empty() {
            writeln!(output, "      {}", entry.description)?;
        }
    }
    write!(output, "Is this ok? [Y/n]: ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}
