//! Rigging Render - the render pipeline
//!
//! This crate provides:
//! - **Config Resolvers**: Headless (dependency-ordered) and daemon-mediated config resolution
//! - **Planner**: Turns assets into an ordered plan of steps and executes it
//! - **Image Saver**: Registry pulls with vendor credential fallback, layer extraction
//! - **Progress**: Bounded progress channel with terminal and tracing sinks
//! - **Daemon Protocol**: Confirmation handshake with a control plane, plus an in-process one
//! - **Render Step**: The full pass from state load to plan execution

pub mod daemon;
pub mod error;
pub mod images;
pub mod options;
pub mod planner;
pub mod progress;
pub mod render;
pub mod resolver;
pub mod templates;

pub use daemon::{
    ControlPlane, CurrentStep, Daemon, DaemonExit, ExitSignal, PlanEntry, StepPayload, UiAction,
};
pub use error::{RenderError, Result, ResultExt};
pub use images::{ImageSaver, ProgressStream, RegistryAuth, RegistryClient};
pub use options::RenderOptions;
pub use planner::{
    ChartFetcher, ChartSource, DaemonConfirmer, GitHubFetcher, GitHubRequest,
    HelmTemplateRequest, HelmTemplater, Plan, PlanConfirmer, Planner, Step, TerminalConfirmer,
};
pub use progress::{CollectingSink, Progress, ProgressSink, TerminalSink, TracingSink};
pub use render::{RenderOutcome, RenderStep};
pub use resolver::{ConfigResolver, DaemonResolver, HeadlessResolver, ResolvedConfig, ValidationError};
