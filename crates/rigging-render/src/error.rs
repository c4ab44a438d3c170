//! Error types for rigging-render

use rigging_core::CoreError;
use rigging_engine::EngineError;
use thiserror::Error;

use crate::resolver::ValidationError;

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors that can occur during a render pass
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// Required config values are missing
    #[error("config validation failed: {}", join_validation(.errors))]
    Validation { errors: Vec<ValidationError> },

    /// No step builder is wired for this asset kind
    #[error("unknown asset type: {kind}")]
    UnknownAssetType { kind: String },

    /// A plan step failed; the remaining steps were not run
    #[error("step '{description}' ({dest}) failed: {source}")]
    Step {
        dest: String,
        description: String,
        #[source]
        source: Box<RenderError>,
    },

    /// Image save failed with both credential pairs
    #[error("saving image {image} failed with both auth methods: {source}")]
    BothAuthMethodsFailed {
        image: String,
        #[source]
        source: Box<RenderError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// Control plane stopped before the awaited confirmation
    #[error("daemon exited: {message}")]
    DaemonExited { message: String },

    /// Control plane rejected a UI action
    #[error("daemon error: {message}")]
    Daemon { message: String },

    /// Asset destination resolves outside the render root
    #[error("invalid destination '{dest}': must stay inside the render root")]
    InvalidDestination { dest: String },

    /// Error annotated with the pipeline stage it came from
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RenderError>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// HTTP request failed or returned a non-success status
    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },

    /// Container registry error
    #[error("registry error: {message}")]
    Registry { message: String },

    /// Image or layer archive could not be unpacked
    #[error("archive error: {message}")]
    Archive { message: String },

    /// Helm or GitHub collaborator failed
    #[error("upstream fetch failed: {message}")]
    Upstream { message: String },

    #[error("invalid render options: {0}")]
    InvalidOptions(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RenderError {
    /// Wrap with the pipeline stage it happened in
    pub fn context(self, context: impl Into<String>) -> Self {
        RenderError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the root cause is cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            RenderError::Cancelled => true,
            RenderError::Step { source, .. }
            | RenderError::BothAuthMethodsFailed { source, .. }
            | RenderError::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Attach stage context to a fallible result
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T, E: Into<RenderError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(e: serde_json::Error) -> Self {
        RenderError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for RenderError {
    fn from(e: serde_yaml::Error) -> Self {
        RenderError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        RenderError::Http { url, message }
    }
}
