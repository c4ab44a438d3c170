//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Release not found: {path}")]
    ReleaseNotFound { path: String },

    #[error("Invalid release: {message}")]
    InvalidRelease { message: String },

    #[error("Invalid asset: {message}")]
    InvalidAsset { message: String },

    #[error("Dependency cycle detected among: {}", nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State error: {message}")]
    State { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
