//! Rigging Core - Core types for rendering third-party releases
//!
//! This crate provides the foundational types used throughout Rigging:
//! - `Release`: Config schema, assets and installation metadata
//! - `ConfigGroup` / `ConfigItem`: The config schema operators fill in
//! - `Asset`: One artifact to produce (inline file, image, chart, ...)
//! - `DependencyGraph`: Orders config items that reference each other
//! - `StateStore`: Persisted config values between render passes

pub mod asset;
pub mod config;
pub mod error;
pub mod graph;
pub mod release;
pub mod state;

use std::collections::BTreeMap;

/// Resolved config values keyed by item name
pub type ConfigValues = BTreeMap<String, String>;

pub use asset::{Asset, AssetKind, AssetShared, FileMode, ImageSource};
pub use config::{ConfigChildItem, ConfigGroup, ConfigItem, ItemType};
pub use error::{CoreError, Result};
pub use graph::DependencyGraph;
pub use release::{ImageRewrite, LifecycleStep, Release, ReleaseMetadata, RenderStepSpec};
pub use state::{FileStateStore, MemoryStateStore, State, StateStore};
