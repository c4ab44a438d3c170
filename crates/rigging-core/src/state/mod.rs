//! Persisted render state
//!
//! State is a small key-value document kept between render passes:
//! - **File** (default): a JSON document at a caller-supplied path
//! - **Memory**: in-process, for tests and dry runs
//!
//! Loading never fails just because nothing was persisted yet; a missing
//! document loads as empty state.

mod file;
mod memory;

pub use file::FileStateStore;
pub use memory::{MemoryStateStore, OperationCounts};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ConfigValues;
use crate::asset::Asset;
use crate::error::Result;
use crate::release::ReleaseMetadata;

/// Versioned state document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct State {
    #[serde(default)]
    pub v1: StateV1,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateV1 {
    /// Persist-worthy config values
    #[serde(default)]
    pub config: ConfigValues,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<StoredRelease>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<StoredAsset>,
}

/// Release identity recorded with the state (credentials are never stored)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRelease {
    pub release_id: String,
    pub customer_id: String,
    pub channel_name: String,
    pub semver: String,
}

impl From<&ReleaseMetadata> for StoredRelease {
    fn from(meta: &ReleaseMetadata) -> Self {
        Self {
            release_id: meta.release_id.clone(),
            customer_id: meta.customer_id.clone(),
            channel_name: meta.channel_name.clone(),
            semver: meta.semver.clone(),
        }
    }
}

/// Summary of an asset produced by the last render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAsset {
    pub kind: String,
    pub dest: String,
}

impl From<&Asset> for StoredAsset {
    fn from(asset: &Asset) -> Self {
        Self {
            kind: asset.kind().key().to_string(),
            dest: asset.dest().to_string(),
        }
    }
}

impl State {
    /// Build the document persisted after a render pass
    pub fn from_render(assets: &[Asset], metadata: &ReleaseMetadata, values: &ConfigValues) -> Self {
        Self {
            v1: StateV1 {
                config: values.clone(),
                release: Some(StoredRelease::from(metadata)),
                assets: assets.iter().map(StoredAsset::from).collect(),
            },
        }
    }

    pub fn config(&self) -> &ConfigValues {
        &self.v1.config
    }

    /// Kinds of assets recorded by the last render
    pub fn asset_kinds(&self) -> Vec<&str> {
        self.v1.assets.iter().map(|a| a.kind.as_str()).collect()
    }
}

/// Load/save service for render state
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load state; an absent document yields empty state
    async fn try_load(&self) -> Result<State>;

    /// Persist the outcome of a render pass
    async fn serialize(
        &self,
        assets: &[Asset],
        metadata: &ReleaseMetadata,
        values: &ConfigValues,
    ) -> Result<()>;

    /// Previously persisted config values
    async fn load_config(&self) -> Result<ConfigValues> {
        Ok(self.try_load().await?.v1.config)
    }
}
