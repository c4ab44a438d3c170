//! File-based state store
//!
//! Stores the state document as pretty JSON at a single path. The path is
//! supplied by the caller; nothing here reads global configuration.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{State, StateStore};
use crate::ConfigValues;
use crate::asset::Asset;
use crate::error::{CoreError, Result};
use crate::release::ReleaseMetadata;

/// JSON file state store
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_state(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(state)?;

        // Write then rename so readers never observe a half-written document
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), "wrote state");
        Ok(())
    }

    fn read_state(&self) -> Result<State> {
        let data = std::fs::read(&self.path)?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(State::default());
        }
        serde_json::from_slice(&data).map_err(|e| CoreError::State {
            message: format!("corrupt state file {}: {}", self.path.display(), e),
        })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn try_load(&self) -> Result<State> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no state file, starting empty");
            return Ok(State::default());
        }
        self.read_state()
    }

    async fn serialize(
        &self,
        assets: &[Asset],
        metadata: &ReleaseMetadata,
        values: &ConfigValues,
    ) -> Result<()> {
        self.write_state(&State::from_render(assets, metadata, values))
    }
}
