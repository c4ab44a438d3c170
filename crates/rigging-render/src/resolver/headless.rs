//! Headless config resolution
//!
//! Items are evaluated in dependency order: each batch of head nodes is
//! rendered against a config context holding every value resolved so far.
//! Values from previous state win over template evaluation.

use async_trait::async_trait;
use rigging_core::{ConfigItem, ConfigValues, DependencyGraph, Release};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ConfigResolver, ResolvedConfig, validate};
use crate::error::{RenderError, Result};
use crate::templates::render_builder;

/// Resolves config from templates and previous state, without a UI
#[derive(Debug, Clone)]
pub struct HeadlessResolver {
    state_path: PathBuf,
}

impl HeadlessResolver {
    /// `state_path` is what `StateFilePath()` reports to templates
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }
}

#[async_trait]
impl ConfigResolver for HeadlessResolver {
    async fn resolve_config(
        &self,
        cancel: &CancellationToken,
        release: &Release,
        previous: &ConfigValues,
    ) -> Result<ResolvedConfig> {
        let groups = &release.config;
        if rigging_core::config::item_count(groups) == 0 {
            debug!("release declares no config items, keeping previous values");
            return Ok(ResolvedConfig {
                values: previous.clone(),
                errors: Vec::new(),
            });
        }

        let items: BTreeMap<&str, &ConfigItem> = rigging_core::config::all_items(groups)
            .map(|item| (item.name.as_str(), item))
            .collect();

        let mut graph = DependencyGraph::from_config_groups(groups);
        let mut resolved = ConfigValues::new();

        while !graph.is_empty() {
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }

            let heads = graph.head_nodes()?;
            let builder = render_builder(groups, &resolved, &release.metadata, &self.state_path)?;

            for name in &heads {
                let Some(item) = items.get(name.as_str()) else {
                    graph.resolve(name);
                    continue;
                };

                let value = match previous.get(name) {
                    Some(previous) => previous.clone(),
                    None => {
                        let template = if item.value.is_empty() {
                            &item.default
                        } else {
                            &item.value
                        };
                        builder.render_string(template)?
                    }
                };

                trace!(item = %name, value = %value, "resolved config item");
                resolved.insert(name.clone(), value);
            }

            for name in &heads {
                graph.resolve(name);
            }
        }

        let builder = render_builder(groups, &resolved, &release.metadata, &self.state_path)?;
        let errors = validate(&builder, groups, &resolved);
        debug!(
            items = resolved.len(),
            errors = errors.len(),
            "headless config resolved"
        );

        Ok(ResolvedConfig {
            values: resolved,
            errors,
        })
    }
}
