//! Template builder for a render pass

use rigging_core::{ConfigGroup, ConfigValues, ReleaseMetadata};
use rigging_engine::{Builder, ConfigContext, InstallationContext, StaticContext};
use std::path::Path;

use crate::error::Result;

/// Builder with the static, installation and config contexts, in that order
pub fn render_builder(
    groups: &[ConfigGroup],
    values: &ConfigValues,
    metadata: &ReleaseMetadata,
    state_path: &Path,
) -> Result<Builder> {
    let builder = Builder::chain()
        .with(StaticContext::new())
        .with(InstallationContext::new(
            metadata,
            state_path.to_string_lossy(),
        ))
        .with(ConfigContext::new(groups, values.clone()))
        .build()?;
    Ok(builder)
}
