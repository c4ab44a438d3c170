//! Release types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::asset::Asset;
use crate::config::{ConfigGroup, all_items};
use crate::error::{CoreError, Result};

/// Registry rewrite entry for one image
///
/// Images matching `url` are pulled from the vendor registry as
/// `<registry>/<app_slug>/<image_key>:<tag>` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRewrite {
    /// Image reference as written in the asset
    pub url: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub app_slug: String,

    #[serde(default)]
    pub image_key: String,
}

/// Installation-identifying context for a render pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    #[serde(default)]
    pub release_id: String,

    #[serde(default)]
    pub customer_id: String,

    #[serde(default)]
    pub installation_id: String,

    #[serde(default)]
    pub registry_secret: String,

    #[serde(default)]
    pub channel_name: String,

    #[serde(default)]
    pub app_slug: String,

    #[serde(default)]
    pub semver: String,

    #[serde(default)]
    pub release_notes: String,

    #[serde(default)]
    pub images: Vec<ImageRewrite>,
}

impl ReleaseMetadata {
    /// Find the rewrite entry for an image reference
    pub fn image_rewrite(&self, image: &str) -> Option<&ImageRewrite> {
        self.images.iter().find(|i| i.url == image)
    }
}

/// A lifecycle step descriptor
///
/// Only `render` is executed by this workspace; other kinds are carried so
/// the release round-trips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Render(RenderStepSpec),
    Message(MessageStepSpec),
    #[serde(untagged)]
    Other(serde_yaml::Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderStepSpec {
    /// Install root, relative to the working directory
    #[serde(default)]
    pub root: String,

    /// Ask for plan confirmation before executing
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageStepSpec {
    #[serde(default)]
    pub contents: String,

    #[serde(default)]
    pub level: String,
}

/// A resolved release: schema, assets and metadata for one render pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Release {
    #[serde(default)]
    pub metadata: ReleaseMetadata,

    #[serde(default)]
    pub config: Vec<ConfigGroup>,

    #[serde(default)]
    pub assets: Vec<Asset>,

    #[serde(default)]
    pub lifecycle: Vec<LifecycleStep>,
}

impl Release {
    /// Parse a release from YAML
    ///
    /// Config item names are lookup keys for templates and state, so a
    /// release that declares one twice is rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let release: Self = serde_yaml::from_str(yaml)?;
        release.validate()?;
        Ok(release)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for item in all_items(&self.config) {
            if !seen.insert(item.name.as_str()) {
                return Err(CoreError::InvalidRelease {
                    message: format!("config item '{}' is declared more than once", item.name),
                });
            }
        }
        Ok(())
    }

    /// Load a release from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::ReleaseNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The first render step, if the lifecycle declares one
    pub fn render_step(&self) -> Option<&RenderStepSpec> {
        self.lifecycle.iter().find_map(|step| match step {
            LifecycleStep::Render(spec) => Some(spec),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetKind;

    const RELEASE: &str = r#"
metadata:
  customer_id: cust-1
  installation_id: inst-1
  registry_secret: s3cr3t
  app_slug: acme
  images:
    - url: quay.io/acme/api:1.2
      source: replicated
      app_slug: acme
      image_key: api
config:
  - name: main
    items:
      - name: hostname
        required: true
assets:
  - inline:
      contents: "host: {{repl ConfigOption(\"hostname\") }}"
      dest: config.yaml
  - docker:
      image: quay.io/acme/api:1.2
      source: replicated
      dest: images/api.tar
lifecycle:
  - message:
      contents: hi
  - render:
      root: out
      confirm: true
  - kubectl_apply:
      path: out
"#;

    #[test]
    fn test_parse_release() {
        let release = Release::from_yaml(RELEASE).unwrap();

        assert_eq!(release.metadata.customer_id, "cust-1");
        assert_eq!(release.config[0].items[0].name, "hostname");
        assert_eq!(release.assets.len(), 2);
        assert_eq!(release.assets[1].kind(), AssetKind::Docker);
        assert_eq!(release.lifecycle.len(), 3);
        assert!(matches!(release.lifecycle[2], LifecycleStep::Other(_)));

        let render = release.render_step().unwrap();
        assert_eq!(render.root, "out");
        assert!(render.confirm);
    }

    #[test]
    fn test_image_rewrite_lookup() {
        let release = Release::from_yaml(RELEASE).unwrap();
        let rewrite = release.metadata.image_rewrite("quay.io/acme/api:1.2").unwrap();
        assert_eq!(rewrite.image_key, "api");
        assert!(release.metadata.image_rewrite("nginx:latest").is_none());
    }

    #[test]
    fn test_duplicate_config_item_rejected() {
        let yaml = r#"
config:
  - name: main
    items:
      - name: hostname
  - name: advanced
    items:
      - name: hostname
"#;
        let err = Release::from_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidRelease { ref message } if message.contains("'hostname'")
        ));
    }

    #[test]
    fn test_missing_release_file() {
        let err = Release::from_file("/nonexistent/release.yaml").unwrap_err();
        assert!(matches!(err, CoreError::ReleaseNotFound { .. }));
    }
}
