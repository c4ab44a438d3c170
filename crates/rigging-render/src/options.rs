//! Render options
//!
//! Passed to every component at construction; nothing reads globals.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RenderError, Result};

/// Default registry for vendor-hosted images
pub const DEFAULT_REGISTRY_HOST: &str = "registry.replicated.com";

/// Settings for one render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Directory assets are written under (default: current directory)
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// State file (default: `<install root>/.rigging/state.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Registry host vendor images are rewritten to
    #[serde(default = "default_registry_host")]
    pub registry_host: String,

    /// How often a pending daemon wait logs that it is still waiting
    #[serde(default = "default_heartbeat", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Capacity of the image progress channel
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// Timeout for web asset downloads (default: 30s)
    #[serde(default = "default_web_timeout", with = "humantime_serde")]
    pub web_timeout: Duration,

    /// Back up an existing render root to `<root>.bak` before writing
    #[serde(default = "default_true")]
    pub backup: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            state_file: None,
            registry_host: default_registry_host(),
            heartbeat_interval: default_heartbeat(),
            progress_buffer: default_progress_buffer(),
            web_timeout: default_web_timeout(),
            backup: true,
        }
    }
}

fn default_install_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_registry_host() -> String {
    DEFAULT_REGISTRY_HOST.to_string()
}

fn default_heartbeat() -> Duration {
    Duration::from_secs(10)
}

fn default_progress_buffer() -> usize {
    64
}

fn default_web_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

impl RenderOptions {
    /// Options rooted at `install_root`, everything else default
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let options: Self = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Default options file location in the user config directory
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            RenderError::InvalidOptions("could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("rigging").join("render.yaml"))
    }

    /// Load from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.progress_buffer == 0 {
            return Err(RenderError::InvalidOptions(
                "progressBuffer must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(RenderError::InvalidOptions(
                "heartbeatInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.install_root.join(".rigging").join("state.json"))
    }

    /// Resolve a render root relative to the install root
    pub fn root_path(&self, root: &str) -> PathBuf {
        let root = Path::new(root);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            self.install_root.join(root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(options.progress_buffer, 64);
        assert_eq!(options.registry_host, "registry.replicated.com");
        assert!(options.backup);
        assert_eq!(options.state_path(), PathBuf::from("./.rigging/state.json"));
    }

    #[test]
    fn test_from_yaml() {
        let options = RenderOptions::from_yaml(
            r#"
installRoot: /opt/app
heartbeatInterval: 2s
webTimeout: 1m
backup: false
"#,
        )
        .unwrap();

        assert_eq!(options.install_root, PathBuf::from("/opt/app"));
        assert_eq!(options.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(options.web_timeout, Duration::from_secs(60));
        assert!(!options.backup);
        assert_eq!(options.progress_buffer, 64);
        assert_eq!(
            options.state_path(),
            PathBuf::from("/opt/app/.rigging/state.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let err = RenderOptions::from_yaml("progressBuffer: 0").unwrap_err();
        assert!(matches!(err, RenderError::InvalidOptions(_)));
    }

    #[test]
    fn test_root_path() {
        let options = RenderOptions::new("/srv");
        assert_eq!(options.root_path("installer"), PathBuf::from("/srv/installer"));
        assert_eq!(options.root_path("/abs"), PathBuf::from("/abs"));
    }
}
