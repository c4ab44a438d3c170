//! Config resolution
//!
//! Turns a release's config schema into concrete values, either headlessly
//! (templates and previous state only) or through the daemon UI.

mod daemon;
mod headless;

pub use daemon::DaemonResolver;
pub use headless::HeadlessResolver;

use async_trait::async_trait;
use rigging_core::{ConfigGroup, ConfigValues, Release};
use rigging_engine::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::{RenderError, Result};

/// Kind of config validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingRequiredValue,
}

/// One config item that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub name: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValidationErrorKind::MissingRequiredValue,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValidationErrorKind::MissingRequiredValue => {
                write!(f, "{}: missing required value", self.name)
            }
        }
    }
}

/// Outcome of a resolution: values plus collected validation errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub values: ConfigValues,
    pub errors: Vec<ValidationError>,
}

impl ResolvedConfig {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Values, or `RenderError::Validation` if any item failed
    pub fn into_values(self) -> Result<ConfigValues> {
        if self.errors.is_empty() {
            Ok(self.values)
        } else {
            Err(RenderError::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Strategy for producing config values
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve_config(
        &self,
        cancel: &CancellationToken,
        release: &Release,
        previous: &ConfigValues,
    ) -> Result<ResolvedConfig>;
}

/// Required items that are visible, editable and still empty
///
/// An item is visible when it is not hidden, its `when` renders true, and
/// its group's `when` renders true. Empty `when` means true.
pub fn validate(builder: &Builder, groups: &[ConfigGroup], values: &ConfigValues) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for group in groups {
        let group_visible = builder.render_bool(&group.when, true);

        for item in &group.items {
            if !item.required || item.readonly || item.hidden || !group_visible {
                continue;
            }
            if !builder.render_bool(&item.when, true) {
                continue;
            }
            if values.get(&item.name).is_none_or(|v| v.is_empty()) {
                errors.push(ValidationError::missing(&item.name));
            }
        }
    }

    errors
}

/// Values worth writing to the state file
///
/// An item is persisted unless its resolved value equals its default
/// evaluated alone, and previous state holds no explicit empty override for
/// it. With no config groups, every resolved value is persisted.
pub fn persistable_values(
    builder: &Builder,
    groups: &[ConfigGroup],
    resolved: &ConfigValues,
    previous: &ConfigValues,
) -> ConfigValues {
    if groups.is_empty() {
        return resolved.clone();
    }

    let mut persisted = ConfigValues::new();
    for item in rigging_core::config::all_items(groups) {
        let Some(value) = resolved.get(&item.name) else {
            continue;
        };

        let default = builder.render_string(&item.default).ok();
        let overridden_empty = previous.get(&item.name).is_some_and(|v| v.is_empty());

        if default.as_deref() != Some(value.as_str()) || overridden_empty {
            persisted.insert(item.name.clone(), value.clone());
        }
    }

    persisted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigging_core::ConfigItem;

    fn values(pairs: &[(&str, &str)]) -> ConfigValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn builder() -> Builder {
        Builder::with_static().unwrap()
    }

    #[test]
    fn test_validate_collects_every_missing_item() {
        let groups = vec![ConfigGroup::new(
            "main",
            vec![
                ConfigItem::text("a").required(),
                ConfigItem::text("b").required(),
                ConfigItem::text("c").required().hidden(),
                ConfigItem::text("d").required().readonly(),
                ConfigItem {
                    when: "false".to_string(),
                    ..ConfigItem::text("e").required()
                },
                ConfigItem::text("f").required(),
            ],
        )];

        let errors = validate(&builder(), &groups, &values(&[("b", ""), ("f", "set")]));
        assert_eq!(
            errors,
            vec![ValidationError::missing("a"), ValidationError::missing("b")]
        );
    }

    #[test]
    fn test_validate_skips_hidden_group() {
        let groups = vec![ConfigGroup {
            when: "0".to_string(),
            ..ConfigGroup::new("tls", vec![ConfigItem::text("cert").required()])
        }];
        assert!(validate(&builder(), &groups, &ConfigValues::new()).is_empty());
    }

    #[test]
    fn test_persist_only_overrides() {
        let groups = vec![ConfigGroup::new(
            "main",
            vec![
                ConfigItem::text("a").with_default("x"),
                ConfigItem::text("b").with_default("x"),
                ConfigItem::text("c").with_default("x"),
            ],
        )];
        let resolved = values(&[("a", "x"), ("b", "y"), ("c", "")]);

        let persisted = persistable_values(&builder(), &groups, &resolved, &ConfigValues::new());
        assert_eq!(persisted, values(&[("b", "y"), ("c", "")]));
    }

    #[test]
    fn test_persist_keeps_explicit_empty_override() {
        let groups = vec![ConfigGroup::new("main", vec![ConfigItem::text("a")])];
        let resolved = values(&[("a", "")]);

        let persisted = persistable_values(&builder(), &groups, &resolved, &ConfigValues::new());
        assert!(persisted.is_empty());

        let persisted = persistable_values(&builder(), &groups, &resolved, &values(&[("a", "")]));
        assert_eq!(persisted, values(&[("a", "")]));
    }

    #[test]
    fn test_persist_everything_without_groups() {
        let resolved = values(&[("a", "1"), ("b", "2")]);
        let persisted = persistable_values(&builder(), &[], &resolved, &ConfigValues::new());
        assert_eq!(persisted, resolved);
    }

    #[test]
    fn test_into_values() {
        let ok = ResolvedConfig {
            values: values(&[("a", "1")]),
            errors: vec![],
        };
        assert!(ok.is_valid());
        assert_eq!(ok.into_values().unwrap(), values(&[("a", "1")]));

        let bad = ResolvedConfig {
            values: ConfigValues::new(),
            errors: vec![ValidationError::missing("a")],
        };
        assert!(matches!(
            bad.into_values(),
            Err(RenderError::Validation { errors }) if errors.len() == 1
        ));
    }
}
