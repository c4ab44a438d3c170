//! Config schema declared by a release

use serde::{Deserialize, Serialize};

/// Kind of input a config item renders as
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Text,
    Textarea,
    Password,
    Bool,
    Label,
    Heading,
    SelectOne,
    File,
    #[serde(other)]
    Unknown,
}

/// One option of a `select_one` item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigChildItem {
    pub name: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub recommended: bool,

    #[serde(default)]
    pub default: String,

    #[serde(default)]
    pub value: String,
}

/// A single configurable setting
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigItem {
    /// Unique key within a release
    pub name: String,

    #[serde(rename = "type", default)]
    pub item_type: ItemType,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub help_text: String,

    /// Default template
    #[serde(default)]
    pub default: String,

    /// Value template, takes precedence over `default` when non-empty
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default, alias = "read_only")]
    pub readonly: bool,

    /// Visibility template; an item whose `when` renders false is treated as hidden
    #[serde(default)]
    pub when: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ConfigChildItem>,
}

impl ConfigItem {
    /// Create a plain text item
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Templates this item evaluates, in evaluation priority order
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        [self.value.as_str(), self.default.as_str(), self.when.as_str()]
            .into_iter()
            .filter(|t| !t.is_empty())
    }
}

/// Ordered collection of items sharing a display label
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigGroup {
    pub name: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub when: String,

    #[serde(default)]
    pub items: Vec<ConfigItem>,
}

impl ConfigGroup {
    pub fn new(name: impl Into<String>, items: Vec<ConfigItem>) -> Self {
        Self {
            name: name.into(),
            items,
            ..Default::default()
        }
    }

    /// A group is hidden iff every item in it is hidden
    pub fn is_hidden(&self) -> bool {
        self.items.iter().all(|item| item.hidden)
    }
}

/// Total number of items across all groups
pub fn item_count(groups: &[ConfigGroup]) -> usize {
    groups.iter().map(|g| g.items.len()).sum()
}

/// Iterate over every item of every group, in declaration order
pub fn all_items(groups: &[ConfigGroup]) -> impl Iterator<Item = &ConfigItem> {
    groups.iter().flat_map(|g| g.items.iter())
}
