//! Template contexts
//!
//! A context contributes a table of named functions. The builder merges
//! the tables of every context in its chain into one environment.

use base64::Engine as _;
use minijinja::Value;
use rigging_core::{ConfigGroup, ConfigValues, ItemType, ReleaseMetadata};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::functions;

/// Function name to callable
pub type FunctionTable = BTreeMap<&'static str, Value>;

/// A provider of template functions
pub trait TemplateContext: Send + Sync {
    /// Provider name, used in collision warnings
    fn name(&self) -> &'static str;

    fn functions(&self) -> FunctionTable;
}

/// Pure helpers that need no release data
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticContext;

impl StaticContext {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateContext for StaticContext {
    fn name(&self) -> &'static str {
        "static"
    }

    fn functions(&self) -> FunctionTable {
        let mut table = FunctionTable::new();
        table.insert("RandomString", Value::from_function(functions::random_string));
        table.insert("Now", Value::from_function(functions::now));
        table.insert("NowFmt", Value::from_function(functions::now_fmt));
        table.insert("ToLower", Value::from_function(functions::to_lower));
        table.insert("ToUpper", Value::from_function(functions::to_upper));
        table.insert("TrimSpace", Value::from_function(functions::trim_space));
        table.insert("Trim", Value::from_function(functions::trim));
        table.insert("Split", Value::from_function(functions::split));
        table.insert("UrlEncode", Value::from_function(functions::url_encode));
        table.insert("Base64Encode", Value::from_function(functions::base64_encode));
        table.insert("Base64Decode", Value::from_function(functions::base64_decode));
        table.insert("ParseBool", Value::from_function(functions::parse_bool));
        table.insert("ParseInt", Value::from_function(functions::parse_int));
        table.insert("ParseUint", Value::from_function(functions::parse_uint));
        table.insert("ParseFloat", Value::from_function(functions::parse_float));
        table.insert("Add", Value::from_function(functions::add));
        table.insert("Sub", Value::from_function(functions::sub));
        table.insert("Mult", Value::from_function(functions::mult));
        table.insert("Div", Value::from_function(functions::div));
        table.insert("HumanSize", Value::from_function(functions::human_size));
        table
    }
}

/// Lookups against config values resolved so far
///
/// Unknown or not-yet-resolved items read as `""`. Evaluation order is the
/// dependency graph's concern, not this context's.
#[derive(Debug, Clone, Default)]
pub struct ConfigContext {
    values: Arc<ConfigValues>,
    /// Child option names of `select_one` items, in declaration order
    options: Arc<BTreeMap<String, Vec<String>>>,
}

impl ConfigContext {
    pub fn new(groups: &[ConfigGroup], values: ConfigValues) -> Self {
        let options = rigging_core::config::all_items(groups)
            .filter(|item| item.item_type == ItemType::SelectOne)
            .map(|item| {
                let names = item.items.iter().map(|child| child.name.clone()).collect();
                (item.name.clone(), names)
            })
            .collect();

        Self {
            values: Arc::new(values),
            options: Arc::new(options),
        }
    }

    pub fn values(&self) -> &ConfigValues {
        &self.values
    }
}

fn lookup(values: &ConfigValues, name: &str) -> String {
    match values.get(name) {
        Some(value) => value.clone(),
        None => {
            tracing::debug!(item = name, "config option not resolved, using empty value");
            String::new()
        }
    }
}

impl TemplateContext for ConfigContext {
    fn name(&self) -> &'static str {
        "config"
    }

    fn functions(&self) -> FunctionTable {
        let mut table = FunctionTable::new();

        let values = Arc::clone(&self.values);
        table.insert(
            "ConfigOption",
            Value::from_function(move |name: String| -> String { lookup(&values, &name) }),
        );

        let values = Arc::clone(&self.values);
        let options = Arc::clone(&self.options);
        table.insert(
            "ConfigOptionIndex",
            Value::from_function(move |name: String| -> String {
                let selected = lookup(&values, &name);
                options
                    .get(&name)
                    .and_then(|children| children.iter().position(|c| *c == selected))
                    .map(|index| index.to_string())
                    .unwrap_or_default()
            }),
        );

        let values = Arc::clone(&self.values);
        table.insert(
            "ConfigOptionData",
            Value::from_function(move |name: String| -> Result<String, minijinja::Error> {
                let encoded = lookup(&values, &name);
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim().as_bytes())
                    .map_err(|e| {
                        minijinja::Error::new(
                            minijinja::ErrorKind::InvalidOperation,
                            format!("config option '{}' is not valid base64: {}", name, e),
                        )
                    })?;
                Ok(String::from_utf8_lossy(&decoded).into_owned())
            }),
        );

        let values = Arc::clone(&self.values);
        table.insert(
            "ConfigOptionEquals",
            Value::from_function(move |name: String, expected: String| -> bool {
                lookup(&values, &name) == expected
            }),
        );

        let values = Arc::clone(&self.values);
        table.insert(
            "ConfigOptionNotEquals",
            Value::from_function(move |name: String, expected: String| -> bool {
                lookup(&values, &name) != expected
            }),
        );

        table
    }
}

/// Installation metadata for the current render pass
#[derive(Debug, Clone)]
pub struct InstallationContext {
    fields: Arc<BTreeMap<&'static str, String>>,
}

impl InstallationContext {
    pub fn new(metadata: &ReleaseMetadata, state_file_path: impl Into<String>) -> Self {
        let fields = BTreeMap::from([
            ("customer_id", metadata.customer_id.clone()),
            ("installation_id", metadata.installation_id.clone()),
            ("channel_name", metadata.channel_name.clone()),
            ("release_id", metadata.release_id.clone()),
            ("semver", metadata.semver.clone()),
            ("release_notes", metadata.release_notes.clone()),
            ("app_slug", metadata.app_slug.clone()),
            ("state_file_path", state_file_path.into()),
        ]);

        Self {
            fields: Arc::new(fields),
        }
    }
}

impl TemplateContext for InstallationContext {
    fn name(&self) -> &'static str {
        "installation"
    }

    fn functions(&self) -> FunctionTable {
        let mut table = FunctionTable::new();

        let fields = Arc::clone(&self.fields);
        table.insert(
            "Installation",
            Value::from_function(move |key: String| -> String {
                match fields.get(key.as_str()) {
                    Some(value) => value.clone(),
                    None => {
                        tracing::debug!(key = %key, "unknown installation key");
                        String::new()
                    }
                }
            }),
        );

        let fields = Arc::clone(&self.fields);
        table.insert(
            "StateFilePath",
            Value::from_function(move || -> String {
                fields.get("state_file_path").cloned().unwrap_or_default()
            }),
        );

        table
    }
}
