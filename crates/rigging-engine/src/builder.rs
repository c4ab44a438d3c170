//! Template builder based on MiniJinja
//!
//! Templates embedded in release YAML use `repl`-tagged delimiters so they
//! can sit next to Helm and Go templates without clashing:
//!
//! - expressions: `{{repl ConfigOption("hostname") }}`
//! - blocks: `{%repl if ConfigOptionEquals("tls", "1") %}...{%repl endif %}`
//! - comments: `{#repl ... #}`
//!
//! Plain `{{ ... }}` passes through untouched.

use minijinja::Environment;
use minijinja::syntax::SyntaxConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::{StaticContext, TemplateContext};
use crate::error::{EngineError, Result, TemplateError};
use crate::functions::parse_bool_str;

/// Chain of contexts a builder is assembled from
#[derive(Clone, Default)]
pub struct BuilderChain {
    contexts: Vec<Arc<dyn TemplateContext>>,
}

impl BuilderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a context; later contexts win on name collisions
    pub fn with(mut self, context: impl TemplateContext + 'static) -> Self {
        self.contexts.push(Arc::new(context));
        self
    }

    /// Merge every context's functions into one environment
    pub fn build(self) -> Result<Builder> {
        let mut merged: BTreeMap<&'static str, (&'static str, minijinja::Value)> = BTreeMap::new();

        for context in &self.contexts {
            for (name, function) in context.functions() {
                if let Some((previous, _)) = merged.insert(name, (context.name(), function)) {
                    tracing::warn!(
                        function = name,
                        previous,
                        provider = context.name(),
                        "template function registered twice, later provider wins"
                    );
                }
            }
        }

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{%repl", "%}")
            .variable_delimiters("{{repl", "}}")
            .comment_delimiters("{#repl", "#}")
            .build()
            .map_err(|e| EngineError::Syntax {
                message: e.to_string(),
            })?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_keep_trailing_newline(true);

        let function_names = merged.keys().map(|name| name.to_string()).collect();
        for (name, (_, function)) in merged {
            env.add_global(name, function);
        }

        Ok(Builder {
            env,
            function_names,
        })
    }
}

/// Evaluates `repl` templates against a merged function table
pub struct Builder {
    env: Environment<'static>,
    function_names: Vec<String>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("function_names", &self.function_names)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Start a chain of contexts
    pub fn chain() -> BuilderChain {
        BuilderChain::new()
    }

    /// A builder with only the static helpers
    pub fn with_static() -> Result<Self> {
        Self::chain().with(StaticContext::new()).build()
    }

    /// Names of every registered function, sorted
    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    /// Render a template string
    ///
    /// Empty input renders to an empty string.
    pub fn render_string(&self, template: &str) -> Result<String> {
        if template.is_empty() {
            return Ok(String::new());
        }

        self.env
            .render_str(template, minijinja::context! {})
            .map_err(|e| {
                let names: Vec<&str> = self.function_names.iter().map(String::as_str).collect();
                EngineError::Template(TemplateError::from_minijinja(e, template, &names))
            })
    }

    /// Render and parse as a boolean, falling back to `default`
    pub fn render_bool(&self, template: &str, default: bool) -> bool {
        self.render_parsed(template, default, parse_bool_str)
    }

    /// Render and parse as a signed integer, falling back to `default`
    pub fn render_int(&self, template: &str, default: i64) -> i64 {
        self.render_parsed(template, default, |s| s.parse().ok())
    }

    /// Render and parse as an unsigned integer, falling back to `default`
    pub fn render_uint(&self, template: &str, default: u64) -> u64 {
        self.render_parsed(template, default, |s| s.parse().ok())
    }

    fn render_parsed<T: std::fmt::Debug>(
        &self,
        template: &str,
        default: T,
        parse: impl Fn(&str) -> Option<T>,
    ) -> T {
        if template.is_empty() {
            return default;
        }

        let rendered = match self.render_string(template) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::debug!(template, error = %e, "template failed, using default");
                return default;
            }
        };

        let trimmed = rendered.trim();
        if trimmed.is_empty() {
            return default;
        }

        parse(trimmed).unwrap_or_else(|| {
            tracing::debug!(rendered = trimmed, ?default, "unparseable template result, using default");
            default
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConfigContext, FunctionTable, InstallationContext};
    use crate::error::TemplateErrorKind;
    use minijinja::Value;
    use rigging_core::{ConfigChildItem, ConfigGroup, ConfigItem, ConfigValues, ItemType, ReleaseMetadata};

    fn values(pairs: &[(&str, &str)]) -> ConfigValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_builder(groups: &[ConfigGroup], pairs: &[(&str, &str)]) -> Builder {
        Builder::chain()
            .with(StaticContext::new())
            .with(ConfigContext::new(groups, values(pairs)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_template() {
        let builder = Builder::with_static().unwrap();
        assert_eq!(builder.render_string("").unwrap(), "");
    }

    #[test]
    fn test_plain_delimiters_pass_through() {
        let builder = Builder::with_static().unwrap();
        let rendered = builder
            .render_string(r#"image: {{ .Values.image }}:{{repl ToUpper("v1") }}"#)
            .unwrap();
        insta::assert_snapshot!(rendered, @"image: {{ .Values.image }}:V1");
    }

    #[test]
    fn test_blocks_and_comments() {
        let builder = Builder::with_static().unwrap();
        let rendered = builder
            .render_string(r#"{#repl note #}{%repl if ParseBool("true") %}on{%repl else %}off{%repl endif %}"#)
            .unwrap();
        assert_eq!(rendered, "on");
    }

    #[test]
    fn test_keeps_trailing_newline() {
        let builder = Builder::with_static().unwrap();
        assert_eq!(builder.render_string("a\n").unwrap(), "a\n");
    }

    #[test]
    fn test_render_bool_fail_to_default() {
        let builder = Builder::with_static().unwrap();
        assert!(builder.render_bool("", true));
        assert!(!builder.render_bool("", false));
        assert!(builder.render_bool("maybe", true));
        assert!(!builder.render_bool("F", true));
        assert!(builder.render_bool("{{repl NoSuchFunction() }}", true));
        assert!(!builder.render_bool(r#"{{repl ParseBool("0") }}"#, true));
    }

    #[test]
    fn test_render_int_and_uint() {
        let builder = Builder::with_static().unwrap();
        assert_eq!(builder.render_int("{{repl Add(2, 3) }}", 0), 5);
        assert_eq!(builder.render_int("{{repl Sub(2, 3) }}", 0), -1);
        assert_eq!(builder.render_int("nope", 7), 7);
        assert_eq!(builder.render_uint("{{repl Sub(2, 3) }}", 9), 9);
        assert_eq!(builder.render_uint(" 42 ", 0), 42);
    }

    #[test]
    fn test_unknown_function_suggestion() {
        let builder = config_builder(&[], &[]);
        let err = builder
            .render_string(r#"{{repl ConfigOptoin("a") }}"#)
            .unwrap_err();
        let EngineError::Template(err) = err else {
            panic!("expected template error");
        };
        assert_eq!(err.kind(), TemplateErrorKind::UnknownFunction);
        assert_eq!(
            err.suggestion.as_deref(),
            Some("did you mean `ConfigOption`?")
        );
    }

    #[test]
    fn test_config_lookups() {
        let select = ConfigItem {
            item_type: ItemType::SelectOne,
            items: vec![
                ConfigChildItem {
                    name: "small".to_string(),
                    ..Default::default()
                },
                ConfigChildItem {
                    name: "large".to_string(),
                    ..Default::default()
                },
            ],
            ..ConfigItem::text("size")
        };
        let groups = vec![ConfigGroup::new("main", vec![select])];
        let builder = config_builder(
            &groups,
            &[("host", "example.com"), ("size", "large"), ("cert", "aGVsbG8=")],
        );

        let render = |t: &str| builder.render_string(t).unwrap();
        assert_eq!(render(r#"{{repl ConfigOption("host") }}"#), "example.com");
        assert_eq!(render(r#"[{{repl ConfigOption("missing") }}]"#), "[]");
        assert_eq!(render(r#"{{repl ConfigOptionIndex("size") }}"#), "1");
        assert_eq!(render(r#"[{{repl ConfigOptionIndex("host") }}]"#), "[]");
        assert_eq!(render(r#"{{repl ConfigOptionData("cert") }}"#), "hello");
        assert!(builder.render_bool(r#"{{repl ConfigOptionEquals("size", "large") }}"#, false));
        assert!(!builder.render_bool(r#"{{repl ConfigOptionNotEquals("size", "large") }}"#, true));
    }

    #[test]
    fn test_installation_context() {
        let metadata = ReleaseMetadata {
            customer_id: "cust".to_string(),
            semver: "1.2.3".to_string(),
            ..Default::default()
        };
        let builder = Builder::chain()
            .with(InstallationContext::new(&metadata, "/tmp/state.json"))
            .build()
            .unwrap();

        let rendered = builder
            .render_string(r#"{{repl Installation("customer_id") }}@{{repl Installation("semver") }} {{repl StateFilePath() }}"#)
            .unwrap();
        assert_eq!(rendered, "cust@1.2.3 /tmp/state.json");
        assert_eq!(
            builder.render_string(r#"[{{repl Installation("bogus") }}]"#).unwrap(),
            "[]"
        );
    }

    struct Override;

    impl TemplateContext for Override {
        fn name(&self) -> &'static str {
            "override"
        }

        fn functions(&self) -> FunctionTable {
            let mut table = FunctionTable::new();
            table.insert("ToUpper", Value::from_function(|_: String| "overridden".to_string()));
            table
        }
    }

    #[test]
    fn test_later_context_wins() {
        let builder = Builder::chain()
            .with(StaticContext::new())
            .with(Override)
            .build()
            .unwrap();

        assert_eq!(
            builder.render_string(r#"{{repl ToUpper("x") }}"#).unwrap(),
            "overridden"
        );
        assert_eq!(
            builder
                .function_names()
                .iter()
                .filter(|n| *n == "ToUpper")
                .count(),
            1
        );
    }
}
