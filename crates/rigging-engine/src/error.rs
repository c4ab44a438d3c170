//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid template syntax configuration: {message}")]
    Syntax { message: String },
}

/// What went wrong while rendering a `repl` template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

/// Template error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(rigging::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `functions` is the function table the template was evaluated
    /// against; it feeds "did you mean" suggestions for unknown functions.
    pub fn from_minijinja(err: minijinja::Error, template_source: &str, functions: &[&str]) -> Self {
        let kind = categorize(&err);
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));

        let message = err
            .to_string()
            .replace("invalid operation: ", "")
            .replace("syntax error: ", "")
            .replace("undefined value", "undefined variable");

        let suggestion = match kind {
            TemplateErrorKind::UnknownFunction => {
                unknown_name(&err).and_then(|name| suggest_function(&name, functions))
            }
            TemplateErrorKind::SyntaxError => Some(
                "expressions use {{repl ... }} and blocks use {%repl ... %}".to_string(),
            ),
            _ => None,
        };

        Self {
            message,
            kind,
            src: NamedSource::new("<template>", template_source.to_string()),
            span,
            suggestion,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => {
            let msg = err.to_string().to_lowercase();
            if msg.contains("is not callable") || msg.contains("unknown function") {
                TemplateErrorKind::UnknownFunction
            } else if msg.contains("undefined") {
                TemplateErrorKind::UndefinedVariable
            } else {
                TemplateErrorKind::Other
            }
        }
    }
}

/// Pull the offending identifier out of an error's detail, if it names one
fn unknown_name(err: &minijinja::Error) -> Option<String> {
    let detail = err.detail()?;
    if let Some(name) = detail.strip_suffix(" is unknown") {
        return Some(name.trim().to_string());
    }
    let start = detail.find(['`', '\''])?;
    let rest = &detail[start + 1..];
    let end = rest.find(['`', '\''])?;
    Some(rest[..end].to_string())
}

fn suggest_function(name: &str, functions: &[&str]) -> Option<String> {
    functions
        .iter()
        .map(|f| (f, strsim::jaro_winkler(name, f)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| format!("did you mean `{}`?", f))
}

/// Span covering line `line_num` (1-based) of `source`
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (current_line, line) in (1..).zip(source.lines()) {
        if current_line == line_num {
            return Some(SourceSpan::new(offset.into(), line.len().into()));
        }
        offset += line.len() + 1;
    }

    None
}

pub type Result<T> = std::result::Result<T, EngineError>;
