//! Rigging Engine - `repl` template evaluation
//!
//! Templates in release YAML call named functions supplied by contexts:
//! - `StaticContext`: string, number and time helpers
//! - `ConfigContext`: `ConfigOption*` lookups over resolved config values
//! - `InstallationContext`: release and installation metadata
//!
//! A `Builder` merges an ordered chain of contexts and renders strings.

pub mod builder;
pub mod context;
pub mod error;
pub mod functions;

pub use builder::{Builder, BuilderChain};
pub use context::{ConfigContext, FunctionTable, InstallationContext, StaticContext, TemplateContext};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
