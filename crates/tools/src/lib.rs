//! Built-in tools and the executor that runs them for Ferrule.
//!
//! Tools give the orchestrator the ability to act: run allow-listed
//! commands, read and write files inside the sandbox, fetch public URLs
//! and do arithmetic. Every call goes through [`ToolExecutor`], which
//! parses the model's arguments, validates them against the tool schema,
//! applies the [`SecurityPolicy`] and bounds the run with a timeout.

pub mod args;
pub mod calculator;
pub mod executor;
pub mod file_read;
pub mod file_write;
pub mod http_get;
pub mod list_directory;
pub mod shell;
pub mod validate;

use std::sync::Arc;

use ferrule_core::error::ToolError;
use ferrule_core::tool::{ToolArgs, ToolRegistry};
use ferrule_security::SecurityPolicy;

pub use args::{ArgumentParseError, parse_arguments};
pub use executor::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TOOL_TIMEOUT, ToolExecutor, truncate_output};
pub use validate::{ValidationResult, validate_args};

/// Create a registry with every built-in tool, all sharing `policy`.
pub fn default_registry(policy: Arc<SecurityPolicy>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(shell::ShellTool::new(policy.clone())));
    registry.register(Arc::new(file_read::FileReadTool::new(policy.clone())));
    registry.register(Arc::new(file_write::FileWriteTool::new(policy.clone())));
    registry.register(Arc::new(list_directory::ListDirectoryTool::new(policy.clone())));
    registry.register(Arc::new(http_get::HttpGetTool::new(policy)));
    registry.register(Arc::new(calculator::CalculatorTool));
    registry
}

/// A string argument that schema validation has already required.
pub(crate) fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::MissingField(key.to_string()))
}
