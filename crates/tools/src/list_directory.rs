//! Directory listing tool.

use std::sync::Arc;

use async_trait::async_trait;
use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
use ferrule_security::SecurityPolicy;
use tokio_util::sync::CancellationToken;

pub struct ListDirectoryTool {
    policy: Arc<SecurityPolicy>,
}

impl ListDirectoryTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

fn path_arg(args: &ToolArgs) -> &str {
    args.get("path").and_then(|v| v.as_str()).unwrap_or(".")
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory, one per line. Directories end with '/'."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("list_directory")
            .optional(
                "path",
                PropertySchema::string("Directory to list").with_default("."),
            )
            .optional(
                "include_hidden",
                PropertySchema::boolean("Include dot-files").with_default(false),
            )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Filesystem
    }

    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        self.policy.check_path(path_arg(args))?;
        Ok(())
    }

    async fn execute(&self, args: ToolArgs, _cancel: CancellationToken) -> Result<ToolOutput, ToolError> {
        let raw = path_arg(&args);
        let include_hidden = args
            .get("include_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let dir = self.policy.check_path(raw)?;

        let failed = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: "list_directory".into(),
            reason: format!("cannot list '{raw}': {e}"),
        };

        let mut reader = tokio::fs::read_dir(&dir).await.map_err(failed)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(failed)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(ToolOutput::ok("(empty directory)"));
        }
        Ok(ToolOutput::ok(entries.join("\n")))
    }
}
