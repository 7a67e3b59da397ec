//! File write tool: create, overwrite or append to a file inside the sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
use ferrule_security::SecurityPolicy;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::str_arg;

pub struct FileWriteTool {
    policy: Arc<SecurityPolicy>,
}

impl FileWriteTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "file_write".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text to a file, creating parent directories as needed. \
         Set append=true to add to the end instead of replacing."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("file_write")
            .required("path", PropertySchema::string("The file path to write"))
            .required("content", PropertySchema::string("The text to write"))
            .optional(
                "append",
                PropertySchema::boolean("Append instead of overwriting").with_default(false),
            )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Filesystem
    }

    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        self.policy.check_path(str_arg(args, "path")?)?;
        Ok(())
    }

    async fn execute(&self, args: ToolArgs, _cancel: CancellationToken) -> Result<ToolOutput, ToolError> {
        let raw = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let append = args.get("append").and_then(|v| v.as_bool()).unwrap_or(false);
        let path = self.policy.check_path(raw)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("cannot create '{}': {e}", parent.display())))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await
            .map_err(|e| failed(format!("cannot open '{raw}': {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| failed(format!("cannot write '{raw}': {e}")))?;
        file.flush()
            .await
            .map_err(|e| failed(format!("cannot write '{raw}': {e}")))?;

        debug!(path = %path.display(), bytes = content.len(), append, "File written");
        let verb = if append { "Appended" } else { "Wrote" };
        Ok(ToolOutput::ok(format!("{verb} {} bytes to {raw}", content.len())))
    }
}
