//! File read tool: read a text file inside the sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
use ferrule_security::SecurityPolicy;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::str_arg;

pub const DEFAULT_MAX_BYTES: u64 = 65_536;

pub struct FileReadTool {
    policy: Arc<SecurityPolicy>,
}

impl FileReadTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "file_read".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Relative paths resolve against the workspace."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("file_read")
            .required("path", PropertySchema::string("The file path to read"))
            .optional(
                "max_bytes",
                PropertySchema::integer("Read at most this many bytes")
                    .with_range(1.0, 10_485_760.0)
                    .with_default(DEFAULT_MAX_BYTES),
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
        let path = self.policy.check_path(raw)?;
        let max_bytes = args
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_BYTES);

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| failed(format!("cannot open '{raw}': {e}")))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| failed(format!("cannot stat '{raw}': {e}")))?;
        if metadata.is_dir() {
            return Err(failed(format!("'{raw}' is a directory")));
        }

        let mut buf = Vec::new();
        file.take(max_bytes)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| failed(format!("cannot read '{raw}': {e}")))?;

        let mut content = String::from_utf8_lossy(&buf).into_owned();
        if metadata.len() > max_bytes {
            content.push_str(&format!(
                "\n... (showing first {max_bytes} of {} bytes)",
                metadata.len()
            ));
        }
        Ok(ToolOutput::ok(content))
    }
}
