//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the model the ability to act in the world: run
//! allow-listed commands, read and write files, fetch URLs. Each tool
//! declares a static [`ToolSchema`] and a [`ToolCapability`] that decides
//! which sandbox rules apply to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Normalized tool arguments: a flat JSON object.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// What kind of resource a tool touches. Selects the security check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Spawns processes
    Command,
    /// Reads or writes the local filesystem
    Filesystem,
    /// Makes outbound network requests
    Network,
    /// Pure computation, no side effects
    Compute,
}

/// The JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Declaration of one tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: PropertyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,

    #[serde(default, rename = "minimum", skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, rename = "maximum", skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl PropertySchema {
    pub fn new(kind: PropertyType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: Some(description.into()),
            enum_values: None,
            min: None,
            max: None,
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(PropertyType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(PropertyType::Integer, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(PropertyType::Number, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(PropertyType::Boolean, description)
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_enum<V: Into<serde_json::Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Static parameter schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: BTreeSet<String>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    /// Add a required parameter.
    pub fn required(mut self, name: impl Into<String>, property: PropertySchema) -> Self {
        let name = name.into();
        self.required.insert(name.clone());
        self.properties.insert(name, property);
        self
    }

    /// Add an optional parameter.
    pub fn optional(mut self, name: impl Into<String>, property: PropertySchema) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Render as a JSON Schema object for the provider.
    pub fn to_json_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// What a tool returns when it ran to completion.
///
/// `success = false` means the operation ran but reported failure (e.g. a
/// non-zero exit status); the content is still shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub content: String,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
        }
    }
}

/// The folded result of one tool call, ready to become a `tool` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub succeeded: bool,
}

/// The core Tool trait.
///
/// The executor always calls [`Tool::validate`] before [`Tool::execute`], so
/// `execute` may assume its sandbox checks have passed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Parameter schema used for validation and sent to the LLM.
    fn schema(&self) -> ToolSchema;

    /// Which sandbox category this tool belongs to.
    fn capability(&self) -> ToolCapability;

    /// Security validation on normalized arguments.
    fn validate(&self, _args: &ToolArgs) -> Result<(), ToolError> {
        Ok(())
    }

    /// Per-call time budget requested by the arguments. The executor uses
    /// the shorter of this and its configured timeout.
    fn timeout_hint(&self, _args: &ToolArgs) -> Option<Duration> {
        None
    }

    /// Execute the tool. Long-running tools should observe `cancel`.
    async fn execute(
        &self,
        args: ToolArgs,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}

/// A registry of available tools, passed explicitly to the orchestrator.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo").required("text", PropertySchema::string("Text to echo"))
        }
        fn capability(&self) -> ToolCapability {
            ToolCapability::Compute
        }
        async fn execute(
            &self,
            args: ToolArgs,
            _cancel: CancellationToken,
        ) -> Result<ToolOutput, ToolError> {
            let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(ToolOutput::ok(text))
        }
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_definitions_render_json_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["type"], "object");
        assert_eq!(defs[0].parameters["required"], serde_json::json!(["text"]));
        assert_eq!(defs[0].parameters["properties"]["text"]["type"], "string");
    }

    #[test]
    fn property_schema_serializes_constraints() {
        let prop = PropertySchema::integer("Seconds")
            .with_range(1.0, 300.0)
            .with_default(30);
        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["type"], "integer");
        assert_eq!(json["minimum"], 1.0);
        assert_eq!(json["maximum"], 300.0);
        assert_eq!(json["default"], 30);
        assert!(json.get("enum").is_none());
    }

    #[tokio::test]
    async fn execute_echo() {
        let mut args = ToolArgs::new();
        args.insert("text".into(), "hello world".into());
        let out = EchoTool
            .execute(args, CancellationToken::new())
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.content, "hello world");
    }
}
