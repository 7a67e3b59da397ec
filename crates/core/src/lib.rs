//! # Ferrule Core
//!
//! Domain types, traits, and error definitions for the Ferrule tool-augmented
//! LLM orchestrator. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! The seams of the system are traits defined here:
//! - [`Provider`]: the remote language model
//! - [`Tool`]: a sandboxed local capability
//!
//! Failures are values. Provider failures are classified into an
//! [`ErrorKind`] with a fixed retry strategy, and every orchestration run
//! resolves to exactly one [`ResponseEnvelope`].

pub mod classify;
pub mod envelope;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use classify::{ErrorClassification, ErrorKind, RetryStrategy, Severity, classify};
pub use envelope::{EnvelopeBuilder, ErrorBody, ModelInfo, ResponseEnvelope, ResponseStatus};
pub use error::{ProviderError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{
    PropertySchema, PropertyType, Tool, ToolArgs, ToolCapability, ToolExecutionResult, ToolOutput,
    ToolRegistry, ToolSchema,
};
