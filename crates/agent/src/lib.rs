//! The orchestration loop of Ferrule.
//!
//! A run follows a bounded **Request → Act → Observe** cycle:
//!
//! 1. **Send** the conversation and tool definitions to the provider
//! 2. **If tool calls**: execute them in order, append the results, loop
//! 3. **If text**: wrap the answer in a success envelope
//!
//! When the iteration budget is spent or the conversation outgrows its size
//! bound, the model is told to stop using tools and one final tools-disabled
//! request produces the answer.

pub mod context;
pub mod orchestrator;
pub mod scripted;

pub use context::{PruneReport, prune_conversation};
pub use orchestrator::{
    FINALIZE_INSTRUCTION, FinalizeReason, Orchestrator, OrchestratorConfig, TurnOutcome,
};
pub use scripted::ScriptedProvider;
