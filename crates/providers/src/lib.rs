//! LLM Provider implementations for Ferrule.
//!
//! All providers implement the `ferrule_core::Provider` trait.
//! The router selects the correct provider based on configuration, and the
//! retry engine wraps every call the orchestrator makes.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryFailure, RetryPolicy, RetryState, Substantive};
pub use router::{ProviderRouter, build_from_config};
