//! Agent runtime: model-backed intent classification and dispatch.
//!
//! This crate turns a chat message (or the text of an uploaded document) into
//! a bookkeeping operation:
//! - Classifies intent with the model, falling back to keyword matching
//!   (`classifier`)
//! - Merges model entities with pattern-extracted fields and routes to the
//!   matching handler (`dispatcher`)
//! - Answers open-ended questions (`conversation`)
//! - Extracts invoice fields from uploaded documents (`documents`)
//!
//! # Key Types
//!
//! - `AgentRuntime` - composition root (see `runtime` module)
//! - `LlmClient` - pluggable model transport for OpenAI/Anthropic/Ollama
//! - `ModelAvailability` - process-wide "model unavailable" signal
//!
//! # Failure Principle
//!
//! Public entry points never return errors. Every failure is turned into a
//! user-facing message and logged; the taken path is reported alongside the
//! response.

pub mod availability;
pub mod classifier;
pub mod conversation;
pub mod dispatcher;
pub mod documents;
pub mod llm;
pub mod runtime;

pub use availability::ModelAvailability;
pub use classifier::{Classification, ClassificationPath, FallbackReason, IntentClassifier};
pub use dispatcher::{ActionResponse, DispatchOutcome, Dispatcher};
pub use llm::{HttpLlmClient, LlmClient, LlmError};
pub use runtime::AgentRuntime;
