//! Core types and deterministic building blocks for ledgerchat.
//!
//! Nothing in this crate talks to the network. The agent crate layers the
//! model client, classifier and dispatcher on top of these pieces.

pub mod config;
pub mod domain;
pub mod errors;
pub mod extractor;
pub mod memory;
pub mod response_parser;

pub use domain::conversation::ConversationKey;
pub use domain::extraction::ExtractedFinancialData;
pub use domain::finance::{
    BalanceSheet, InvoiceId, InvoiceInput, InvoiceRecord, InvoiceStatus, TransactionInput,
    TransactionRecord, TransactionType,
};
pub use domain::intent::{merge_entities, Intent, IntentEntities, IntentResult};
pub use errors::{FailureKind, ValidationError};
pub use extractor::PatternExtractor;
pub use memory::{ConversationMemory, MemoryEntry};
pub use response_parser::{parse_model_json, ParseError};
