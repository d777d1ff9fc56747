use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use ledgerchat_core::domain::conversation::ConversationKey;
use ledgerchat_core::domain::intent::{Intent, IntentResult};
use ledgerchat_core::errors::FailureKind;
use ledgerchat_core::memory::{ConversationMemory, MemoryEntry};
use ledgerchat_core::response_parser::parse_model_json;

use crate::availability::ModelAvailability;
use crate::llm::LlmClient;

pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.5;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify messages sent to a small-business bookkeeping assistant.

Pick exactly one intent:
- CREATE_INVOICE: the user wants to bill a client or create an invoice.
- RECORD_TRANSACTION: the user reports money spent or received.
- GENERATE_BALANCE_SHEET: the user asks for a balance sheet, summary or financial report.
- GENERAL_INQUIRY: anything else, including greetings and questions.

Extract these entities when the message states them, otherwise use null:
client (person or company name), amount (number without currency symbols,
negative for money spent), description (short service or purchase summary),
date (YYYY-MM-DD).

Reply with a single JSON object and nothing else:
{"intent": "...", "confidence": 0.0, "entities": {"client": null, "amount": null, "description": null, "date": null}, "reasoning": "..."}"#;

const INVOICE_KEYWORDS: &[&str] = &["invoice", "bill", "charge"];
const TRANSACTION_KEYWORDS: &[&str] = &["transaction", "expense", "spent", "received", "paid"];
const BALANCE_KEYWORDS: &[&str] = &["balance", "summary", "report", "overview"];

/// Deterministic keyword classifier used whenever the model path fails.
#[derive(Clone, Copy, Debug)]
pub struct KeywordClassifier {
    confidence: f64,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_CONFIDENCE)
    }
}

impl KeywordClassifier {
    pub fn new(confidence: f64) -> Self {
        Self { confidence: confidence.clamp(0.0, 1.0) }
    }

    pub fn classify(&self, message: &str) -> IntentResult {
        let lowered = message.to_lowercase();
        let words = lowered
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>();
        let mentions = |keywords: &[&str]| {
            words.iter().any(|word| keywords.iter().any(|keyword| word.starts_with(keyword)))
        };

        let intent = [
            (INVOICE_KEYWORDS, Intent::CreateInvoice),
            (TRANSACTION_KEYWORDS, Intent::RecordTransaction),
            (BALANCE_KEYWORDS, Intent::GenerateBalanceSheet),
        ]
        .into_iter()
        .find(|(keywords, _)| mentions(keywords))
        .map(|(_, intent)| intent)
        .unwrap_or(Intent::GeneralInquiry);

        IntentResult::new(intent, self.confidence).with_reasoning("keyword fallback")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// The availability flag was already down; no model call was made.
    ModelUnavailable,
    /// The model call failed. `unavailable` records whether the failure
    /// flipped the availability flag.
    Transport { unavailable: bool, message: String },
    MalformedResponse(String),
}

impl FallbackReason {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ModelUnavailable | Self::Transport { .. } => FailureKind::ModelUnavailable,
            Self::MalformedResponse(_) => FailureKind::MalformedModelResponse,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassificationPath {
    Model,
    Fallback(FallbackReason),
}

impl ClassificationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Fallback(_) => "fallback",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub result: IntentResult,
    pub path: ClassificationPath,
}

impl Classification {
    pub fn used_fallback(&self) -> bool {
        matches!(self.path, ClassificationPath::Fallback(_))
    }
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    memory: Arc<ConversationMemory>,
    availability: Arc<ModelAvailability>,
    fallback: KeywordClassifier,
}

impl IntentClassifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<ConversationMemory>,
        availability: Arc<ModelAvailability>,
    ) -> Self {
        Self { llm, memory, availability, fallback: KeywordClassifier::default() }
    }

    pub fn with_fallback_confidence(mut self, confidence: f64) -> Self {
        self.fallback = KeywordClassifier::new(confidence);
        self
    }

    /// Always resolves to a usable result. Model failures are reported in
    /// the returned path, never as errors.
    pub async fn classify(&self, message: &str, key: &ConversationKey) -> Classification {
        if !self.availability.is_available() {
            return self.fall_back(message, key, FallbackReason::ModelUnavailable);
        }

        let context = self.memory.recent_context(key).await;
        let prompt = build_prompt(message, &context);

        let raw = match self.llm.complete(CLASSIFIER_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                let unavailable = error.is_unavailable();
                if unavailable {
                    self.availability.mark_unavailable(&error.to_string());
                }
                let reason = FallbackReason::Transport { unavailable, message: error.to_string() };
                return self.fall_back(message, key, reason);
            }
        };

        match interpret_model_reply(&raw) {
            Ok(result) => {
                self.memory.append(key, MemoryEntry::intent_detection(message, &result)).await;
                info!(
                    event_name = "agent.classifier.model",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    intent = %result.intent,
                    confidence = result.confidence,
                    "intent classified by model"
                );
                Classification { result, path: ClassificationPath::Model }
            }
            Err(reason) => {
                warn!(
                    event_name = "agent.classifier.malformed_response",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    reason = %reason,
                    raw_response = %raw,
                    "model reply was not a usable classification"
                );
                self.fall_back(message, key, FallbackReason::MalformedResponse(reason))
            }
        }
    }

    fn fall_back(
        &self,
        message: &str,
        key: &ConversationKey,
        reason: FallbackReason,
    ) -> Classification {
        let result = self.fallback.classify(message);
        warn!(
            event_name = "agent.classifier.fallback",
            user_id = %key.user_id,
            conversation_id = %key.conversation_id,
            failure = %reason.failure_kind(),
            reason = ?reason,
            intent = %result.intent,
            "using keyword classifier"
        );
        Classification { result, path: ClassificationPath::Fallback(reason) }
    }
}

fn build_prompt(message: &str, context: &str) -> String {
    if context.is_empty() {
        format!("Message: {message}")
    } else {
        format!("Recent conversation:\n{context}\n\nMessage: {message}")
    }
}

fn interpret_model_reply(raw: &str) -> Result<IntentResult, String> {
    let object = parse_model_json(raw).map_err(|error| error.to_string())?;
    for field in ["intent", "confidence", "entities"] {
        if !has_value(&object, field) {
            return Err(format!("missing `{field}`"));
        }
    }

    let mut result = serde_json::from_value::<IntentResult>(Value::Object(object))
        .map_err(|error| error.to_string())?;
    result.confidence = result.confidence.clamp(0.0, 1.0);
    Ok(result)
}

fn has_value(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).is_some_and(|value| !value.is_null())
}
