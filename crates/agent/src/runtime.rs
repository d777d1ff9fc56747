use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use ledgerchat_core::config::AppConfig;
use ledgerchat_core::domain::conversation::ConversationKey;
use ledgerchat_core::domain::extraction::ExtractedFinancialData;
use ledgerchat_core::domain::intent::merge_entities;
use ledgerchat_core::errors::FailureKind;
use ledgerchat_core::extractor::PatternExtractor;
use ledgerchat_core::memory::{ConversationMemory, MemoryEntry};
use ledgerchat_ledger::AccountingBackend;

use crate::availability::ModelAvailability;
use crate::classifier::IntentClassifier;
use crate::conversation::ConversationResponder;
use crate::dispatcher::{format_money, ActionResponse, DispatchOutcome, Dispatcher};
use crate::documents::{DocumentError, DocumentExtractor, DocumentParser, PlainTextDocumentParser};
use crate::llm::{HttpLlmClient, LlmClient, LlmError};

const AFFIRMATIVE_REPLIES: &[&str] = &[
    "yes",
    "y",
    "yep",
    "yeah",
    "sure",
    "ok",
    "okay",
    "confirm",
    "confirmed",
    "go ahead",
    "create it",
    "do it",
    "yes please",
    "please do",
];
const NEGATIVE_REPLIES: &[&str] =
    &["no", "n", "nope", "cancel", "discard", "never mind", "nevermind", "no thanks"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Confirmation {
    Affirm,
    Decline,
}

fn confirmation_reply(text: &str) -> Option<Confirmation> {
    let normalized = text
        .trim()
        .trim_end_matches(|ch: char| matches!(ch, '.' | '!' | ','))
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if AFFIRMATIVE_REPLIES.contains(&normalized.as_str()) {
        Some(Confirmation::Affirm)
    } else if NEGATIVE_REPLIES.contains(&normalized.as_str()) {
        Some(Confirmation::Decline)
    } else {
        None
    }
}

/// Composition root. Owns the shared memory store and availability flag and
/// hands them to every component that needs them.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    memory: Arc<ConversationMemory>,
    availability: Arc<ModelAvailability>,
    extractor: PatternExtractor,
    classifier: IntentClassifier,
    dispatcher: Dispatcher,
    documents: DocumentExtractor,
    parser: Arc<dyn DocumentParser>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        accounting: Arc<dyn AccountingBackend>,
        memory: Arc<ConversationMemory>,
        availability: Arc<ModelAvailability>,
    ) -> Self {
        let classifier = IntentClassifier::new(llm.clone(), memory.clone(), availability.clone());
        let responder =
            ConversationResponder::new(llm.clone(), memory.clone(), availability.clone());
        let documents = DocumentExtractor::new(llm.clone(), availability.clone());

        Self {
            llm,
            memory,
            availability,
            extractor: PatternExtractor::new(),
            classifier,
            dispatcher: Dispatcher::new(accounting, responder),
            documents,
            parser: Arc::new(PlainTextDocumentParser),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        accounting: Arc<dyn AccountingBackend>,
    ) -> Result<Self, LlmError> {
        let llm = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        let memory = Arc::new(ConversationMemory::new(
            config.assistant.history_limit,
            config.assistant.context_window,
        ));
        let availability = Arc::new(ModelAvailability::new(config.llm.enabled));

        let mut runtime = Self::new(llm, accounting, memory, availability);
        runtime.classifier = runtime
            .classifier
            .with_fallback_confidence(config.assistant.fallback_confidence);
        Ok(runtime)
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn availability(&self) -> &Arc<ModelAvailability> {
        &self.availability
    }

    /// One-time startup check. Returns whether the model path is usable.
    pub async fn probe_model(&self) -> bool {
        if !self.availability.is_available() {
            return false;
        }

        match self.llm.health_check().await {
            Ok(()) => {
                info!(event_name = "agent.runtime.model_probe_ok", "model endpoint reachable");
                true
            }
            Err(error) if error.is_unavailable() => {
                self.availability.mark_unavailable(&error.to_string());
                false
            }
            Err(error) => {
                warn!(
                    event_name = "agent.runtime.model_probe_degraded",
                    error = %error,
                    "model health check failed; keeping model path enabled"
                );
                true
            }
        }
    }

    pub async fn handle_message(&self, key: &ConversationKey, text: &str) -> ActionResponse {
        let text = text.trim();
        if text.is_empty() {
            return ActionResponse::clarification(
                "Tell me what you'd like to do, for example \
                 \"Create an invoice for Jane for $500\".",
            );
        }

        if let Some(response) = self.resolve_pending(key, text).await {
            self.record_turn(key, text, &response).await;
            return response;
        }

        let (extracted, classification) = tokio::join!(
            async { self.extractor.extract(text) },
            self.classifier.classify(text, key)
        );
        let entities = merge_entities(&classification.result.entities, &extracted);
        let response = self.dispatcher.dispatch(&classification.result, &entities, key, text).await;

        info!(
            event_name = "agent.runtime.message_handled",
            user_id = %key.user_id,
            conversation_id = %key.conversation_id,
            intent = %classification.result.intent,
            path = classification.path.as_str(),
            outcome = response.outcome.as_str(),
            "message handled"
        );
        self.record_turn(key, text, &response).await;
        response
    }

    /// Parses an uploaded document, extracts invoice fields and parks them as
    /// the conversation's pending extraction until the user confirms.
    pub async fn handle_document(
        &self,
        key: &ConversationKey,
        path: &Path,
        mime_type: &str,
    ) -> ActionResponse {
        let text = match self.parser.parse(path, mime_type).await {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    event_name = "agent.runtime.document_unreadable",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %error,
                    "document could not be parsed"
                );
                return document_error_response(&error);
            }
        };

        let extraction = self.documents.extract(&text).await;
        let data = extraction.data;
        let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned());
        let user_message =
            format!("Uploaded document {}", file_name.as_deref().unwrap_or("(unnamed)"));

        if data.client.is_none() && data.amount.is_none() {
            let response = ActionResponse::clarification(
                "I couldn't find a client or an amount in that document. \
                 You can type the invoice details instead.",
            );
            self.record_turn(key, &user_message, &response).await;
            return response;
        }

        self.memory.set_pending(key, data.clone()).await;
        info!(
            event_name = "agent.runtime.document_pending",
            user_id = %key.user_id,
            conversation_id = %key.conversation_id,
            source = ?extraction.source,
            "document extraction awaiting confirmation"
        );

        let response = ActionResponse {
            message: pending_summary(&data),
            data: serde_json::to_value(&data).ok(),
            outcome: DispatchOutcome::NeedsClarification,
        };
        self.record_turn(key, &user_message, &response).await;
        response
    }

    async fn resolve_pending(&self, key: &ConversationKey, text: &str) -> Option<ActionResponse> {
        let confirmation = confirmation_reply(text)?;
        let pending = self.memory.get_pending(key).await?;

        match confirmation {
            Confirmation::Affirm => {
                let response = self.dispatcher.create_invoice(&pending, key).await;
                let retryable = response.outcome
                    == DispatchOutcome::ExternalFailure(FailureKind::ExternalOperationFailure);
                if !retryable {
                    self.memory.clear_pending(key).await;
                }
                info!(
                    event_name = "agent.runtime.pending_confirmed",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    outcome = response.outcome.as_str(),
                    kept = retryable,
                    "pending extraction confirmed"
                );
                Some(response)
            }
            Confirmation::Decline => {
                self.memory.clear_pending(key).await;
                info!(
                    event_name = "agent.runtime.pending_declined",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    "pending extraction discarded"
                );
                Some(ActionResponse::declined(
                    "Okay, I discarded the extracted invoice details.",
                ))
            }
        }
    }

    async fn record_turn(&self, key: &ConversationKey, text: &str, response: &ActionResponse) {
        self.memory.append(key, MemoryEntry::conversation(text, &response.message)).await;
    }
}

fn document_error_response(error: &DocumentError) -> ActionResponse {
    let message = match error {
        DocumentError::Unsupported(_) => {
            "I can only read plain text, CSV, Markdown and JSON documents.".to_string()
        }
        DocumentError::Empty(_) => "That document doesn't contain any text.".to_string(),
        DocumentError::Io { .. } => "Sorry, I couldn't open that document.".to_string(),
    };
    ActionResponse::failure(FailureKind::ExternalOperationFailure, message)
}

fn pending_summary(data: &ExtractedFinancialData) -> String {
    let mut lines = vec!["I found these invoice details:".to_string()];
    if let Some(client) = &data.client {
        lines.push(format!("- Client: {client}"));
    }
    if let Some(email) = &data.email {
        lines.push(format!("- Email: {email}"));
    }
    match (data.amount_value(), &data.amount) {
        (Some(amount), _) => lines.push(format!("- Amount: {}", format_money(amount))),
        (None, Some(raw)) => lines.push(format!("- Amount: {raw}")),
        (None, None) => {}
    }
    if let Some(date) = data.date {
        lines.push(format!("- Date: {date}"));
    }
    if let Some(number) = &data.invoice_number {
        lines.push(format!("- Invoice number: {number}"));
    }
    if let Some(description) = &data.description {
        lines.push(format!("- Description: {description}"));
    }
    lines.push("Reply \"yes\" to create the invoice or \"no\" to discard it.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use ledgerchat_core::config::AppConfig;
    use ledgerchat_core::domain::conversation::ConversationKey;
    use ledgerchat_core::memory::{ConversationMemory, MemoryEntry};
    use ledgerchat_ledger::InMemoryAccounting;

    use super::{confirmation_reply, AgentRuntime, Confirmation};
    use crate::availability::ModelAvailability;
    use crate::dispatcher::DispatchOutcome;
    use crate::llm::{LlmClient, LlmError};

    const DOCUMENT_REPLY: &str = r#"{"client": "Acme Corp", "amount": 1200, "date": "2024-03-01",
        "invoiceNumber": "1042", "email": null, "description": "Website development"}"#;

    struct StubLlm {
        reply: Result<String, LlmError>,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.reply.clone()
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(LlmError::Unreachable("connection refused".to_string()))
            }
        }
    }

    fn runtime(
        reply: Result<String, LlmError>,
        available: bool,
    ) -> (AgentRuntime, Arc<InMemoryAccounting>) {
        runtime_with_health(reply, available, available)
    }

    fn runtime_with_health(
        reply: Result<String, LlmError>,
        available: bool,
        healthy: bool,
    ) -> (AgentRuntime, Arc<InMemoryAccounting>) {
        let books = Arc::new(InMemoryAccounting::new());
        let llm = Arc::new(StubLlm { reply, healthy: AtomicBool::new(healthy) });
        let runtime = AgentRuntime::new(
            llm,
            books.clone(),
            Arc::new(ConversationMemory::default()),
            Arc::new(ModelAvailability::new(available)),
        );
        (runtime, books)
    }

    fn key() -> ConversationKey {
        ConversationKey::new("user-1", "conv-1")
    }

    fn document(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().expect("temp file");
        write!(file, "{contents}").expect("write document");
        file
    }

    #[tokio::test]
    async fn offline_invoice_request_uses_fallback_and_pattern_entities() {
        let (runtime, books) = runtime(Err(LlmError::Unreachable("down".to_string())), false);

        let response = runtime.handle_message(&key(), "Create an invoice for Jane for $500").await;

        assert_eq!(response.outcome, DispatchOutcome::Completed);
        assert!(response.message.contains("INV-0001"));
        assert!(response.message.contains("Jane"));
        let invoices = books.invoices("user-1").await;
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount.to_string(), "500");

        let history = runtime.memory().history(&key()).await;
        assert!(matches!(history.as_slice(), [MemoryEntry::Conversation { .. }]));
    }

    #[tokio::test]
    async fn network_error_mid_session_degrades_to_fallback() {
        let (runtime, books) = runtime(Err(LlmError::Unreachable("refused".to_string())), true);

        let response = runtime.handle_message(&key(), "I spent $20 on coffee").await;

        assert_eq!(response.outcome, DispatchOutcome::Completed);
        assert!(!runtime.availability().is_available());
        let transactions = books.transactions("user-1").await;
        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn blank_message_asks_for_input() {
        let (runtime, _) = runtime(Ok(String::new()), false);
        let response = runtime.handle_message(&key(), "   ").await;
        assert_eq!(response.outcome, DispatchOutcome::NeedsClarification);
        assert!(runtime.memory().history(&key()).await.is_empty());
    }

    #[tokio::test]
    async fn document_upload_then_yes_creates_invoice_and_clears_pending() {
        let (runtime, books) = runtime(Ok(DOCUMENT_REPLY.to_string()), true);
        let file = document("INVOICE #1042\nAcme Corp\nWebsite development\nTotal $1,200.00");

        let uploaded = runtime.handle_document(&key(), file.path(), "text/plain").await;
        assert_eq!(uploaded.outcome, DispatchOutcome::NeedsClarification);
        assert!(uploaded.message.contains("Acme Corp"));
        assert!(uploaded.message.contains("$1200.00"));
        assert_eq!(uploaded.data.expect("pending payload")["invoiceNumber"], json!("1042"));
        assert!(runtime.memory().get_pending(&key()).await.is_some());

        let confirmed = runtime.handle_message(&key(), "Yes!").await;
        assert_eq!(confirmed.outcome, DispatchOutcome::Completed);
        assert!(confirmed.message.contains("Acme Corp"));
        assert!(runtime.memory().get_pending(&key()).await.is_none());

        let invoices = books.invoices("user-1").await;
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].description, "Website development");
    }

    #[tokio::test]
    async fn declining_discards_pending_extraction() {
        let (runtime, books) = runtime(Ok(DOCUMENT_REPLY.to_string()), true);
        let file = document("Acme Corp invoice, $1,200.00");
        runtime.handle_document(&key(), file.path(), "text/plain").await;

        let declined = runtime.handle_message(&key(), "cancel").await;

        assert_eq!(declined.outcome, DispatchOutcome::Declined);
        assert!(runtime.memory().get_pending(&key()).await.is_none());
        assert!(books.invoices("user-1").await.is_empty());
    }

    #[tokio::test]
    async fn unrelated_message_leaves_pending_in_place() {
        let (runtime, _) = runtime(Ok(DOCUMENT_REPLY.to_string()), true);
        let file = document("Acme Corp invoice, $1,200.00");
        runtime.handle_document(&key(), file.path(), "text/plain").await;

        let response = runtime.handle_message(&key(), "show me my balance").await;

        assert_eq!(response.outcome, DispatchOutcome::Completed);
        assert!(runtime.memory().get_pending(&key()).await.is_some());
    }

    #[tokio::test]
    async fn unsupported_document_type_is_reported() {
        let (runtime, _) = runtime(Ok(DOCUMENT_REPLY.to_string()), true);
        let file = document("%PDF-1.7");

        let response = runtime.handle_document(&key(), file.path(), "application/pdf").await;

        assert!(response.message.contains("plain text"));
        assert!(runtime.memory().get_pending(&key()).await.is_none());
    }

    #[tokio::test]
    async fn failed_probe_marks_model_unavailable() {
        let (runtime, _) = runtime_with_health(Ok(String::new()), true, false);

        assert!(!runtime.probe_model().await);
        assert!(!runtime.availability().is_available());
    }

    #[test]
    fn from_config_respects_disabled_model() {
        let mut config = AppConfig::default();
        config.llm.enabled = false;

        let runtime = AgentRuntime::from_config(&config, Arc::new(InMemoryAccounting::new()))
            .expect("runtime builds");
        assert!(!runtime.availability().is_available());
    }

    #[test]
    fn confirmation_replies_are_normalized() {
        assert_eq!(confirmation_reply("  Go   ahead. "), Some(Confirmation::Affirm));
        assert_eq!(confirmation_reply("NO"), Some(Confirmation::Decline));
        assert_eq!(confirmation_reply("yes, bill Bob instead"), None);
    }
}
