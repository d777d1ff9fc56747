use std::sync::Arc;

use tracing::{info, warn};

use ledgerchat_core::domain::conversation::ConversationKey;
use ledgerchat_core::memory::ConversationMemory;

use crate::availability::ModelAvailability;
use crate::llm::LlmClient;

pub const CAPABILITIES_MESSAGE: &str = "I can help with your bookkeeping. \
Ask me to create an invoice (\"Create an invoice for Jane for $500\"), \
record a transaction (\"I spent $20 on coffee\") or generate a balance sheet \
(\"Show me my balance sheet\").";

const RESPONDER_SYSTEM_PROMPT: &str = "You are a friendly bookkeeping assistant for a small \
business. You can create invoices, record income and expense transactions and produce a \
balance sheet. Answer briefly and in plain text. If the user seems to want one of those \
operations, tell them what details to include.";

/// Free-form replies for messages that map to no bookkeeping operation.
pub struct ConversationResponder {
    llm: Arc<dyn LlmClient>,
    memory: Arc<ConversationMemory>,
    availability: Arc<ModelAvailability>,
}

impl ConversationResponder {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<ConversationMemory>,
        availability: Arc<ModelAvailability>,
    ) -> Self {
        Self { llm, memory, availability }
    }

    pub async fn respond(&self, message: &str, key: &ConversationKey) -> String {
        if !self.availability.is_available() {
            return CAPABILITIES_MESSAGE.to_string();
        }

        let context = self.memory.recent_context(key).await;
        let prompt = if context.is_empty() {
            format!("User: {message}")
        } else {
            format!("Recent conversation:\n{context}\n\nUser: {message}")
        };

        match self.llm.complete(RESPONDER_SYSTEM_PROMPT, &prompt).await {
            Ok(reply) if !reply.trim().is_empty() => {
                info!(
                    event_name = "agent.conversation.model_reply",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    "general inquiry answered by model"
                );
                reply.trim().to_string()
            }
            Ok(_) => {
                warn!(
                    event_name = "agent.conversation.empty_reply",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    "model returned an empty reply"
                );
                CAPABILITIES_MESSAGE.to_string()
            }
            Err(error) => {
                if error.is_unavailable() {
                    self.availability.mark_unavailable(&error.to_string());
                }
                warn!(
                    event_name = "agent.conversation.fallback",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %error,
                    "answering with capabilities message"
                );
                CAPABILITIES_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use ledgerchat_core::domain::conversation::ConversationKey;
    use ledgerchat_core::memory::ConversationMemory;

    use super::{ConversationResponder, CAPABILITIES_MESSAGE};
    use crate::availability::ModelAvailability;
    use crate::llm::{LlmClient, LlmError};

    struct FixedLlm(Result<String, LlmError>);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.0.clone()
        }
    }

    fn responder(
        reply: Result<String, LlmError>,
    ) -> (ConversationResponder, Arc<ModelAvailability>) {
        let availability = Arc::new(ModelAvailability::default());
        let responder = ConversationResponder::new(
            Arc::new(FixedLlm(reply)),
            Arc::new(ConversationMemory::default()),
            availability.clone(),
        );
        (responder, availability)
    }

    #[tokio::test]
    async fn model_reply_is_trimmed() {
        let (responder, _) = responder(Ok("  Hello! How can I help?\n".to_string()));
        let key = ConversationKey::new("u", "c");
        assert_eq!(responder.respond("hi", &key).await, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn unreachable_model_yields_capabilities_and_flips_flag() {
        let (responder, availability) =
            responder(Err(LlmError::Unreachable("connection refused".to_string())));
        let key = ConversationKey::new("u", "c");

        assert_eq!(responder.respond("hi", &key).await, CAPABILITIES_MESSAGE);
        assert!(!availability.is_available());
    }

    #[tokio::test]
    async fn blank_reply_yields_capabilities() {
        let (responder, availability) = responder(Ok("   ".to_string()));
        let key = ConversationKey::new("u", "c");

        assert_eq!(responder.respond("hi", &key).await, CAPABILITIES_MESSAGE);
        assert!(availability.is_available());
    }
}
