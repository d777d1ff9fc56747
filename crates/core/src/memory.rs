use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::conversation::ConversationKey;
use crate::domain::extraction::ExtractedFinancialData;
use crate::domain::intent::{Intent, IntentResult};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEntry {
    IntentDetection {
        message: String,
        intent: Intent,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    Conversation {
        user_message: String,
        bot_response: String,
        timestamp: DateTime<Utc>,
    },
    PendingExtractedData {
        data: ExtractedFinancialData,
        timestamp: DateTime<Utc>,
    },
}

impl MemoryEntry {
    pub fn intent_detection(message: &str, result: &IntentResult) -> Self {
        Self::IntentDetection {
            message: message.to_string(),
            intent: result.intent,
            confidence: result.confidence,
            timestamp: Utc::now(),
        }
    }

    pub fn conversation(user_message: &str, bot_response: &str) -> Self {
        Self::Conversation {
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn pending(data: ExtractedFinancialData) -> Self {
        Self::PendingExtractedData { data, timestamp: Utc::now() }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::IntentDetection { timestamp, .. }
            | Self::Conversation { timestamp, .. }
            | Self::PendingExtractedData { timestamp, .. } => *timestamp,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Self::PendingExtractedData { .. })
    }

    /// Prompt-ready rendering. Pending extraction records are not part of
    /// the dialogue and render as nothing.
    fn render(&self) -> Option<String> {
        match self {
            Self::IntentDetection { message, intent, .. } => {
                Some(format!("User intent: {intent} for message \"{message}\""))
            }
            Self::Conversation { user_message, bot_response, .. } => {
                Some(format!("User: {user_message}\nBot: {bot_response}"))
            }
            Self::PendingExtractedData { .. } => None,
        }
    }
}

/// Per-conversation interaction history, bounded per key, with a singleton
/// pending-extraction slot.
#[derive(Debug)]
pub struct ConversationMemory {
    history_limit: usize,
    context_window: usize,
    entries: RwLock<HashMap<ConversationKey, VecDeque<MemoryEntry>>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, DEFAULT_CONTEXT_WINDOW)
    }
}

impl ConversationMemory {
    pub fn new(history_limit: usize, context_window: usize) -> Self {
        let history_limit = history_limit.max(1);
        Self {
            history_limit,
            context_window: context_window.clamp(1, history_limit),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn append(&self, key: &ConversationKey, entry: MemoryEntry) {
        let mut entries = self.entries.write().await;
        let history = entries.entry(key.clone()).or_default();
        self.push_bounded(key, history, entry);
    }

    fn push_bounded(
        &self,
        key: &ConversationKey,
        history: &mut VecDeque<MemoryEntry>,
        entry: MemoryEntry,
    ) {
        history.push_back(entry);

        let mut evicted = 0usize;
        while history.len() > self.history_limit {
            history.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                event_name = "core.memory.evicted",
                user_id = %key.user_id,
                conversation_id = %key.conversation_id,
                evicted,
                "conversation history trimmed to limit"
            );
        }
    }

    /// The most recent entries rendered oldest-first and separated by blank
    /// lines, ready to embed in a prompt.
    pub async fn recent_context(&self, key: &ConversationKey) -> String {
        let entries = self.entries.read().await;
        let Some(history) = entries.get(key) else {
            return String::new();
        };

        let skip = history.len().saturating_sub(self.context_window);
        history.iter().skip(skip).filter_map(MemoryEntry::render).collect::<Vec<_>>().join("\n\n")
    }

    pub async fn history(&self, key: &ConversationKey) -> Vec<MemoryEntry> {
        let entries = self.entries.read().await;
        entries.get(key).map(|history| history.iter().cloned().collect()).unwrap_or_default()
    }

    /// Replaces any pending extraction for the key.
    pub async fn set_pending(&self, key: &ConversationKey, data: ExtractedFinancialData) {
        let mut entries = self.entries.write().await;
        let history = entries.entry(key.clone()).or_default();
        history.retain(|entry| !entry.is_pending());
        self.push_bounded(key, history, MemoryEntry::pending(data));
    }

    pub async fn get_pending(&self, key: &ConversationKey) -> Option<ExtractedFinancialData> {
        let entries = self.entries.read().await;
        entries.get(key)?.iter().rev().find_map(|entry| match entry {
            MemoryEntry::PendingExtractedData { data, .. } => Some(data.clone()),
            _ => None,
        })
    }

    pub async fn clear_pending(&self, key: &ConversationKey) -> Option<ExtractedFinancialData> {
        let mut entries = self.entries.write().await;
        let history = entries.get_mut(key)?;
        let position = history.iter().position(MemoryEntry::is_pending)?;
        match history.remove(position) {
            Some(MemoryEntry::PendingExtractedData { data, .. }) => Some(data),
            _ => None,
        }
    }

    pub async fn clear(&self, key: &ConversationKey) {
        self.entries.write().await.remove(key);
    }
}
