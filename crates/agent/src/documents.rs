//! Document path: read an uploaded file as text, then pull invoice fields out
//! of it with the model, filling gaps from the pattern extractor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use ledgerchat_core::domain::extraction::ExtractedFinancialData;
use ledgerchat_core::domain::intent::lenient_text;
use ledgerchat_core::extractor::{normalize_date, PatternExtractor};
use ledgerchat_core::response_parser::parse_model_json;

use crate::availability::ModelAvailability;
use crate::llm::LlmClient;

pub const SUPPORTED_MIME_TYPES: [&str; 4] =
    ["text/plain", "text/csv", "text/markdown", "application/json"];

const MAX_DOCUMENT_CHARS: usize = 8_000;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract invoice details from document text.

Return a single JSON object and nothing else, using null for anything the document does not state:
{"client": null, "email": null, "amount": null, "date": null, "invoiceNumber": null, "description": null}

client is the billed person or company, amount is the total as a plain number without currency
symbols, date is the invoice date as YYYY-MM-DD, description is a short summary of the work."#;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document type `{0}`")]
    Unsupported(String),
    #[error("document `{}` contains no text", .0.display())]
    Empty(PathBuf),
    #[error("could not read document `{}`: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path, mime_type: &str) -> Result<String, DocumentError>;
}

/// Reads text-like uploads as UTF-8 (lossy).
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextDocumentParser;

#[async_trait]
impl DocumentParser for PlainTextDocumentParser {
    async fn parse(&self, path: &Path, mime_type: &str) -> Result<String, DocumentError> {
        let essence = mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if !SUPPORTED_MIME_TYPES.contains(&essence.as_str()) {
            return Err(DocumentError::Unsupported(mime_type.to_string()));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DocumentError::Io { path: path.to_path_buf(), source })?;
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            return Err(DocumentError::Empty(path.to_path_buf()));
        }
        Ok(text)
    }
}

/// Best-effort MIME type from a file extension.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" | "text" | "log" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "md" | "markdown" => Some("text/markdown"),
        "json" => Some("application/json"),
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionSource {
    Model,
    PatternsOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentExtraction {
    pub data: ExtractedFinancialData,
    pub source: ExtractionSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentFields {
    #[serde(default, deserialize_with = "lenient_text")]
    client: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    description: Option<String>,
}

impl DocumentFields {
    fn into_data(self) -> ExtractedFinancialData {
        ExtractedFinancialData {
            amount: self.amount.map(|amount| amount.replace(['$', ','], "")),
            date: self.date.as_deref().and_then(normalize_date),
            client: self.client,
            email: self.email,
            invoice_number: self
                .invoice_number
                .map(|number| number.trim_start_matches('#').to_string()),
            description: self.description,
        }
    }
}

pub struct DocumentExtractor {
    llm: Arc<dyn LlmClient>,
    availability: Arc<ModelAvailability>,
    patterns: PatternExtractor,
}

impl DocumentExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, availability: Arc<ModelAvailability>) -> Self {
        Self { llm, availability, patterns: PatternExtractor::new() }
    }

    pub async fn extract(&self, text: &str) -> DocumentExtraction {
        let patterns = self.patterns.extract(text);
        let patterns_only = || DocumentExtraction {
            data: patterns.clone(),
            source: ExtractionSource::PatternsOnly,
        };

        if !self.availability.is_available() {
            return patterns_only();
        }

        let excerpt = text.chars().take(MAX_DOCUMENT_CHARS).collect::<String>();
        let prompt = format!("Document text:\n\n{excerpt}");

        let raw = match self.llm.complete(EXTRACTION_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                if error.is_unavailable() {
                    self.availability.mark_unavailable(&error.to_string());
                }
                warn!(
                    event_name = "agent.documents.model_failed",
                    error = %error,
                    "document extraction falling back to patterns"
                );
                return patterns_only();
            }
        };

        let fields = parse_model_json(raw.as_str())
            .map_err(|error| error.to_string())
            .and_then(|object| {
                serde_json::from_value::<DocumentFields>(Value::Object(object))
                    .map_err(|error| error.to_string())
            });

        match fields {
            Ok(fields) => {
                let data = fields.into_data().or(&patterns);
                info!(
                    event_name = "agent.documents.extracted",
                    has_client = data.client.is_some(),
                    has_amount = data.amount.is_some(),
                    "document fields extracted by model"
                );
                DocumentExtraction { data, source: ExtractionSource::Model }
            }
            Err(reason) => {
                warn!(
                    event_name = "agent.documents.malformed_response",
                    reason = %reason,
                    raw_response = %raw,
                    "document extraction reply was not usable"
                );
                patterns_only()
            }
        }
    }
}
