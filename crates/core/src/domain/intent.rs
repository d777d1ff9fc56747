use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::extraction::ExtractedFinancialData;
use crate::extractor::normalize_date;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CreateInvoice,
    RecordTransaction,
    GenerateBalanceSheet,
    GeneralInquiry,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::CreateInvoice,
        Intent::RecordTransaction,
        Intent::GenerateBalanceSheet,
        Intent::GeneralInquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateInvoice => "CREATE_INVOICE",
            Self::RecordTransaction => "RECORD_TRANSACTION",
            Self::GenerateBalanceSheet => "GENERATE_BALANCE_SHEET",
            Self::GeneralInquiry => "GENERAL_INQUIRY",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent `{0}`")]
pub struct UnknownIntent(pub String);

impl std::str::FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| UnknownIntent(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Entities as reported by the model. Every field is optional and lenient:
/// numbers are kept as their decimal text, blanks and nulls become `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentEntities {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub entities: IntentEntities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            entities: IntentEntities::default(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Merges model-reported entities with pattern-extracted ones. Model values
/// win whenever present; regex values fill the rest.
pub fn merge_entities(
    model: &IntentEntities,
    extracted: &ExtractedFinancialData,
) -> ExtractedFinancialData {
    let from_model = ExtractedFinancialData {
        amount: model.amount.as_deref().map(|amount| amount.replace(['$', ','], "")),
        date: model.date.as_deref().and_then(normalize_date),
        client: model.client.clone(),
        email: None,
        invoice_number: None,
        description: model.description.clone(),
    };
    from_model.or(extracted)
}

/// Reads an optional model-supplied field as trimmed text. Numbers keep their
/// decimal spelling; blanks, nulls and other JSON types become `None`.
pub fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{merge_entities, Intent, IntentEntities, IntentResult};
    use crate::domain::extraction::ExtractedFinancialData;

    #[test]
    fn intent_parsing_accepts_loose_spellings() {
        assert_eq!("create_invoice".parse::<Intent>(), Ok(Intent::CreateInvoice));
        assert_eq!("Generate Balance Sheet".parse::<Intent>(), Ok(Intent::GenerateBalanceSheet));
        assert!("REFUND".parse::<Intent>().is_err());
    }

    #[test]
    fn deserializes_model_payload_with_numeric_amount() {
        let result: IntentResult = serde_json::from_value(json!({
            "intent": "RECORD_TRANSACTION",
            "confidence": 0.82,
            "entities": { "amount": 45.5, "description": "  coffee  ", "client": null, "date": "" },
            "reasoning": "user spent money"
        }))
        .expect("valid payload");

        assert_eq!(result.intent, Intent::RecordTransaction);
        assert_eq!(result.entities.amount.as_deref(), Some("45.5"));
        assert_eq!(result.entities.description.as_deref(), Some("coffee"));
        assert_eq!(result.entities.client, None);
        assert_eq!(result.entities.date, None);
    }

    #[test]
    fn model_fields_take_precedence_and_regex_fills_nulls() {
        let model = IntentEntities {
            client: Some("Jane Doe".to_string()),
            amount: None,
            description: Some("logo design".to_string()),
            date: Some("2024-02-10".to_string()),
        };
        let extracted = ExtractedFinancialData {
            client: Some("Jane".to_string()),
            amount: Some("500".to_string()),
            email: Some("jane@example.com".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };

        let merged = merge_entities(&model, &extracted);
        assert_eq!(merged.client.as_deref(), Some("Jane Doe"));
        assert_eq!(merged.amount.as_deref(), Some("500"));
        assert_eq!(merged.description.as_deref(), Some("logo design"));
        assert_eq!(merged.date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(merged.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn unparseable_model_date_falls_back_to_extracted_date() {
        let model = IntentEntities { date: Some("next tuesday".to_string()), ..Default::default() };
        let extracted = ExtractedFinancialData {
            date: NaiveDate::from_ymd_opt(2024, 5, 4),
            ..Default::default()
        };

        assert_eq!(merge_entities(&model, &extracted).date, NaiveDate::from_ymd_opt(2024, 5, 4));
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(IntentResult::new(Intent::GeneralInquiry, 1.7).confidence, 1.0);
        assert_eq!(IntentResult::new(Intent::GeneralInquiry, -0.2).confidence, 0.0);
    }
}
