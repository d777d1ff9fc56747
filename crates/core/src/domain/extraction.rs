use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Financial fields pulled out of free text, either by the pattern extractor
/// or by merging model output over it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFinancialData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExtractedFinancialData {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.date.is_none()
            && self.client.is_none()
            && self.email.is_none()
            && self.invoice_number.is_none()
            && self.description.is_none()
    }

    /// Parses the decimal-string amount, tolerating a leading `$` and
    /// thousands separators.
    pub fn amount_value(&self) -> Option<Decimal> {
        self.amount.as_deref().and_then(parse_amount)
    }

    /// Fields present on `self` win; `other` only fills the gaps.
    pub fn or(self, other: &ExtractedFinancialData) -> Self {
        Self {
            amount: self.amount.or_else(|| other.amount.clone()),
            date: self.date.or(other.date),
            client: self.client.or_else(|| other.client.clone()),
            email: self.email.or_else(|| other.email.clone()),
            invoice_number: self.invoice_number.or_else(|| other.invoice_number.clone()),
            description: self.description.or_else(|| other.description.clone()),
        }
    }
}

pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(['$', ','], "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{parse_amount, ExtractedFinancialData};

    #[test]
    fn amount_value_strips_currency_formatting() {
        let data =
            ExtractedFinancialData { amount: Some("$1,250.50".to_string()), ..Default::default() };
        assert_eq!(data.amount_value(), Some(Decimal::new(125_050, 2)));
        assert_eq!(parse_amount("-20"), Some(Decimal::new(-20, 0)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("  "), None);
    }

    #[test]
    fn or_only_fills_missing_fields() {
        let primary =
            ExtractedFinancialData { client: Some("Jane".to_string()), ..Default::default() };
        let secondary = ExtractedFinancialData {
            client: Some("Bob".to_string()),
            amount: Some("40".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };

        let merged = primary.or(&secondary);
        assert_eq!(merged.client.as_deref(), Some("Jane"));
        assert_eq!(merged.amount.as_deref(), Some("40"));
        assert_eq!(merged.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(merged.email.is_none());
    }

    #[test]
    fn serializes_with_camel_case_and_iso_dates() {
        let data = ExtractedFinancialData {
            invoice_number: Some("42".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        let json = serde_json::to_value(&data).expect("serialize");
        assert_eq!(json["invoiceNumber"], "42");
        assert_eq!(json["date"], "2024-01-15");
        assert!(json.get("amount").is_none());
    }
}
