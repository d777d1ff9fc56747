use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub String);

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Positive amounts are income, everything else is an expense.
    pub fn from_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Self::Income
        } else {
            Self::Expense
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

/// A validated invoice request. Construct through [`InvoiceInput::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
    pub client: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl InvoiceInput {
    pub fn new(
        client: &str,
        amount: Decimal,
        description: &str,
        date: NaiveDate,
        user_id: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            client: required("client", client)?,
            amount: positive("amount", amount)?,
            description: description_text(description)?,
            date,
            user_id: required("userId", user_id)?,
            email: None,
        })
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|value| !value.trim().is_empty());
        self
    }
}

/// A validated ledger transaction. `amount` is the magnitude; the direction
/// lives in `transaction_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub user_id: String,
}

impl TransactionInput {
    pub fn new(
        amount: Decimal,
        description: &str,
        date: NaiveDate,
        transaction_type: TransactionType,
        user_id: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            amount: positive("amount", amount)?,
            description: description_text(description)?,
            date,
            transaction_type,
            user_id: required("userId", user_id)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub client: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
    pub outstanding_invoices: u32,
    pub outstanding_amount: Decimal,
    pub as_of: NaiveDate,
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(trimmed.to_string())
}

fn positive(field: &'static str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount { field, value });
    }
    Ok(value)
}

fn description_text(value: &str) -> Result<String, ValidationError> {
    let description = required("description", value)?;
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ValidationError::TooLong { field: "description", max: MAX_DESCRIPTION_CHARS });
    }
    Ok(description)
}
