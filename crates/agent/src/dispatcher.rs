use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use ledgerchat_core::domain::conversation::ConversationKey;
use ledgerchat_core::domain::extraction::ExtractedFinancialData;
use ledgerchat_core::domain::finance::{InvoiceInput, TransactionInput, TransactionType};
use ledgerchat_core::domain::intent::{Intent, IntentResult};
use ledgerchat_core::errors::FailureKind;
use ledgerchat_core::extractor::FALLBACK_DESCRIPTION;
use ledgerchat_ledger::AccountingBackend;

use crate::conversation::ConversationResponder;

const INVOICE_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't create that invoice right now. Please try again in a moment.";
const TRANSACTION_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't record that transaction right now. Please try again in a moment.";
const BALANCE_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't generate your balance sheet right now. Please try again in a moment.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    NeedsClarification,
    /// The backend call (or the input validation in front of it) failed.
    ExternalFailure(FailureKind),
    Conversational,
    Declined,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NeedsClarification => "needs_clarification",
            Self::ExternalFailure(_) => "external_failure",
            Self::Conversational => "conversational",
            Self::Declined => "declined",
        }
    }
}

/// What the caller shows the user. `data` carries the created record or
/// report when there is one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionResponse {
    pub message: String,
    pub data: Option<Value>,
    #[serde(skip)]
    pub outcome: DispatchOutcome,
}

impl ActionResponse {
    pub fn completed(message: impl Into<String>, data: Option<Value>) -> Self {
        Self { message: message.into(), data, outcome: DispatchOutcome::Completed }
    }

    pub fn clarification(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None, outcome: DispatchOutcome::NeedsClarification }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            outcome: DispatchOutcome::ExternalFailure(kind),
        }
    }

    pub fn conversational(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None, outcome: DispatchOutcome::Conversational }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None, outcome: DispatchOutcome::Declined }
    }
}

pub struct Dispatcher {
    accounting: Arc<dyn AccountingBackend>,
    responder: ConversationResponder,
}

impl Dispatcher {
    pub fn new(accounting: Arc<dyn AccountingBackend>, responder: ConversationResponder) -> Self {
        Self { accounting, responder }
    }

    /// Routes a classified message to its handler. Never fails: every
    /// failure becomes a user-facing message with `data: None`.
    pub async fn dispatch(
        &self,
        intent: &IntentResult,
        entities: &ExtractedFinancialData,
        key: &ConversationKey,
        message: &str,
    ) -> ActionResponse {
        match intent.intent {
            Intent::CreateInvoice => self.create_invoice(entities, key).await,
            Intent::RecordTransaction => self.record_transaction(entities, key).await,
            Intent::GenerateBalanceSheet => self.balance_sheet(key).await,
            Intent::GeneralInquiry => {
                ActionResponse::conversational(self.responder.respond(message, key).await)
            }
        }
    }

    pub async fn create_invoice(
        &self,
        entities: &ExtractedFinancialData,
        key: &ConversationKey,
    ) -> ActionResponse {
        let client = non_blank(entities.client.as_deref());
        let amount = entities.amount_value();

        let (client, amount) = match (client, amount) {
            (Some(client), Some(amount)) => (client, amount),
            (client, amount) => {
                let mut missing = Vec::new();
                if client.is_none() {
                    missing.push("the client's name");
                }
                if amount.is_none() {
                    missing.push("the amount");
                }
                return clarify(
                    key,
                    Intent::CreateInvoice,
                    format!(
                        "I can create that invoice, but I still need {}. For example: \
                         \"Create an invoice for Jane Smith for $500 for logo design\".",
                        missing.join(" and ")
                    ),
                );
            }
        };
        if amount <= Decimal::ZERO {
            return clarify(
                key,
                Intent::CreateInvoice,
                "The invoice amount needs to be a positive number. How much should I bill?",
            );
        }

        let description =
            non_blank(entities.description.as_deref()).unwrap_or(FALLBACK_DESCRIPTION);
        let date = entities.date.unwrap_or_else(|| Utc::now().date_naive());
        let input = match InvoiceInput::new(client, amount, description, date, &key.user_id) {
            Ok(input) => input.with_email(entities.email.clone()),
            Err(validation) => {
                error!(
                    event_name = "agent.dispatch.invoice_invalid",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %validation,
                    "invoice input failed validation"
                );
                return ActionResponse::failure(FailureKind::Validation, INVOICE_FAILURE_MESSAGE);
            }
        };

        match self.accounting.create_invoice(input).await {
            Ok(record) => {
                info!(
                    event_name = "agent.dispatch.invoice_created",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    invoice_id = %record.id,
                    "invoice created"
                );
                let message = format!(
                    "Invoice {} created for {} for {}.",
                    record.id,
                    record.client,
                    format_money(record.amount)
                );
                ActionResponse::completed(message, serde_json::to_value(&record).ok())
            }
            Err(failure) => {
                error!(
                    event_name = "agent.dispatch.invoice_failed",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %failure,
                    "accounting backend failed to create invoice"
                );
                ActionResponse::failure(
                    FailureKind::ExternalOperationFailure,
                    INVOICE_FAILURE_MESSAGE,
                )
            }
        }
    }

    async fn record_transaction(
        &self,
        entities: &ExtractedFinancialData,
        key: &ConversationKey,
    ) -> ActionResponse {
        let description = non_blank(entities.description.as_deref());
        let amount = entities.amount_value().filter(|amount| !amount.is_zero());

        let (Some(amount), Some(description)) = (amount, description) else {
            return clarify(
                key,
                Intent::RecordTransaction,
                "To record a transaction I need an amount and a short description, \
                 for example \"I spent $20 on coffee\" or \"Received $300 from Acme\".",
            );
        };

        let transaction_type = TransactionType::from_amount(amount);
        let date = entities.date.unwrap_or_else(|| Utc::now().date_naive());
        let input = match TransactionInput::new(
            amount.abs(),
            description,
            date,
            transaction_type,
            &key.user_id,
        ) {
            Ok(input) => input,
            Err(validation) => {
                error!(
                    event_name = "agent.dispatch.transaction_invalid",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %validation,
                    "transaction input failed validation"
                );
                return ActionResponse::failure(
                    FailureKind::Validation,
                    TRANSACTION_FAILURE_MESSAGE,
                );
            }
        };

        match self.accounting.record_transaction(input).await {
            Ok(record) => {
                info!(
                    event_name = "agent.dispatch.transaction_recorded",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    transaction_id = %record.id,
                    transaction_type = record.transaction_type.as_str(),
                    "transaction recorded"
                );
                let message = format!(
                    "Recorded {} of {} for {}.",
                    record.transaction_type.as_str(),
                    format_money(record.amount),
                    record.description
                );
                ActionResponse::completed(message, serde_json::to_value(&record).ok())
            }
            Err(failure) => {
                error!(
                    event_name = "agent.dispatch.transaction_failed",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %failure,
                    "accounting backend failed to record transaction"
                );
                ActionResponse::failure(
                    FailureKind::ExternalOperationFailure,
                    TRANSACTION_FAILURE_MESSAGE,
                )
            }
        }
    }

    async fn balance_sheet(&self, key: &ConversationKey) -> ActionResponse {
        match self.accounting.generate_balance_sheet(&key.user_id).await {
            Ok(sheet) => {
                info!(
                    event_name = "agent.dispatch.balance_sheet_generated",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    "balance sheet generated"
                );
                let message = format!(
                    "Here is your balance sheet as of {}:\n\
                     - Total revenue: {}\n\
                     - Total expenses: {}\n\
                     - Net income: {}\n\
                     - Outstanding invoices: {} ({})",
                    sheet.as_of,
                    format_money(sheet.total_revenue),
                    format_money(sheet.total_expenses),
                    format_money(sheet.net_income),
                    sheet.outstanding_invoices,
                    format_money(sheet.outstanding_amount),
                );
                ActionResponse::completed(message, serde_json::to_value(&sheet).ok())
            }
            Err(failure) => {
                error!(
                    event_name = "agent.dispatch.balance_sheet_failed",
                    user_id = %key.user_id,
                    conversation_id = %key.conversation_id,
                    error = %failure,
                    "accounting backend failed to generate balance sheet"
                );
                ActionResponse::failure(
                    FailureKind::ExternalOperationFailure,
                    BALANCE_FAILURE_MESSAGE,
                )
            }
        }
    }
}

fn clarify(key: &ConversationKey, intent: Intent, message: impl Into<String>) -> ActionResponse {
    warn!(
        event_name = "agent.dispatch.needs_clarification",
        user_id = %key.user_id,
        conversation_id = %key.conversation_id,
        intent = %intent,
        failure = %FailureKind::InsufficientEntities,
        "not enough detail to act"
    );
    ActionResponse::clarification(message)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn format_money(amount: Decimal) -> String {
    let magnitude = amount.abs().round_dp(2);
    if amount.is_sign_negative() && !magnitude.is_zero() {
        format!("-${magnitude:.2}")
    } else {
        format!("${magnitude:.2}")
    }
}
