use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Days, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use ledgerchat_core::domain::finance::{
    BalanceSheet, InvoiceId, InvoiceInput, InvoiceRecord, InvoiceStatus, TransactionInput,
    TransactionRecord, TransactionType,
};

use crate::{AccountingBackend, AccountingError};

const PAYMENT_TERMS_DAYS: u64 = 30;

/// Process-local books keyed by user id.
#[derive(Default)]
pub struct InMemoryAccounting {
    invoices: RwLock<HashMap<String, Vec<InvoiceRecord>>>,
    transactions: RwLock<HashMap<String, Vec<TransactionRecord>>>,
    invoice_sequence: AtomicU64,
}

impl InMemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invoices(&self, user_id: &str) -> Vec<InvoiceRecord> {
        self.invoices.read().await.get(user_id).cloned().unwrap_or_default()
    }

    pub async fn transactions(&self, user_id: &str) -> Vec<TransactionRecord> {
        self.transactions.read().await.get(user_id).cloned().unwrap_or_default()
    }

    pub async fn mark_invoice_paid(
        &self,
        user_id: &str,
        invoice_id: &InvoiceId,
    ) -> Result<InvoiceRecord, AccountingError> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(user_id)
            .and_then(|records| records.iter_mut().find(|record| &record.id == invoice_id))
            .ok_or_else(|| AccountingError::Rejected(format!("unknown invoice {invoice_id}")))?;
        invoice.status = InvoiceStatus::Paid;
        Ok(invoice.clone())
    }

    fn next_invoice_id(&self) -> InvoiceId {
        let sequence = self.invoice_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        InvoiceId(format!("INV-{sequence:04}"))
    }
}

#[async_trait]
impl AccountingBackend for InMemoryAccounting {
    async fn create_invoice(&self, input: InvoiceInput) -> Result<InvoiceRecord, AccountingError> {
        let due_date = input
            .date
            .checked_add_days(Days::new(PAYMENT_TERMS_DAYS))
            .ok_or_else(|| AccountingError::Rejected("invoice date out of range".to_string()))?;

        let record = InvoiceRecord {
            id: self.next_invoice_id(),
            client: input.client,
            amount: input.amount,
            description: input.description,
            date: input.date,
            due_date,
            status: InvoiceStatus::Draft,
            user_id: input.user_id,
            email: input.email,
        };

        self.invoices
            .write()
            .await
            .entry(record.user_id.clone())
            .or_default()
            .push(record.clone());

        info!(
            event_name = "ledger.memory.invoice_created",
            user_id = %record.user_id,
            invoice_id = %record.id,
            "invoice stored"
        );
        Ok(record)
    }

    async fn record_transaction(
        &self,
        input: TransactionInput,
    ) -> Result<TransactionRecord, AccountingError> {
        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            amount: input.amount,
            description: input.description,
            date: input.date,
            transaction_type: input.transaction_type,
            user_id: input.user_id,
        };

        self.transactions
            .write()
            .await
            .entry(record.user_id.clone())
            .or_default()
            .push(record.clone());

        info!(
            event_name = "ledger.memory.transaction_recorded",
            user_id = %record.user_id,
            transaction_id = %record.id,
            transaction_type = record.transaction_type.as_str(),
            "transaction stored"
        );
        Ok(record)
    }

    async fn generate_balance_sheet(&self, user_id: &str) -> Result<BalanceSheet, AccountingError> {
        let transactions = self.transactions(user_id).await;
        let invoices = self.invoices(user_id).await;

        let total_for = |kind: TransactionType| {
            checked_total(
                transactions
                    .iter()
                    .filter(|record| record.transaction_type == kind)
                    .map(|record| record.amount),
                kind.as_str(),
            )
        };
        let total_revenue = total_for(TransactionType::Income)?;
        let total_expenses = total_for(TransactionType::Expense)?;
        let net_income = total_revenue.checked_sub(total_expenses).ok_or_else(|| {
            AccountingError::Rejected("net income is outside the representable range".to_string())
        })?;

        let outstanding = invoices.iter().filter(|invoice| invoice.status.is_outstanding());
        let outstanding_invoices = outstanding.clone().count() as u32;
        let outstanding_amount =
            checked_total(outstanding.map(|invoice| invoice.amount), "outstanding invoice")?;

        Ok(BalanceSheet {
            total_revenue,
            total_expenses,
            net_income,
            outstanding_invoices,
            outstanding_amount,
            as_of: Utc::now().date_naive(),
        })
    }
}

fn checked_total(
    mut amounts: impl Iterator<Item = Decimal>,
    label: &str,
) -> Result<Decimal, AccountingError> {
    amounts.try_fold(Decimal::ZERO, |total, amount| {
        total.checked_add(amount).ok_or_else(|| {
            AccountingError::Rejected(format!("{label} total is outside the representable range"))
        })
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use ledgerchat_core::domain::finance::{
        InvoiceId, InvoiceInput, InvoiceStatus, TransactionInput, TransactionType,
    };

    use crate::{AccountingBackend, AccountingError, InMemoryAccounting};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date")
    }

    fn invoice(client: &str, amount: i64) -> InvoiceInput {
        InvoiceInput::new(client, Decimal::new(amount, 0), "Consulting", date(), "user-1")
            .expect("valid invoice")
    }

    fn transaction(amount: i64, kind: TransactionType) -> TransactionInput {
        TransactionInput::new(Decimal::new(amount, 0), "misc", date(), kind, "user-1")
            .expect("valid transaction")
    }

    #[tokio::test]
    async fn invoices_get_sequential_ids_and_payment_terms() {
        let books = InMemoryAccounting::new();
        let first = books.create_invoice(invoice("Jane", 500)).await.expect("first invoice");
        let second = books.create_invoice(invoice("Bob", 200)).await.expect("second invoice");

        assert_eq!(first.id, InvoiceId("INV-0001".to_string()));
        assert_eq!(second.id, InvoiceId("INV-0002".to_string()));
        assert_eq!(first.status, InvoiceStatus::Draft);
        assert_eq!(first.due_date, NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"));
        assert_eq!(books.invoices("user-1").await.len(), 2);
    }

    #[tokio::test]
    async fn balance_sheet_sums_by_type_and_counts_outstanding() {
        let books = InMemoryAccounting::new();
        books.record_transaction(transaction(100, TransactionType::Income)).await.expect("income");
        books.record_transaction(transaction(40, TransactionType::Expense)).await.expect("expense");
        let paid = books.create_invoice(invoice("Jane", 500)).await.expect("invoice");
        books.create_invoice(invoice("Bob", 250)).await.expect("invoice");
        books.create_invoice(invoice("Ann", 50)).await.expect("invoice");
        books.mark_invoice_paid("user-1", &paid.id).await.expect("mark paid");

        let sheet = books.generate_balance_sheet("user-1").await.expect("balance sheet");
        assert_eq!(sheet.total_revenue, Decimal::new(100, 0));
        assert_eq!(sheet.total_expenses, Decimal::new(40, 0));
        assert_eq!(sheet.net_income, Decimal::new(60, 0));
        assert_eq!(sheet.outstanding_invoices, 2);
        assert_eq!(sheet.outstanding_amount, Decimal::new(300, 0));
    }

    #[tokio::test]
    async fn balance_sheet_rejects_totals_past_decimal_range() {
        let books = InMemoryAccounting::new();
        for _ in 0..2 {
            let huge = TransactionInput::new(
                Decimal::MAX,
                "windfall",
                date(),
                TransactionType::Income,
                "user-1",
            )
            .expect("valid transaction");
            books.record_transaction(huge).await.expect("income");
        }

        let result = books.generate_balance_sheet("user-1").await;
        assert!(matches!(result, Err(AccountingError::Rejected(_))));
    }

    #[tokio::test]
    async fn books_are_isolated_per_user() {
        let books = InMemoryAccounting::new();
        books.record_transaction(transaction(100, TransactionType::Income)).await.expect("income");

        let sheet = books.generate_balance_sheet("someone-else").await.expect("balance sheet");
        assert_eq!(sheet.total_revenue, Decimal::ZERO);
        assert_eq!(sheet.outstanding_invoices, 0);
    }

    #[tokio::test]
    async fn marking_unknown_invoice_is_rejected() {
        let books = InMemoryAccounting::new();
        let result = books.mark_invoice_paid("user-1", &InvoiceId("INV-9999".to_string())).await;
        assert!(result.is_err());
    }
}
