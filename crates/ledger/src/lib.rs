//! Accounting backend boundary.
//!
//! The assistant only ever talks to [`AccountingBackend`]. The in-memory
//! implementation stands in for an external accounting API.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use ledgerchat_core::domain::finance::{
    BalanceSheet, InvoiceInput, InvoiceRecord, TransactionInput, TransactionRecord,
};
use ledgerchat_core::errors::ValidationError;

pub use memory::InMemoryAccounting;

#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("accounting backend rejected the request: {0}")]
    Rejected(String),
    #[error("accounting backend is unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[async_trait]
pub trait AccountingBackend: Send + Sync {
    async fn create_invoice(&self, input: InvoiceInput) -> Result<InvoiceRecord, AccountingError>;

    async fn record_transaction(
        &self,
        input: TransactionInput,
    ) -> Result<TransactionRecord, AccountingError>;

    async fn generate_balance_sheet(&self, user_id: &str) -> Result<BalanceSheet, AccountingError>;
}
