use sqlx::PgExecutor;
use uuid::Uuid;

use crate::domain::sepay::{SepayTransaction, SepayTransactionStatus};
use crate::error::AppResult;

const COLUMNS: &str = "id, sepay_transaction_id, gateway, account_number, transfer_type, \
     transfer_amount, content, code, reference_code, description, transaction_date, status, \
     invoice_id, payment_id, processed_at, created_at";

pub struct NewSepayTransaction {
    pub sepay_transaction_id: String,
    pub gateway: String,
    pub account_number: String,
    pub transfer_type: String,
    pub transfer_amount: i64,
    pub content: String,
    pub code: Option<String>,
    pub reference_code: Option<String>,
    pub description: Option<String>,
    pub transaction_date: String,
}

pub async fn exists_by_external_id(
    executor: impl PgExecutor<'_>,
    sepay_transaction_id: &str,
) -> AppResult<bool> {
    let found: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM sepay_transactions WHERE sepay_transaction_id = $1 LIMIT 1")
            .bind(sepay_transaction_id)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

/// Insert the idempotency row. Returns `None` when a row with this external
/// id already exists; the unique index is the authoritative replay guard, so
/// two concurrent deliveries cannot both get a row back.
pub async fn try_insert_received(
    executor: impl PgExecutor<'_>,
    new_transaction: &NewSepayTransaction,
) -> AppResult<Option<SepayTransaction>> {
    let inserted = sqlx::query_as::<_, SepayTransaction>(&format!(
        "INSERT INTO sepay_transactions (sepay_transaction_id, gateway, account_number, \
             transfer_type, transfer_amount, content, code, reference_code, description, \
             transaction_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (sepay_transaction_id) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(&new_transaction.sepay_transaction_id)
    .bind(&new_transaction.gateway)
    .bind(&new_transaction.account_number)
    .bind(&new_transaction.transfer_type)
    .bind(new_transaction.transfer_amount)
    .bind(&new_transaction.content)
    .bind(&new_transaction.code)
    .bind(&new_transaction.reference_code)
    .bind(&new_transaction.description)
    .bind(&new_transaction.transaction_date)
    .fetch_optional(executor)
    .await?;
    Ok(inserted)
}

/// Record the terminal classification of a logged event. Status moves exactly
/// once, from RECEIVED; the row itself is otherwise append-only.
pub async fn finalize(
    executor: impl PgExecutor<'_>,
    transaction_id: Uuid,
    status: SepayTransactionStatus,
    invoice_id: Option<Uuid>,
    payment_id: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE sepay_transactions
         SET status = $2, invoice_id = $3, payment_id = $4, processed_at = now()
         WHERE id = $1 AND status = 'received'",
    )
    .bind(transaction_id)
    .bind(status.as_str())
    .bind(invoice_id)
    .bind(payment_id)
    .execute(executor)
    .await?;
    Ok(())
}
