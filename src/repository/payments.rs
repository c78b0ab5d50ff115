use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::error::AppResult;

const PAYMENT_COLUMNS: &str = "id, invoice_id, amount, method, status, transaction_code, \
     sepay_transaction_id, note, proof_image_url, paid_at, created_at";

pub struct NewPayment {
    pub invoice_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_code: String,
    pub sepay_transaction_id: Option<String>,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

pub async fn get_payment(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
    ))
    .bind(payment_id)
    .fetch_optional(executor)
    .await?;
    Ok(payment)
}

pub async fn list_for_invoice(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
) -> AppResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 ORDER BY created_at"
    ))
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;
    Ok(payments)
}

pub async fn find_pending_for_invoice(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments
         WHERE invoice_id = $1 AND status = 'pending'
         ORDER BY created_at
         LIMIT 1"
    ))
    .bind(invoice_id)
    .fetch_optional(executor)
    .await?;
    Ok(payment)
}

pub async fn insert_payment(
    executor: impl PgExecutor<'_>,
    new_payment: &NewPayment,
) -> AppResult<Payment> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (invoice_id, amount, method, status, transaction_code, \
             sepay_transaction_id, note, paid_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(new_payment.invoice_id)
    .bind(new_payment.amount)
    .bind(new_payment.method.as_str())
    .bind(new_payment.status.as_str())
    .bind(&new_payment.transaction_code)
    .bind(&new_payment.sepay_transaction_id)
    .bind(&new_payment.note)
    .bind(new_payment.paid_at)
    .fetch_one(executor)
    .await?;
    Ok(payment)
}

/// Promote a PENDING payment to SUCCESS in place, fixing its final amount,
/// method and receipt metadata.
pub async fn confirm_payment(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
    amount: i64,
    method: PaymentMethod,
    note: Option<&str>,
    sepay_transaction_id: Option<&str>,
    paid_at: DateTime<Utc>,
) -> AppResult<Payment> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments
         SET status = 'success', amount = $2, method = $3,
             note = COALESCE($4, note),
             sepay_transaction_id = COALESCE($5, sepay_transaction_id),
             paid_at = $6
         WHERE id = $1
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(amount)
    .bind(method.as_str())
    .bind(note)
    .bind(sepay_transaction_id)
    .bind(paid_at)
    .fetch_one(executor)
    .await?;
    Ok(payment)
}

/// Demote every other PENDING payment on the invoice to FAILED. Returns how
/// many were superseded.
pub async fn fail_other_pending(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
    keep_payment_id: Uuid,
    note: &str,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE payments
         SET status = 'failed', note = $3
         WHERE invoice_id = $1 AND id <> $2 AND status = 'pending'",
    )
    .bind(invoice_id)
    .bind(keep_payment_id)
    .bind(note)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn attach_proof(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
    proof_image_url: &str,
) -> AppResult<()> {
    sqlx::query("UPDATE payments SET proof_image_url = $2 WHERE id = $1")
        .bind(payment_id)
        .bind(proof_image_url)
        .execute(executor)
        .await?;
    Ok(())
}

/// The derived invoice total: sum of SUCCESS payment amounts.
pub async fn sum_success_amount(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE invoice_id = $1 AND status = 'success'",
    )
    .bind(invoice_id)
    .fetch_one(executor)
    .await?;
    Ok(total)
}
