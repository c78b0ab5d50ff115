//! Payment Recorder: unifies manual/cash, QR-initiated and webhook-confirmed
//! payments into one `Payment` record per funds-receipt event. Every path
//! enforces at-most-one-PENDING-payment-per-invoice and terminates in a
//! ledger recompute.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::invoice::Invoice;
use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::error::{AppError, AppResult};
use crate::repository::payments::NewPayment;
use crate::repository::{invoices, occupancy, payments};
use crate::services::ledger::{self, assert_invoice_owner};
use crate::services::notify;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub invoice: Invoice,
    /// Displayable VietQR image URL for bank-transfer payments; `None` for
    /// cash. Rendering the image is the QR collaborator's concern.
    pub qr_image_url: Option<String>,
}

/// Start (or idempotently resume) a payment attempt against an invoice.
pub async fn initiate(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
    amount: Option<i64>,
    method: PaymentMethod,
) -> AppResult<PaymentInitiation> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let invoice = invoices::get_invoice_for_update(&mut *tx, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_participant(&invoice, user_id)?;
    assert_payable(&invoice)?;

    let amount = match amount {
        Some(value) if value > 0 => value,
        Some(_) => {
            return Err(AppError::BadRequest(
                "Payment amount must be positive.".to_string(),
            ))
        }
        None => invoice.remaining_amount(),
    };

    // Re-initiation reuses the open attempt instead of stacking a duplicate.
    let payment = match payments::find_pending_for_invoice(&mut *tx, invoice_id).await? {
        Some(pending) => pending,
        None => {
            payments::insert_payment(
                &mut *tx,
                &NewPayment {
                    invoice_id,
                    amount,
                    method,
                    status: PaymentStatus::Pending,
                    transaction_code: new_transaction_code(),
                    sepay_transaction_id: None,
                    note: None,
                    paid_at: None,
                },
            )
            .await?
        }
    };
    tx.commit().await?;

    let qr_image_url = match method {
        PaymentMethod::BankQr | PaymentMethod::Sepay => {
            build_qr_url(state, &invoice, payment.amount).await?
        }
        PaymentMethod::Cash => None,
    };

    Ok(PaymentInitiation {
        payment,
        invoice,
        qr_image_url,
    })
}

/// Landlord-side confirmation that money arrived. Promotes the open PENDING
/// payment in place when one exists; otherwise records a SUCCESS payment
/// directly. Ends with a ledger recompute.
pub async fn confirm_manual(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
    amount: i64,
    method: PaymentMethod,
    note: Option<String>,
) -> AppResult<(Payment, Invoice)> {
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "Payment amount must be positive.".to_string(),
        ));
    }

    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let invoice = invoices::get_invoice_for_update(&mut *tx, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_owner(&invoice, user_id)?;
    assert_payable(&invoice)?;

    let payment =
        confirm_or_create_success(&mut tx, invoice_id, amount, method, note.as_deref(), None)
            .await?;
    let invoice = ledger::recompute_status(&mut tx, invoice_id).await?;
    tx.commit().await?;

    notify_payment_confirmed(state, &invoice, &payment).await;
    Ok((payment, invoice))
}

/// Landlord-side confirmation of a QR attempt (after checking the bank
/// statement). Only valid on a PENDING payment; every other PENDING attempt
/// on the invoice is superseded.
pub async fn confirm_qr(
    state: &AppState,
    user_id: Uuid,
    payment_id: Uuid,
) -> AppResult<(Payment, Invoice)> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let payment = payments::get_payment(&mut *tx, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))?;
    let invoice = invoices::get_invoice_for_update(&mut *tx, payment.invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_owner(&invoice, user_id)?;

    if payment.status != PaymentStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Only pending payments can be confirmed (current status: {}).",
            payment.status.as_str()
        )));
    }

    let confirmed = payments::confirm_payment(
        &mut *tx,
        payment_id,
        payment.amount,
        payment.method,
        None,
        None,
        Utc::now(),
    )
    .await?;

    // A tenant double-submitting two QR attempts must not leave a second
    // confirmable PENDING row behind.
    let superseded = payments::fail_other_pending(
        &mut *tx,
        payment.invoice_id,
        payment_id,
        &format!(
            "Superseded by confirmed payment {}",
            confirmed.transaction_code
        ),
    )
    .await?;
    if superseded > 0 {
        tracing::info!(
            invoice_id = %payment.invoice_id,
            superseded,
            "Demoted stale pending payments"
        );
    }

    let invoice = ledger::recompute_status(&mut tx, payment.invoice_id).await?;
    tx.commit().await?;

    notify_payment_confirmed(state, &invoice, &confirmed).await;
    Ok((confirmed, invoice))
}

/// Attach a transfer-proof image reference to an open payment attempt. File
/// storage itself is external; only the opaque reference is kept.
pub async fn attach_proof(
    state: &AppState,
    user_id: Uuid,
    payment_id: Uuid,
    file_ref: &str,
) -> AppResult<Payment> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let payment = payments::get_payment(&mut *tx, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))?;
    let invoice = invoices::get_invoice_for_update(&mut *tx, payment.invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_participant(&invoice, user_id)?;

    // Re-read under the invoice lock: a confirmation racing this upload has
    // either already flipped the payment or is now waiting behind us.
    let payment = payments::get_payment(&mut *tx, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))?;
    if payment.status != PaymentStatus::Pending {
        return Err(AppError::InvalidState(
            "Proof can only be attached to a pending payment.".to_string(),
        ));
    }

    payments::attach_proof(&mut *tx, payment_id, file_ref).await?;
    tx.commit().await?;

    notify::notify_user(
        state,
        notify::Notification {
            user_id: invoice.landlord_id,
            kind: "payment_proof_uploaded",
            title: "Biên lai chuyển khoản mới".to_string(),
            body: format!(
                "Người thuê đã tải lên biên lai cho hóa đơn tháng {}.",
                invoice.period_month
            ),
            data: json!({ "invoice_id": invoice.id, "payment_id": payment_id }),
        },
    )
    .await;

    Ok(Payment {
        proof_image_url: Some(file_ref.to_string()),
        ..payment
    })
}

/// Shared confirm-or-create step, also used by the webhook reconciler.
/// Assumes the invoice row is already locked by the surrounding transaction.
pub async fn confirm_or_create_success(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    amount: i64,
    method: PaymentMethod,
    note: Option<&str>,
    sepay_transaction_id: Option<&str>,
) -> AppResult<Payment> {
    match payments::find_pending_for_invoice(&mut *conn, invoice_id).await? {
        Some(pending) => {
            payments::confirm_payment(
                &mut *conn,
                pending.id,
                amount,
                method,
                note,
                sepay_transaction_id,
                Utc::now(),
            )
            .await
        }
        None => {
            payments::insert_payment(
                &mut *conn,
                &NewPayment {
                    invoice_id,
                    amount,
                    method,
                    status: PaymentStatus::Success,
                    transaction_code: new_transaction_code(),
                    sepay_transaction_id: sepay_transaction_id.map(ToOwned::to_owned),
                    note: note.map(ToOwned::to_owned),
                    paid_at: Some(Utc::now()),
                },
            )
            .await
        }
    }
}

/// Transfer memo convention: the `INV<uuid>` token is the sole linkage
/// between a bank transfer and an invoice.
pub fn qr_transfer_memo(invoice: &Invoice) -> String {
    format!("INV{} thang {}", invoice.id, invoice.period_month)
}

async fn build_qr_url(
    state: &AppState,
    invoice: &Invoice,
    amount: i64,
) -> AppResult<Option<String>> {
    let pool = state.pool()?;
    let Some(bank) = occupancy::landlord_bank_settings(pool, invoice.landlord_id).await? else {
        return Ok(None);
    };
    let (Some(bank_code), Some(account_number)) = (
        bank.bank_code.as_deref(),
        bank.bank_account_number.as_deref(),
    ) else {
        return Ok(None);
    };

    let mut url = url::Url::parse(&format!(
        "{}/{}-{}-qr_only.png",
        state.config.vietqr_image_base_url.trim_end_matches('/'),
        bank_code,
        account_number
    ))
    .map_err(|_| AppError::Dependency("Invalid VietQR base URL configured.".to_string()))?;

    url.query_pairs_mut()
        .append_pair("amount", &amount.to_string())
        .append_pair("addInfo", &qr_transfer_memo(invoice));
    if let Some(holder) = bank.bank_account_holder.as_deref() {
        url.query_pairs_mut().append_pair("accountName", holder);
    }
    Ok(Some(url.to_string()))
}

fn assert_payable(invoice: &Invoice) -> AppResult<()> {
    if !invoice.status.is_payable() {
        return Err(AppError::InvalidState(format!(
            "Invoice is not payable (status: {}).",
            invoice.status.as_str()
        )));
    }
    Ok(())
}

/// The tenant on the contract may initiate payment and upload proof; the
/// landlord may do everything.
pub(crate) fn assert_invoice_participant(invoice: &Invoice, user_id: Uuid) -> AppResult<()> {
    if invoice.landlord_id != user_id && invoice.tenant_id != user_id {
        return Err(AppError::Forbidden(
            "Forbidden: you are not a party to this invoice.".to_string(),
        ));
    }
    Ok(())
}

fn new_transaction_code() -> String {
    format!("PAY-{}", Uuid::new_v4().simple())
}

async fn notify_payment_confirmed(state: &AppState, invoice: &Invoice, payment: &Payment) {
    notify::notify_user(
        state,
        notify::Notification {
            user_id: invoice.tenant_id,
            kind: "payment_confirmed",
            title: "Thanh toán đã được xác nhận".to_string(),
            body: format!(
                "Khoản thanh toán {} VND cho hóa đơn tháng {} đã được ghi nhận.",
                payment.amount, invoice.period_month
            ),
            data: json!({
                "invoice_id": invoice.id,
                "payment_id": payment.id,
                "invoice_status": invoice.status,
            }),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::invoice::{InvoiceStatus, InvoiceType};

    fn invoice_fixture() -> Invoice {
        Invoice {
            id: Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap(),
            contract_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            landlord_id: Uuid::new_v4(),
            house_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            period_month: "2026-01".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            total_amount: 500_000,
            paid_amount: 200_000,
            late_fee_percent: 0,
            status: InvoiceStatus::PartiallyPaid,
            invoice_type: InvoiceType::Normal,
            is_netting: false,
            sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn memo_embeds_the_invoice_reference() {
        let invoice = invoice_fixture();
        let memo = qr_transfer_memo(&invoice);
        assert!(memo.starts_with("INV3fa85f64-5717-4562-b3fc-2c963f66afa6"));
        assert!(memo.ends_with("thang 2026-01"));
    }

    #[test]
    fn payable_guard_rejects_terminal_invoices() {
        let mut invoice = invoice_fixture();
        assert!(assert_payable(&invoice).is_ok());
        invoice.status = InvoiceStatus::Paid;
        assert!(matches!(
            assert_payable(&invoice),
            Err(AppError::InvalidState(_))
        ));
        invoice.status = InvoiceStatus::Cancelled;
        assert!(assert_payable(&invoice).is_err());
    }
}
