//! Invoice Ledger: owns the invoice status state machine and the derived
//! `paid_amount` total. The total is always re-derived from the set of
//! SUCCESS payments, never incremented, so a recompute is safe to re-run
//! after a partial failure.

use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::domain::invoice::{resolve_status_after_payment, Invoice, InvoiceStatus};
use crate::error::{AppError, AppResult};
use crate::repository::{invoices, occupancy, payments};
use crate::services::{notify, sms};
use crate::state::AppState;

/// Re-derive `paid_amount` and status from SUCCESS payments. Must run inside
/// the caller's transaction; takes the invoice row lock so two confirmations
/// racing on the same invoice serialize here.
pub async fn recompute_status(conn: &mut PgConnection, invoice_id: Uuid) -> AppResult<Invoice> {
    let mut invoice = invoices::get_invoice_for_update(&mut *conn, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;

    let paid_amount = payments::sum_success_amount(&mut *conn, invoice_id).await?;
    let status = resolve_status_after_payment(invoice.status, paid_amount, invoice.total_amount);

    invoices::set_paid_amount_and_status(&mut *conn, invoice_id, paid_amount, status).await?;

    if status != invoice.status {
        info!(
            invoice_id = %invoice_id,
            from = invoice.status.as_str(),
            to = status.as_str(),
            paid_amount,
            "Invoice status recomputed"
        );
    }

    invoice.paid_amount = paid_amount;
    invoice.status = status;
    Ok(invoice)
}

/// Explicit send: DRAFT -> SENT, then notify the tenant in-app and by SMS.
pub async fn send_invoice(state: &AppState, user_id: Uuid, invoice_id: Uuid) -> AppResult<Invoice> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let invoice = invoices::get_invoice_for_update(&mut *tx, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_owner(&invoice, user_id)?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(AppError::InvalidState(format!(
            "Only draft invoices can be sent (current status: {}).",
            invoice.status.as_str()
        )));
    }

    invoices::mark_sent(&mut *tx, invoice_id).await?;
    tx.commit().await?;

    let sent = Invoice {
        status: InvoiceStatus::Sent,
        sent_at: Some(Utc::now()),
        ..invoice
    };
    notify_tenant_invoice_sent(state, &sent).await;
    Ok(sent)
}

/// Cancellation is allowed from any non-PAID state.
pub async fn cancel_invoice(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<Invoice> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let invoice = invoices::get_invoice_for_update(&mut *tx, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_owner(&invoice, user_id)?;

    if invoice.status == InvoiceStatus::Paid {
        return Err(AppError::InvalidState(
            "A paid invoice cannot be cancelled.".to_string(),
        ));
    }

    invoices::set_status(&mut *tx, invoice_id, InvoiceStatus::Cancelled).await?;
    tx.commit().await?;

    Ok(Invoice {
        status: InvoiceStatus::Cancelled,
        ..invoice
    })
}

/// Physical deletion is permitted only while DRAFT or CANCELLED.
pub async fn delete_invoice(state: &AppState, user_id: Uuid, invoice_id: Uuid) -> AppResult<()> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let invoice = invoices::get_invoice_for_update(&mut *tx, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_owner(&invoice, user_id)?;

    if !matches!(
        invoice.status,
        InvoiceStatus::Draft | InvoiceStatus::Cancelled
    ) {
        return Err(AppError::InvalidState(
            "Only draft or cancelled invoices can be deleted.".to_string(),
        ));
    }

    invoices::delete_invoice(&mut *tx, invoice_id).await?;
    tx.commit().await?;
    Ok(())
}

pub fn assert_invoice_owner(invoice: &Invoice, user_id: Uuid) -> AppResult<()> {
    if invoice.landlord_id != user_id {
        return Err(AppError::Forbidden(
            "Forbidden: you do not manage this invoice.".to_string(),
        ));
    }
    Ok(())
}

async fn notify_tenant_invoice_sent(state: &AppState, invoice: &Invoice) {
    notify::notify_user(
        state,
        notify::Notification {
            user_id: invoice.tenant_id,
            kind: "invoice_sent",
            title: format!("Hóa đơn tháng {}", invoice.period_month),
            body: format!(
                "Hóa đơn tháng {} của bạn đã được gửi, hạn thanh toán {}.",
                invoice.period_month, invoice.due_date
            ),
            data: json!({ "invoice_id": invoice.id }),
        },
    )
    .await;

    let Ok(pool) = state.pool() else {
        return;
    };
    let Ok(Some(contact)) = occupancy::user_contact(pool, invoice.tenant_id).await else {
        return;
    };
    let Some(phone) = contact.phone.as_deref() else {
        return;
    };
    let room_code = occupancy::room_code(pool, invoice.room_id)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let (house_name, address) = occupancy::house_display(pool, invoice.house_id)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let url = format!("{}/invoices/{}", state.config.app_public_url, invoice.id);
    sms::send_invoice_notification(
        state,
        sms::InvoiceSms {
            phone,
            room_code: &room_code,
            house_name: &house_name,
            address: &address,
            period_month: &invoice.period_month,
            amount: invoice.remaining_amount(),
            due_date: &invoice.due_date.to_string(),
            url: &url,
        },
    )
    .await;
}
