//! Webhook Reconciler: turns at-least-once SePay bank-transfer notifications
//! into exactly-once payment effects. Every delivery is logged in the
//! `sepay_transactions` idempotency ledger before any downstream processing;
//! once that row exists, replays of the same external id are no-ops.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::invoice::InvoiceStatus;
use crate::domain::payment::PaymentMethod;
use crate::domain::sepay::SepayTransactionStatus;
use crate::error::AppResult;
use crate::repository::invoices;
use crate::repository::sepay_transactions::{self, NewSepayTransaction};
use crate::schemas::SepayWebhookPayload;
use crate::services::{ledger, notify, payments};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// Same external id seen before; nothing was reprocessed.
    Duplicate,
    /// Outgoing transfer, or a transfer against a non-payable invoice.
    Ignored,
    /// No invoice reference found, or the referenced invoice does not exist.
    Unmatched,
    Matched {
        invoice_id: Uuid,
        payment_id: Uuid,
    },
    /// Logged but left in RECEIVED after an unexpected downstream failure.
    Failed,
}

/// Process one inbound webhook delivery. Never returns an error for
/// already-processed or unmatchable events; the provider must always see
/// success once the caller's API key has been accepted.
pub async fn process_webhook(
    state: &AppState,
    payload: SepayWebhookPayload,
) -> AppResult<WebhookOutcome> {
    let pool = state.pool()?;
    let external_id = payload.id.to_string();

    // Cheap pre-check; the unique index below is the authoritative guard.
    if sepay_transactions::exists_by_external_id(pool, &external_id).await? {
        info!(external_id, "Webhook replay ignored");
        return Ok(WebhookOutcome::Duplicate);
    }

    // The log row commits on its own before any downstream step, so a retry
    // after a downstream failure can never double-process the event.
    let Some(log_row) = sepay_transactions::try_insert_received(
        pool,
        &NewSepayTransaction {
            sepay_transaction_id: external_id.clone(),
            gateway: payload.gateway.clone().unwrap_or_default(),
            account_number: payload.account_number.clone().unwrap_or_default(),
            transfer_type: payload.transfer_type.clone(),
            transfer_amount: payload.transfer_amount,
            content: payload.content.clone().unwrap_or_default(),
            code: payload.code.clone(),
            reference_code: payload.reference_code.clone(),
            description: payload.description.clone(),
            transaction_date: payload.transaction_date.clone().unwrap_or_default(),
        },
    )
    .await?
    else {
        info!(external_id, "Webhook replay lost the insert race");
        return Ok(WebhookOutcome::Duplicate);
    };

    match reconcile(state, &payload, log_row.id).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            warn!(
                external_id,
                %error,
                "Webhook reconciliation failed after idempotency record"
            );
            Ok(WebhookOutcome::Failed)
        }
    }
}

async fn reconcile(
    state: &AppState,
    payload: &SepayWebhookPayload,
    log_id: Uuid,
) -> AppResult<WebhookOutcome> {
    let pool = state.pool()?;

    if payload.transfer_type != "in" {
        sepay_transactions::finalize(pool, log_id, SepayTransactionStatus::Ignored, None, None)
            .await?;
        return Ok(WebhookOutcome::Ignored);
    }

    let fields = [
        payload.code.as_deref(),
        payload.content.as_deref(),
        payload.description.as_deref(),
    ];
    let Some(invoice_id) = extract_invoice_ref(fields.iter().flatten().copied()) else {
        sepay_transactions::finalize(pool, log_id, SepayTransactionStatus::Unmatched, None, None)
            .await?;
        return Ok(WebhookOutcome::Unmatched);
    };

    let Some(invoice) = invoices::get_invoice(pool, invoice_id).await? else {
        sepay_transactions::finalize(pool, log_id, SepayTransactionStatus::Unmatched, None, None)
            .await?;
        return Ok(WebhookOutcome::Unmatched);
    };
    if matches!(
        invoice.status,
        InvoiceStatus::Paid | InvoiceStatus::Cancelled
    ) {
        sepay_transactions::finalize(
            pool,
            log_id,
            SepayTransactionStatus::Ignored,
            Some(invoice_id),
            None,
        )
        .await?;
        return Ok(WebhookOutcome::Ignored);
    }

    let mut tx = pool.begin().await?;
    // Lock before mutating payments so a racing manual confirmation
    // serializes with this one.
    invoices::get_invoice_for_update(&mut *tx, invoice_id).await?;
    let payment = payments::confirm_or_create_success(
        &mut tx,
        invoice_id,
        payload.transfer_amount,
        PaymentMethod::Sepay,
        payload.content.as_deref(),
        Some(&payload.id.to_string()),
    )
    .await?;
    let invoice = ledger::recompute_status(&mut tx, invoice_id).await?;
    sepay_transactions::finalize(
        &mut *tx,
        log_id,
        SepayTransactionStatus::Matched,
        Some(invoice_id),
        Some(payment.id),
    )
    .await?;
    tx.commit().await?;

    info!(
        external_id = %payload.id,
        invoice_id = %invoice_id,
        payment_id = %payment.id,
        amount = payload.transfer_amount,
        status = invoice.status.as_str(),
        "Bank transfer matched to invoice"
    );

    notify::notify_user(
        state,
        notify::Notification {
            user_id: invoice.landlord_id,
            kind: "bank_transfer_received",
            title: "Nhận chuyển khoản ngân hàng".to_string(),
            body: format!(
                "Đã nhận {} VND cho hóa đơn tháng {} (phòng đã đối soát tự động).",
                payload.transfer_amount, invoice.period_month
            ),
            data: json!({ "invoice_id": invoice_id, "payment_id": payment.id }),
        },
    )
    .await;

    Ok(WebhookOutcome::Matched {
        invoice_id,
        payment_id: payment.id,
    })
}

/// Scan free-text transfer metadata for the `INV<uuid>` token. Fields are
/// searched in caller-supplied priority order; within a field every `INV`
/// occurrence is tried and the first parseable 36-character id wins.
pub fn extract_invoice_ref<'a>(fields: impl IntoIterator<Item = &'a str>) -> Option<Uuid> {
    for field in fields {
        for (index, _) in field.match_indices("INV") {
            let start = index + 3;
            // Too-short or mid-codepoint slices are just not candidates.
            let Some(candidate) = field.get(start..start + 36) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(candidate) {
                return Some(id);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::extract_invoice_ref;
    use uuid::Uuid;

    const ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    #[test]
    fn extracts_reference_from_transfer_content() {
        let content = format!("CK INV{ID} thang 01");
        assert_eq!(
            extract_invoice_ref([content.as_str()]),
            Some(Uuid::parse_str(ID).unwrap())
        );
    }

    #[test]
    fn first_field_with_a_match_wins() {
        let other = Uuid::new_v4();
        let code = format!("INV{ID}");
        let content = format!("INV{other}");
        assert_eq!(
            extract_invoice_ref([code.as_str(), content.as_str()]),
            Some(Uuid::parse_str(ID).unwrap())
        );
    }

    #[test]
    fn skips_malformed_tokens_and_keeps_scanning() {
        let content = format!("INVALID transfer INV{ID}");
        assert_eq!(
            extract_invoice_ref([content.as_str()]),
            Some(Uuid::parse_str(ID).unwrap())
        );
    }

    #[test]
    fn no_reference_yields_none() {
        assert_eq!(extract_invoice_ref(["chuyen tien thue nha"]), None);
        assert_eq!(extract_invoice_ref(["INV123"]), None);
        assert_eq!(extract_invoice_ref([]), None);
    }

    #[test]
    fn short_garbage_in_an_earlier_field_does_not_mask_a_later_match() {
        let content = format!("INV{ID}");
        assert_eq!(
            extract_invoice_ref(["INV99", content.as_str()]),
            Some(Uuid::parse_str(ID).unwrap())
        );
    }
}
