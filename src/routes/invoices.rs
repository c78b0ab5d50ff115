use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::error::{AppError, AppResult};
use crate::repository::{invoices, payments};
use crate::schemas::ListInvoicesQuery;
use crate::services::ledger;
use crate::services::payments::assert_invoice_participant;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices",
            axum::routing::get(list_invoices),
        )
        .route(
            "/invoices/{invoice_id}",
            axum::routing::get(get_invoice).delete(delete_invoice),
        )
        .route(
            "/invoices/{invoice_id}/send",
            axum::routing::post(send_invoice),
        )
        .route(
            "/invoices/{invoice_id}/cancel",
            axum::routing::post(cancel_invoice),
        )
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = state.pool()?;

    let status = query
        .status
        .as_deref()
        .map(InvoiceStatus::parse)
        .transpose()?;
    let rows = invoices::list_invoices(
        pool,
        user_id,
        query.house_id,
        query.period_month.as_deref(),
        status,
        query.limit,
    )
    .await?;

    let today = Utc::now().date_naive();
    let data: Vec<Value> = rows
        .iter()
        .map(|invoice| invoice_view(invoice, today))
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = state.pool()?;

    let invoice = invoices::get_invoice(pool, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    assert_invoice_participant(&invoice, user_id)?;

    let items = invoices::list_items(pool, invoice_id).await?;
    let invoice_payments = payments::list_for_invoice(pool, invoice_id).await?;

    let mut view = invoice_view(&invoice, Utc::now().date_naive());
    view["items"] = json!(items);
    view["payments"] = json!(invoice_payments);
    Ok(Json(view))
}

async fn send_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let invoice = ledger::send_invoice(&state, user_id, invoice_id).await?;
    Ok(Json(invoice_view(&invoice, Utc::now().date_naive())))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let invoice = ledger::cancel_invoice(&state, user_id, invoice_id).await?;
    Ok(Json(invoice_view(&invoice, Utc::now().date_naive())))
}

async fn delete_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    ledger::delete_invoice(&state, user_id, invoice_id).await?;
    Ok(Json(json!({ "deleted": invoice_id })))
}

/// Serialized invoice plus the read-time view fields (derived OVERDUE and
/// the remaining balance).
fn invoice_view(invoice: &Invoice, today: chrono::NaiveDate) -> Value {
    let mut view = json!(invoice);
    view["effective_status"] = json!(invoice.effective_status(today));
    view["remaining_amount"] = json!(invoice.remaining_amount());
    view
}
