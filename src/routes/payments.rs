use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::AppResult;
use crate::schemas::{
    validate_input, AttachProofInput, ConfirmManualPaymentInput, InitiatePaymentInput,
};
use crate::services::payments;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices/{invoice_id}/payments",
            axum::routing::post(initiate_payment),
        )
        .route(
            "/invoices/{invoice_id}/payments/confirm",
            axum::routing::post(confirm_manual),
        )
        .route(
            "/payments/{payment_id}/confirm",
            axum::routing::post(confirm_qr),
        )
        .route(
            "/payments/{payment_id}/proof",
            axum::routing::post(attach_proof),
        )
}

async fn initiate_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<InitiatePaymentInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let initiation =
        payments::initiate(&state, user_id, invoice_id, input.amount, input.method).await?;
    Ok(Json(json!({
        "payment": initiation.payment,
        "invoice": initiation.invoice,
        "qr_image_url": initiation.qr_image_url,
    })))
}

async fn confirm_manual(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<ConfirmManualPaymentInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let (payment, invoice) = payments::confirm_manual(
        &state,
        user_id,
        invoice_id,
        input.amount,
        input.method,
        input.note,
    )
    .await?;
    Ok(Json(json!({ "payment": payment, "invoice": invoice })))
}

async fn confirm_qr(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let (payment, invoice) = payments::confirm_qr(&state, user_id, payment_id).await?;
    Ok(Json(json!({ "payment": payment, "invoice": invoice })))
}

async fn attach_proof(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<AttachProofInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let payment = payments::attach_proof(&state, user_id, payment_id, &input.file_ref).await?;
    Ok(Json(json!({ "payment": payment })))
}
