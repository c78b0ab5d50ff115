use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::schemas::SepayWebhookPayload;
use crate::services::sepay;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/webhooks/sepay", axum::routing::post(sepay_webhook))
}

/// Public endpoint. The API-key check is the only path that answers with an
/// error; every processing outcome, replay included, returns 200 so the
/// provider's retry loop settles.
async fn sepay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SepayWebhookPayload>,
) -> AppResult<Json<Value>> {
    check_api_key(&state, &headers)?;

    let outcome = sepay::process_webhook(&state, payload).await?;
    Ok(Json(json!({ "success": true, "result": outcome })))
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = state.config.sepay_webhook_api_key.as_deref() else {
        return Ok(());
    };

    let supplied = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Apikey "))
        .map(str::trim);
    if supplied != Some(expected) {
        return Err(AppError::Unauthorized(
            "Invalid webhook API key.".to_string(),
        ));
    }
    Ok(())
}
