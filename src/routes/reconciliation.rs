use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_user_id;
use crate::error::AppResult;
use crate::schemas::{
    validate_input, CreateAdjustmentInput, ShortfallPeriodInput, UtilityReconciliationQuery,
};
use crate::services::reconciliation;
use crate::services::shortfall::{self, AdjustmentDiff};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/reconciliation/utilities",
            axum::routing::get(utility_report),
        )
        .route(
            "/reconciliation/shortfalls/flag",
            axum::routing::post(flag_shortfall),
        )
        .route(
            "/reconciliation/shortfalls/apply",
            axum::routing::post(apply_shortfall),
        )
        .route(
            "/reconciliation/adjustments",
            axum::routing::post(create_adjustment),
        )
}

async fn utility_report(
    State(state): State<AppState>,
    Query(query): Query<UtilityReconciliationQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&query)?;

    let report =
        reconciliation::load_report(&state, user_id, query.house_id, query.month, query.year)
            .await?;
    Ok(Json(json!(report)))
}

async fn flag_shortfall(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ShortfallPeriodInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let flagged =
        shortfall::flag(&state, user_id, input.house_id, input.month, input.year).await?;
    Ok(Json(json!(flagged)))
}

async fn apply_shortfall(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ShortfallPeriodInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let outcome =
        shortfall::apply(&state, user_id, input.house_id, input.month, input.year).await?;
    Ok(Json(json!(outcome)))
}

async fn create_adjustment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateAdjustmentInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&input)?;

    let diffs = input
        .diffs
        .into_iter()
        .map(|diff| AdjustmentDiff {
            label: diff.label,
            amount: diff.amount,
        })
        .collect();
    let created = shortfall::create_adjustment(
        &state,
        user_id,
        input.house_id,
        input.period_month,
        diffs,
        input.mode,
        input.due_days,
    )
    .await?;
    Ok(Json(json!({ "invoices": created })))
}
