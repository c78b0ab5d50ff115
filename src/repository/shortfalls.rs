use sqlx::PgExecutor;
use uuid::Uuid;

use crate::domain::shortfall::UtilityShortfall;
use crate::error::AppResult;

const COLUMNS: &str = "id, house_id, period_month, electricity_shortfall, water_shortfall, \
     total_shortfall, per_room_amount, active_room_count, status, applied_at, created_at";

pub struct NewUtilityShortfall {
    pub house_id: Uuid,
    pub period_month: String,
    pub electricity_shortfall: i64,
    pub water_shortfall: i64,
    pub total_shortfall: i64,
    pub per_room_amount: i64,
    pub active_room_count: i64,
}

pub async fn find_by_house_period(
    executor: impl PgExecutor<'_>,
    house_id: Uuid,
    period_month: &str,
) -> AppResult<Option<UtilityShortfall>> {
    let shortfall = sqlx::query_as::<_, UtilityShortfall>(&format!(
        "SELECT {COLUMNS} FROM utility_shortfalls WHERE house_id = $1 AND period_month = $2"
    ))
    .bind(house_id)
    .bind(period_month)
    .fetch_optional(executor)
    .await?;
    Ok(shortfall)
}

/// Insert a PENDING snapshot. Returns `None` when the unique
/// (house, period) index already holds a row — duplicate flags lose the race
/// at the database, not in application code.
pub async fn try_insert_pending(
    executor: impl PgExecutor<'_>,
    new_shortfall: &NewUtilityShortfall,
) -> AppResult<Option<UtilityShortfall>> {
    let inserted = sqlx::query_as::<_, UtilityShortfall>(&format!(
        "INSERT INTO utility_shortfalls (house_id, period_month, electricity_shortfall, \
             water_shortfall, total_shortfall, per_room_amount, active_room_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (house_id, period_month) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(new_shortfall.house_id)
    .bind(&new_shortfall.period_month)
    .bind(new_shortfall.electricity_shortfall)
    .bind(new_shortfall.water_shortfall)
    .bind(new_shortfall.total_shortfall)
    .bind(new_shortfall.per_room_amount)
    .bind(new_shortfall.active_room_count)
    .fetch_optional(executor)
    .await?;
    Ok(inserted)
}

pub async fn mark_applied(executor: impl PgExecutor<'_>, shortfall_id: Uuid) -> AppResult<()> {
    sqlx::query(
        "UPDATE utility_shortfalls
         SET status = 'applied', applied_at = now()
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(shortfall_id)
    .execute(executor)
    .await?;
    Ok(())
}
