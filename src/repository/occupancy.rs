//! Read-only queries over the collaborator tables (houses, rooms, contracts,
//! expenses, landlord bank settings). The billing core never writes these.

use chrono::NaiveDate;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::AppResult;

/// A rented room with its active contract, the unit the shortfall and
/// adjustment generators distribute charges over.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OccupiedRoom {
    pub room_id: Uuid,
    pub room_code: String,
    pub contract_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BankSettings {
    pub bank_code: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_account_holder: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserContact {
    pub full_name: String,
    pub phone: Option<String>,
}

pub async fn house_landlord(
    executor: impl PgExecutor<'_>,
    house_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT landlord_id FROM houses WHERE id = $1")
        .bind(house_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(landlord_id,)| landlord_id))
}

pub async fn house_display(
    executor: impl PgExecutor<'_>,
    house_id: Uuid,
) -> AppResult<Option<(String, String)>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT name, address FROM houses WHERE id = $1")
            .bind(house_id)
            .fetch_optional(executor)
            .await?;
    Ok(row)
}

/// Rooms currently rented under an active contract, the eligible set for
/// per-room distribution.
pub async fn list_occupied_rooms(
    executor: impl PgExecutor<'_>,
    house_id: Uuid,
) -> AppResult<Vec<OccupiedRoom>> {
    let rooms = sqlx::query_as::<_, OccupiedRoom>(
        "SELECT r.id AS room_id, r.code AS room_code, c.id AS contract_id, c.tenant_id
         FROM rooms r
         JOIN contracts c ON c.room_id = r.id AND c.status = 'active'
         WHERE r.house_id = $1 AND r.status = 'rented'
         ORDER BY r.code",
    )
    .bind(house_id)
    .fetch_all(executor)
    .await?;
    Ok(rooms)
}

/// Count of rooms with an active contract in scope (one house, or every
/// house of a landlord).
pub async fn active_room_count(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT r.id)
         FROM rooms r
         JOIN houses h ON h.id = r.house_id
         JOIN contracts c ON c.room_id = r.id AND c.status = 'active'
         WHERE h.landlord_id = $1 AND ($2::uuid IS NULL OR r.house_id = $2)",
    )
    .bind(landlord_id)
    .bind(house_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

pub async fn sum_expenses(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    category: &str,
    from: NaiveDate,
    to_exclusive: NaiveDate,
) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM expenses
         WHERE landlord_id = $1
           AND ($2::uuid IS NULL OR house_id = $2)
           AND category = $3
           AND expense_date >= $4 AND expense_date < $5",
    )
    .bind(landlord_id)
    .bind(house_id)
    .bind(category)
    .bind(from)
    .bind(to_exclusive)
    .fetch_one(executor)
    .await?;
    Ok(total)
}

/// Distinct expense categories recorded for the scope and month, so the
/// calculator generalizes past electricity and water.
pub async fn list_expense_categories(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    from: NaiveDate,
    to_exclusive: NaiveDate,
) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT category FROM expenses
         WHERE landlord_id = $1
           AND ($2::uuid IS NULL OR house_id = $2)
           AND expense_date >= $3 AND expense_date < $4
         ORDER BY category",
    )
    .bind(landlord_id)
    .bind(house_id)
    .bind(from)
    .bind(to_exclusive)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(category,)| category).collect())
}

pub async fn landlord_bank_settings(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
) -> AppResult<Option<BankSettings>> {
    let settings = sqlx::query_as::<_, BankSettings>(
        "SELECT bank_code, bank_account_number, bank_account_holder
         FROM app_users WHERE id = $1",
    )
    .bind(landlord_id)
    .fetch_optional(executor)
    .await?;
    Ok(settings)
}

pub async fn user_contact(
    executor: impl PgExecutor<'_>,
    user_id: Uuid,
) -> AppResult<Option<UserContact>> {
    let contact =
        sqlx::query_as::<_, UserContact>("SELECT full_name, phone FROM app_users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
    Ok(contact)
}

pub async fn room_code(executor: impl PgExecutor<'_>, room_id: Uuid) -> AppResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT code FROM rooms WHERE id = $1")
        .bind(room_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(code,)| code))
}
