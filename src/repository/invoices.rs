use chrono::NaiveDate;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::domain::invoice::{Invoice, InvoiceItem, InvoiceItemType, InvoiceStatus, InvoiceType};
use crate::error::AppResult;

const INVOICE_COLUMNS: &str = "id, contract_id, tenant_id, landlord_id, house_id, room_id, \
     period_month, due_date, total_amount, paid_amount, late_fee_percent, status, invoice_type, \
     is_netting, sent_at, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, invoice_id, item_type, description, quantity, unit_price, amount, source_ref, created_at";

pub struct NewInvoice {
    pub contract_id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub house_id: Uuid,
    pub room_id: Uuid,
    pub period_month: String,
    pub due_date: NaiveDate,
    pub total_amount: i64,
    pub invoice_type: InvoiceType,
    pub is_netting: bool,
}

pub struct NewInvoiceItem {
    pub invoice_id: Uuid,
    pub item_type: InvoiceItemType,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub source_ref: Option<String>,
}

pub async fn get_invoice(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
) -> AppResult<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
    ))
    .bind(invoice_id)
    .fetch_optional(executor)
    .await?;
    Ok(invoice)
}

/// Row-locked fetch for use inside a transaction. Serializes concurrent
/// payment confirmations against the same invoice.
pub async fn get_invoice_for_update(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> AppResult<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

pub async fn list_invoices(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    period_month: Option<&str>,
    status: Option<InvoiceStatus>,
    limit: i64,
) -> AppResult<Vec<Invoice>> {
    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices
         WHERE landlord_id = $1
           AND ($2::uuid IS NULL OR house_id = $2)
           AND ($3::text IS NULL OR period_month = $3)
           AND ($4::text IS NULL OR status = $4)
         ORDER BY created_at DESC
         LIMIT $5"
    ))
    .bind(landlord_id)
    .bind(house_id)
    .bind(period_month)
    .bind(status.map(InvoiceStatus::as_str))
    .bind(limit.clamp(1, 500))
    .fetch_all(executor)
    .await?;
    Ok(invoices)
}

/// The room's invoice for a billing period, newest first when regeneration
/// left more than one. Cancelled invoices are not considered current.
pub async fn find_room_period_invoice(
    executor: impl PgExecutor<'_>,
    room_id: Uuid,
    period_month: &str,
) -> AppResult<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices
         WHERE room_id = $1 AND period_month = $2 AND status <> 'cancelled'
         ORDER BY created_at DESC
         LIMIT 1"
    ))
    .bind(room_id)
    .bind(period_month)
    .fetch_optional(executor)
    .await?;
    Ok(invoice)
}

pub async fn insert_invoice(
    executor: impl PgExecutor<'_>,
    new_invoice: &NewInvoice,
) -> AppResult<Invoice> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "INSERT INTO invoices (contract_id, tenant_id, landlord_id, house_id, room_id, \
             period_month, due_date, total_amount, invoice_type, is_netting)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(new_invoice.contract_id)
    .bind(new_invoice.tenant_id)
    .bind(new_invoice.landlord_id)
    .bind(new_invoice.house_id)
    .bind(new_invoice.room_id)
    .bind(&new_invoice.period_month)
    .bind(new_invoice.due_date)
    .bind(new_invoice.total_amount)
    .bind(new_invoice.invoice_type.as_str())
    .bind(new_invoice.is_netting)
    .fetch_one(executor)
    .await?;
    Ok(invoice)
}

pub async fn set_status(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
    status: InvoiceStatus,
) -> AppResult<()> {
    sqlx::query("UPDATE invoices SET status = $2, updated_at = now() WHERE id = $1")
        .bind(invoice_id)
        .bind(status.as_str())
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn mark_sent(executor: impl PgExecutor<'_>, invoice_id: Uuid) -> AppResult<()> {
    sqlx::query(
        "UPDATE invoices SET status = 'sent', sent_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(invoice_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_paid_amount_and_status(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
    paid_amount: i64,
    status: InvoiceStatus,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE invoices SET paid_amount = $2, status = $3, updated_at = now() WHERE id = $1",
    )
    .bind(invoice_id)
    .bind(paid_amount)
    .bind(status.as_str())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn increase_total_amount(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
    delta: i64,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE invoices SET total_amount = total_amount + $2, updated_at = now() WHERE id = $1",
    )
    .bind(invoice_id)
    .bind(delta)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_invoice(executor: impl PgExecutor<'_>, invoice_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM invoices WHERE id = $1")
        .bind(invoice_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_items(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
) -> AppResult<Vec<InvoiceItem>> {
    let items = sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY created_at"
    ))
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;
    Ok(items)
}

pub async fn insert_item(
    executor: impl PgExecutor<'_>,
    new_item: &NewInvoiceItem,
) -> AppResult<InvoiceItem> {
    let item = sqlx::query_as::<_, InvoiceItem>(&format!(
        "INSERT INTO invoice_items (invoice_id, item_type, description, quantity, unit_price, \
             amount, source_ref)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(new_item.invoice_id)
    .bind(new_item.item_type.as_str())
    .bind(&new_item.description)
    .bind(new_item.quantity)
    .bind(new_item.unit_price)
    .bind(new_item.amount)
    .bind(&new_item.source_ref)
    .fetch_one(executor)
    .await?;
    Ok(item)
}

/// True when the invoice already carries the period's make-up charge. Matches
/// the structured marker first, then the exact legacy description.
pub async fn has_item_with_marker(
    executor: impl PgExecutor<'_>,
    invoice_id: Uuid,
    source_ref: &str,
    description: &str,
) -> AppResult<bool> {
    let found: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM invoice_items
         WHERE invoice_id = $1 AND (source_ref = $2 OR description = $3)
         LIMIT 1",
    )
    .bind(invoice_id)
    .bind(source_ref)
    .bind(description)
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

/// Sum of billed item amounts of one type across the period's collectible
/// invoices (draft and cancelled excluded).
pub async fn sum_billed_by_type(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    period_month: &str,
    item_type: InvoiceItemType,
) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(ii.amount), 0)
         FROM invoice_items ii
         JOIN invoices i ON i.id = ii.invoice_id
         WHERE i.landlord_id = $1
           AND ($2::uuid IS NULL OR i.house_id = $2)
           AND i.period_month = $3
           AND i.status NOT IN ('draft', 'cancelled')
           AND ii.item_type = $4",
    )
    .bind(landlord_id)
    .bind(house_id)
    .bind(period_month)
    .bind(item_type.as_str())
    .fetch_one(executor)
    .await?;
    Ok(total)
}

/// Substring variant used for categories without a dedicated item type.
pub async fn sum_billed_by_description(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    period_month: &str,
    needle: &str,
) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(ii.amount), 0)
         FROM invoice_items ii
         JOIN invoices i ON i.id = ii.invoice_id
         WHERE i.landlord_id = $1
           AND ($2::uuid IS NULL OR i.house_id = $2)
           AND i.period_month = $3
           AND i.status NOT IN ('draft', 'cancelled')
           AND ii.description ILIKE '%' || $4 || '%'",
    )
    .bind(landlord_id)
    .bind(house_id)
    .bind(period_month)
    .bind(needle)
    .fetch_one(executor)
    .await?;
    Ok(total)
}

/// Sum of make-up charges already written for the period, across every
/// invoice of the scope regardless of status (a drafted make-up item still
/// counts as compensated).
pub async fn sum_compensated(
    executor: impl PgExecutor<'_>,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    period_month: &str,
    source_ref: &str,
    description: &str,
) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(ii.amount), 0)
         FROM invoice_items ii
         JOIN invoices i ON i.id = ii.invoice_id
         WHERE i.landlord_id = $1
           AND ($2::uuid IS NULL OR i.house_id = $2)
           AND i.period_month = $3
           AND i.status <> 'cancelled'
           AND (ii.source_ref = $4 OR ii.description = $5)",
    )
    .bind(landlord_id)
    .bind(house_id)
    .bind(period_month)
    .bind(source_ref)
    .bind(description)
    .fetch_one(executor)
    .await?;
    Ok(total)
}
