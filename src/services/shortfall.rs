//! Shortfall/Adjustment Generator: turns a computed utility shortfall, or an
//! arbitrary selection of reconciliation diffs, into concrete invoice line
//! items. Every room gets charged at most once per period for the same
//! make-up; duplicate protection rides on the item's structured marker.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::invoice::{Invoice, InvoiceItemType, InvoiceStatus, InvoiceType};
use crate::domain::shortfall::{AdjustmentMode, UtilityShortfall};
use crate::error::{AppError, AppResult};
use crate::repository::invoices::{self, NewInvoice, NewInvoiceItem};
use crate::repository::occupancy;
use crate::repository::shortfalls::{self, NewUtilityShortfall};
use crate::services::proration::ceil_div;
use crate::services::reconciliation::{self, UtilityReport};
use crate::state::AppState;

const DEFAULT_DUE_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub period_month: String,
    pub per_room_amount: i64,
    pub invoices_touched: usize,
}

#[derive(Debug, Clone)]
pub struct AdjustmentDiff {
    pub label: String,
    pub amount: i64,
}

/// Snapshot the current computation as a PENDING shortfall. One flag per
/// (house, period); re-flagging is a conflict while any row exists.
pub async fn flag(
    state: &AppState,
    user_id: Uuid,
    house_id: Uuid,
    month: u32,
    year: i32,
) -> AppResult<UtilityShortfall> {
    let pool = state.pool()?;
    assert_house_owner(state, house_id, user_id).await?;

    let report = reconciliation::load_report(state, user_id, Some(house_id), month, year).await?;
    if shortfalls::find_by_house_period(pool, house_id, &report.period_month)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "A shortfall is already flagged for period {}.",
            report.period_month
        )));
    }
    if report.remaining_shortfall == 0 {
        return Err(AppError::BadRequest(format!(
            "Nothing to flag: no remaining utility shortfall for period {}.",
            report.period_month
        )));
    }

    let inserted = shortfalls::try_insert_pending(
        pool,
        &NewUtilityShortfall {
            house_id,
            period_month: report.period_month.clone(),
            electricity_shortfall: report.electricity_shortfall,
            water_shortfall: report.water_shortfall,
            total_shortfall: report.total_shortfall,
            per_room_amount: report.raw_per_room_amount,
            active_room_count: report.active_room_count,
        },
    )
    .await?
    .ok_or_else(|| {
        AppError::Conflict(format!(
            "A shortfall is already flagged for period {}.",
            report.period_month
        ))
    })?;

    info!(
        house_id = %house_id,
        period = %inserted.period_month,
        total = inserted.total_shortfall,
        per_room = inserted.per_room_amount,
        "Utility shortfall flagged"
    );
    Ok(inserted)
}

/// Distribute the period's shortfall into invoices. Charges the raw
/// per-room amount so partial applications across separate calls stay
/// consistent; rooms already carrying the period's make-up item are skipped.
pub async fn apply(
    state: &AppState,
    user_id: Uuid,
    house_id: Uuid,
    month: u32,
    year: i32,
) -> AppResult<ApplyOutcome> {
    let pool = state.pool()?;
    assert_house_owner(state, house_id, user_id).await?;

    let report = reconciliation::load_report(state, user_id, Some(house_id), month, year).await?;
    if report.remaining_shortfall == 0 {
        return Err(AppError::BadRequest(format!(
            "No remaining utility shortfall to apply for period {}.",
            report.period_month
        )));
    }
    let per_room_amount = report.raw_per_room_amount;
    if per_room_amount <= 0 {
        return Err(AppError::BadRequest(
            "No rooms with an active contract to distribute the shortfall over.".to_string(),
        ));
    }

    let rooms = occupancy::list_occupied_rooms(pool, house_id).await?;
    if rooms.is_empty() {
        return Err(AppError::BadRequest(
            "No rooms with an active contract to distribute the shortfall over.".to_string(),
        ));
    }

    let description = reconciliation::make_up_description(&report.period_month);
    let source_ref = reconciliation::make_up_source_ref(&report.period_month);
    let due_date = Utc::now().date_naive() + Duration::days(DEFAULT_DUE_DAYS);

    let mut tx = pool.begin().await?;
    let mut invoices_touched = 0usize;
    for room in rooms {
        let existing =
            invoices::find_room_period_invoice(&mut *tx, room.room_id, &report.period_month)
                .await?;
        let invoice_id = match existing {
            Some(invoice) => {
                if invoices::has_item_with_marker(&mut *tx, invoice.id, &source_ref, &description)
                    .await?
                {
                    continue;
                }
                if invoice.status == InvoiceStatus::Draft {
                    invoices::increase_total_amount(&mut *tx, invoice.id, per_room_amount).await?;
                    invoice.id
                } else {
                    // The period's invoice is already out the door; the
                    // make-up goes on a fresh draft instead.
                    create_make_up_invoice(&mut tx, &room, house_id, user_id, &report, due_date)
                        .await?
                }
            }
            None => {
                create_make_up_invoice(&mut tx, &room, house_id, user_id, &report, due_date)
                    .await?
            }
        };

        invoices::insert_item(
            &mut *tx,
            &NewInvoiceItem {
                invoice_id,
                item_type: InvoiceItemType::Other,
                description: description.clone(),
                quantity: 1,
                unit_price: per_room_amount,
                amount: per_room_amount,
                source_ref: Some(source_ref.clone()),
            },
        )
        .await?;
        invoices_touched += 1;
    }

    if let Some(shortfall) =
        shortfalls::find_by_house_period(&mut *tx, house_id, &report.period_month).await?
    {
        shortfalls::mark_applied(&mut *tx, shortfall.id).await?;
    }
    tx.commit().await?;

    info!(
        house_id = %house_id,
        period = %report.period_month,
        per_room = per_room_amount,
        invoices_touched,
        "Utility shortfall applied"
    );
    Ok(ApplyOutcome {
        period_month: report.period_month,
        per_room_amount,
        invoices_touched,
    })
}

async fn create_make_up_invoice(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    room: &occupancy::OccupiedRoom,
    house_id: Uuid,
    landlord_id: Uuid,
    report: &UtilityReport,
    due_date: chrono::NaiveDate,
) -> AppResult<Uuid> {
    let invoice = invoices::insert_invoice(
        &mut **tx,
        &NewInvoice {
            contract_id: room.contract_id,
            tenant_id: room.tenant_id,
            landlord_id,
            house_id,
            room_id: room.room_id,
            period_month: report.period_month.clone(),
            due_date,
            total_amount: report.raw_per_room_amount,
            invoice_type: InvoiceType::Normal,
            is_netting: false,
        },
    )
    .await?;
    Ok(invoice.id)
}

/// One ADJUSTMENT draft invoice per eligible room, with the selected diffs
/// re-divided per room so the line-item breakdown stays explainable.
pub async fn create_adjustment(
    state: &AppState,
    user_id: Uuid,
    house_id: Uuid,
    period_month: String,
    diffs: Vec<AdjustmentDiff>,
    mode: AdjustmentMode,
    due_days: Option<i64>,
) -> AppResult<Vec<Invoice>> {
    let pool = state.pool()?;
    assert_house_owner(state, house_id, user_id).await?;

    let total = validate_mode(mode, &diffs)?;

    let rooms = occupancy::list_occupied_rooms(pool, house_id).await?;
    if rooms.is_empty() {
        return Err(AppError::BadRequest(
            "No rooms with an active contract to adjust.".to_string(),
        ));
    }
    let room_count = rooms.len() as i64;
    let per_room_charge = ceil_div(total, room_count);
    let per_room_diffs: Vec<(String, i64)> = diffs
        .iter()
        .map(|diff| (diff.label.clone(), ceil_div(diff.amount, room_count)))
        .collect();
    let due_date =
        Utc::now().date_naive() + Duration::days(due_days.unwrap_or(DEFAULT_DUE_DAYS).max(0));

    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(rooms.len());
    for room in rooms {
        let invoice = invoices::insert_invoice(
            &mut *tx,
            &NewInvoice {
                contract_id: room.contract_id,
                tenant_id: room.tenant_id,
                landlord_id: user_id,
                house_id,
                room_id: room.room_id,
                period_month: period_month.clone(),
                due_date,
                total_amount: per_room_charge,
                invoice_type: InvoiceType::Adjustment,
                is_netting: mode == AdjustmentMode::Net,
            },
        )
        .await?;
        for (label, amount) in &per_room_diffs {
            invoices::insert_item(
                &mut *tx,
                &NewInvoiceItem {
                    invoice_id: invoice.id,
                    item_type: InvoiceItemType::Other,
                    description: label.clone(),
                    quantity: 1,
                    unit_price: *amount,
                    amount: *amount,
                    source_ref: None,
                },
            )
            .await?;
        }
        created.push(invoice);
    }
    tx.commit().await?;

    info!(
        house_id = %house_id,
        period = %period_month,
        mode = mode.as_str(),
        total,
        per_room = per_room_charge,
        invoices = created.len(),
        "Adjustment invoices created"
    );
    Ok(created)
}

/// Sign validation happens before any write. Returns the diff total.
pub fn validate_mode(mode: AdjustmentMode, diffs: &[AdjustmentDiff]) -> AppResult<i64> {
    if diffs.is_empty() {
        return Err(AppError::BadRequest(
            "At least one reconciliation diff must be selected.".to_string(),
        ));
    }
    for diff in diffs {
        match mode {
            AdjustmentMode::PositiveOnly if diff.amount <= 0 => {
                return Err(AppError::BadRequest(format!(
                    "Diff '{}' is not positive; positive_only adjustments accept only amounts \
                     greater than zero.",
                    diff.label
                )));
            }
            AdjustmentMode::NegativeOnly if diff.amount >= 0 => {
                return Err(AppError::BadRequest(format!(
                    "Diff '{}' is not negative; negative_only adjustments accept only amounts \
                     less than zero.",
                    diff.label
                )));
            }
            _ => {}
        }
    }
    let total: i64 = diffs.iter().map(|diff| diff.amount).sum();
    if mode == AdjustmentMode::Net && total == 0 {
        return Err(AppError::BadRequest(
            "Selected diffs net to zero; there is nothing to invoice.".to_string(),
        ));
    }
    Ok(total)
}

/// Ownership check backed by the landlord cache; house -> landlord pairs are
/// stable enough that a short TTL never serves a stale owner in practice.
async fn assert_house_owner(state: &AppState, house_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let landlord_id = match state.landlord_cache.get(&house_id).await {
        Some(cached) => cached,
        None => {
            let pool = state.pool()?;
            let found = occupancy::house_landlord(pool, house_id)
                .await?
                .ok_or_else(|| AppError::NotFound("House not found.".to_string()))?;
            state.landlord_cache.insert(house_id, found).await;
            found
        }
    };
    if landlord_id != user_id {
        return Err(AppError::Forbidden(
            "Forbidden: you do not manage this house.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(label: &str, amount: i64) -> AdjustmentDiff {
        AdjustmentDiff {
            label: label.to_string(),
            amount,
        }
    }

    #[test]
    fn positive_only_rejects_negative_diffs() {
        let diffs = vec![diff("Điện thiếu", 100_000), diff("Nước thừa", -50_000)];
        assert!(validate_mode(AdjustmentMode::PositiveOnly, &diffs).is_err());
    }

    #[test]
    fn negative_only_rejects_positive_diffs() {
        let diffs = vec![diff("Nước thừa", -50_000), diff("Điện thiếu", 100_000)];
        assert!(validate_mode(AdjustmentMode::NegativeOnly, &diffs).is_err());
    }

    #[test]
    fn net_allows_mixed_signs_but_not_a_zero_total() {
        let mixed = vec![diff("Điện thiếu", 100_000), diff("Nước thừa", -40_000)];
        assert_eq!(validate_mode(AdjustmentMode::Net, &mixed).unwrap(), 60_000);

        let zeroed = vec![diff("Điện thiếu", 50_000), diff("Nước thừa", -50_000)];
        assert!(validate_mode(AdjustmentMode::Net, &zeroed).is_err());
    }

    #[test]
    fn matching_signs_pass_and_sum() {
        let diffs = vec![diff("Điện thiếu", 100_000), diff("Nước thiếu", 50_000)];
        assert_eq!(
            validate_mode(AdjustmentMode::PositiveOnly, &diffs).unwrap(),
            150_000
        );

        let credits = vec![diff("Điện thừa", -30_000)];
        assert_eq!(
            validate_mode(AdjustmentMode::NegativeOnly, &credits).unwrap(),
            -30_000
        );
    }

    #[test]
    fn empty_selection_is_rejected() {
        assert!(validate_mode(AdjustmentMode::Net, &[]).is_err());
    }
}
