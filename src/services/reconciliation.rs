//! Utility Reconciliation Calculator: compares metered-utility expense against
//! what the period's invoices actually billed, and reports the outstanding
//! shortfall per category and per room. Strictly read-only; the shortfall
//! generator consumes this report to write invoices.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::invoice::InvoiceItemType;
use crate::error::{AppError, AppResult};
use crate::repository::{invoices, occupancy};
use crate::services::proration::{ceil_div, split_proportional};
use crate::state::AppState;

pub const CATEGORY_ELECTRICITY: &str = "electricity";
pub const CATEGORY_WATER: &str = "water";

/// Tenant-visible marker carried on every make-up line item.
pub fn make_up_description(period_month: &str) -> String {
    format!("Bù điện nước tháng {period_month}")
}

/// Structured marker used first for duplicate detection; the description
/// match is kept as a fallback for rows written before the marker existed.
pub fn make_up_source_ref(period_month: &str) -> String {
    format!("utility-shortfall:{period_month}")
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDiff {
    pub category: String,
    pub expense: i64,
    pub collected: i64,
    /// Clamped at zero; over-collection is never reported as negative.
    pub shortfall: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerRoomSplit {
    pub electricity_per_room: i64,
    pub water_per_room: i64,
    pub total_per_room: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtilityReport {
    pub house_id: Option<Uuid>,
    pub period_month: String,
    pub categories: Vec<CategoryDiff>,
    pub electricity_shortfall: i64,
    pub water_shortfall: i64,
    pub total_shortfall: i64,
    pub already_compensated: i64,
    pub remaining_shortfall: i64,
    pub active_room_count: i64,
    /// Remaining shortfall split back into categories, per room. Absent when
    /// nothing remains or no room can carry a charge.
    pub per_room: Option<PerRoomSplit>,
    /// Pre-compensation per-room amount. Period-stable: repeated partial
    /// applications charge every room the same figure.
    pub raw_per_room_amount: i64,
}

pub async fn load_report(
    state: &AppState,
    landlord_id: Uuid,
    house_id: Option<Uuid>,
    month: u32,
    year: i32,
) -> AppResult<UtilityReport> {
    let pool = state.pool()?;
    let (from, to_exclusive) = month_range(month, year)?;
    let period_month = format!("{year:04}-{month:02}");

    let mut categories =
        occupancy::list_expense_categories(pool, landlord_id, house_id, from, to_exclusive).await?;
    for fixed in [CATEGORY_ELECTRICITY, CATEGORY_WATER] {
        if !categories.iter().any(|c| c == fixed) {
            categories.push(fixed.to_string());
        }
    }
    categories.sort();

    let mut diffs = Vec::with_capacity(categories.len());
    for category in categories {
        let expense =
            occupancy::sum_expenses(pool, landlord_id, house_id, &category, from, to_exclusive)
                .await?;
        let collected = match category.as_str() {
            CATEGORY_ELECTRICITY => {
                invoices::sum_billed_by_type(
                    pool,
                    landlord_id,
                    house_id,
                    &period_month,
                    InvoiceItemType::Electricity,
                )
                .await?
            }
            CATEGORY_WATER => {
                invoices::sum_billed_by_type(
                    pool,
                    landlord_id,
                    house_id,
                    &period_month,
                    InvoiceItemType::Water,
                )
                .await?
            }
            other => {
                invoices::sum_billed_by_description(pool, landlord_id, house_id, &period_month, other)
                    .await?
            }
        };
        diffs.push(CategoryDiff {
            shortfall: (expense - collected).max(0),
            category,
            expense,
            collected,
        });
    }

    let already_compensated = invoices::sum_compensated(
        pool,
        landlord_id,
        house_id,
        &period_month,
        &make_up_source_ref(&period_month),
        &make_up_description(&period_month),
    )
    .await?;
    let active_room_count =
        occupancy::active_room_count(pool, landlord_id, house_id).await?;

    Ok(compute_report(
        house_id,
        period_month,
        diffs,
        already_compensated,
        active_room_count,
    ))
}

/// Pure arithmetic over already-gathered sums. Rounds every per-room figure
/// up, so the house may collect a few dong more than the exact shortfall but
/// never leaves a residual behind.
pub fn compute_report(
    house_id: Option<Uuid>,
    period_month: String,
    categories: Vec<CategoryDiff>,
    already_compensated: i64,
    active_room_count: i64,
) -> UtilityReport {
    let category_shortfall = |name: &str| {
        categories
            .iter()
            .find(|diff| diff.category == name)
            .map(|diff| diff.shortfall)
            .unwrap_or(0)
    };
    let electricity_shortfall = category_shortfall(CATEGORY_ELECTRICITY);
    let water_shortfall = category_shortfall(CATEGORY_WATER);
    let total_shortfall = electricity_shortfall + water_shortfall;
    let remaining_shortfall = (total_shortfall - already_compensated).max(0);

    let per_room = if remaining_shortfall > 0 && active_room_count > 0 {
        let (electricity_part, water_part) =
            split_proportional(remaining_shortfall, electricity_shortfall, water_shortfall);
        let electricity_per_room = ceil_div(electricity_part, active_room_count);
        let water_per_room = ceil_div(water_part, active_room_count);
        Some(PerRoomSplit {
            electricity_per_room,
            water_per_room,
            total_per_room: electricity_per_room + water_per_room,
        })
    } else {
        None
    };

    let raw_per_room_amount = if active_room_count > 0 {
        ceil_div(total_shortfall, active_room_count)
    } else {
        0
    };

    UtilityReport {
        house_id,
        period_month,
        categories,
        electricity_shortfall,
        water_shortfall,
        total_shortfall,
        already_compensated,
        remaining_shortfall,
        active_room_count,
        per_room,
        raw_per_room_amount,
    }
}

fn month_range(month: u32, year: i32) -> AppResult<(NaiveDate, NaiveDate)> {
    let from = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::BadRequest("Invalid month/year.".to_string()))?;
    let to_exclusive = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::BadRequest("Invalid month/year.".to_string()))?;
    Ok((from, to_exclusive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(category: &str, expense: i64, collected: i64) -> CategoryDiff {
        CategoryDiff {
            category: category.to_string(),
            expense,
            collected,
            shortfall: (expense - collected).max(0),
        }
    }

    #[test]
    fn uncollected_utility_cost_splits_evenly_across_rooms() {
        let report = compute_report(
            None,
            "2025-01".to_string(),
            vec![diff(CATEGORY_ELECTRICITY, 1_000_000, 700_000)],
            0,
            4,
        );
        assert_eq!(report.electricity_shortfall, 300_000);
        assert_eq!(report.total_shortfall, 300_000);
        assert_eq!(report.remaining_shortfall, 300_000);
        assert_eq!(report.raw_per_room_amount, 75_000);
        let per_room = report.per_room.unwrap();
        assert_eq!(per_room.electricity_per_room, 75_000);
        assert_eq!(per_room.water_per_room, 0);
        assert_eq!(per_room.total_per_room, 75_000);
    }

    #[test]
    fn over_collection_clamps_to_zero() {
        let report = compute_report(
            None,
            "2025-01".to_string(),
            vec![
                diff(CATEGORY_ELECTRICITY, 500_000, 900_000),
                diff(CATEGORY_WATER, 200_000, 200_000),
            ],
            0,
            3,
        );
        assert_eq!(report.total_shortfall, 0);
        assert_eq!(report.remaining_shortfall, 0);
        assert!(report.per_room.is_none());
        assert_eq!(report.raw_per_room_amount, 0);
    }

    #[test]
    fn compensation_diminishes_remaining_but_not_raw_per_room() {
        let report = compute_report(
            None,
            "2025-02".to_string(),
            vec![
                diff(CATEGORY_ELECTRICITY, 600_000, 300_000),
                diff(CATEGORY_WATER, 300_000, 150_000),
            ],
            150_000,
            3,
        );
        assert_eq!(report.total_shortfall, 450_000);
        assert_eq!(report.remaining_shortfall, 300_000);
        // 150,000 raw per room regardless of partial compensation.
        assert_eq!(report.raw_per_room_amount, 150_000);
        let per_room = report.per_room.unwrap();
        // 2:1 electricity/water ratio preserved in the remaining split.
        assert_eq!(per_room.electricity_per_room, ceil_div(200_000, 3));
        assert_eq!(per_room.water_per_room, ceil_div(100_000, 3));
    }

    #[test]
    fn rounding_never_under_collects() {
        let report = compute_report(
            None,
            "2025-03".to_string(),
            vec![diff(CATEGORY_ELECTRICITY, 100_000, 0)],
            0,
            3,
        );
        let per_room = report.per_room.unwrap();
        assert!(per_room.total_per_room * 3 >= report.remaining_shortfall);
        assert_eq!(per_room.electricity_per_room, 33_334);
    }

    #[test]
    fn fully_compensated_period_reports_nothing_remaining() {
        let report = compute_report(
            None,
            "2025-04".to_string(),
            vec![diff(CATEGORY_WATER, 90_000, 0)],
            90_000,
            2,
        );
        assert_eq!(report.remaining_shortfall, 0);
        assert!(report.per_room.is_none());
    }

    #[test]
    fn month_range_covers_the_calendar_month() {
        let (from, to) = month_range(12, 2024).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(month_range(13, 2024).is_err());
    }
}
