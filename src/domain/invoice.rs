use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invalid_enum;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(invalid_enum("invoice status", other)),
        }
    }

    /// Whether a payment may still be recorded against an invoice in this
    /// status.
    pub fn is_payable(self) -> bool {
        !matches!(self, Self::Paid | Self::Cancelled)
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Normal,
    Adjustment,
    CustomExpense,
}

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Adjustment => "adjustment",
            Self::CustomExpense => "custom_expense",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "normal" => Ok(Self::Normal),
            "adjustment" => Ok(Self::Adjustment),
            "custom_expense" => Ok(Self::CustomExpense),
            other => Err(invalid_enum("invoice type", other)),
        }
    }
}

impl TryFrom<String> for InvoiceType {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceItemType {
    Rent,
    Electricity,
    Water,
    Service,
    Other,
}

impl InvoiceItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rent => "rent",
            Self::Electricity => "electricity",
            Self::Water => "water",
            Self::Service => "service",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "rent" => Ok(Self::Rent),
            "electricity" => Ok(Self::Electricity),
            "water" => Ok(Self::Water),
            "service" => Ok(Self::Service),
            "other" => Ok(Self::Other),
            other => Err(invalid_enum("invoice item type", other)),
        }
    }
}

impl TryFrom<String> for InvoiceItemType {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

/// One billing period for one active contract. `paid_amount` is always the
/// sum of this invoice's SUCCESS payments, re-derived on every confirmation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub house_id: Uuid,
    pub room_id: Uuid,
    pub period_month: String,
    pub due_date: NaiveDate,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub late_fee_percent: i64,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    #[sqlx(try_from = "String")]
    pub invoice_type: InvoiceType,
    pub is_netting: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn remaining_amount(&self) -> i64 {
        (self.total_amount - self.paid_amount).max(0)
    }

    /// OVERDUE is a read-time view: a sent (or partially paid) invoice whose
    /// due date has passed. It is never stored by this core.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status {
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid if self.due_date < today => {
                InvoiceStatus::Overdue
            }
            status => status,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    #[sqlx(try_from = "String")]
    pub item_type: InvoiceItemType,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    /// Structured origin marker for generated make-up/adjustment items.
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Resolve the stored status after a payment-set change. CANCELLED is never
/// left and CANCELLED/DRAFT are never entered from here; a DRAFT that money
/// actually arrived against (webhook, manual confirmation) does move forward,
/// so a fully paid invoice can never linger in a deletable DRAFT.
pub fn resolve_status_after_payment(current: InvoiceStatus, paid: i64, total: i64) -> InvoiceStatus {
    match current {
        InvoiceStatus::Cancelled => current,
        _ if paid >= total && total > 0 => InvoiceStatus::Paid,
        _ if paid > 0 => InvoiceStatus::PartiallyPaid,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_is_exhaustive_and_strict() {
        assert_eq!(InvoiceStatus::parse("sent").unwrap(), InvoiceStatus::Sent);
        assert_eq!(
            InvoiceStatus::parse("partially_paid").unwrap(),
            InvoiceStatus::PartiallyPaid
        );
        assert!(InvoiceStatus::parse("SENT").is_err());
        assert!(InvoiceStatus::parse("unknown").is_err());
    }

    #[test]
    fn payment_resolution_rules() {
        use InvoiceStatus::*;
        assert_eq!(resolve_status_after_payment(Sent, 500_000, 500_000), Paid);
        assert_eq!(
            resolve_status_after_payment(Sent, 600_000, 500_000),
            Paid,
            "overpayment still resolves to paid"
        );
        assert_eq!(
            resolve_status_after_payment(Sent, 100_000, 500_000),
            PartiallyPaid
        );
        assert_eq!(resolve_status_after_payment(Sent, 0, 500_000), Sent);
        assert_eq!(resolve_status_after_payment(Overdue, 0, 500_000), Overdue);
        // Recompute never resurrects a cancelled invoice.
        assert_eq!(
            resolve_status_after_payment(Cancelled, 500_000, 500_000),
            Cancelled
        );
    }

    #[test]
    fn payment_against_a_draft_moves_it_forward() {
        use InvoiceStatus::*;
        // A bank transfer can land before the landlord ever sends the
        // invoice; the money still has to show.
        assert_eq!(resolve_status_after_payment(Draft, 500_000, 500_000), Paid);
        assert_eq!(
            resolve_status_after_payment(Draft, 100_000, 500_000),
            PartiallyPaid
        );
        // No money, no transition: an untouched draft stays a draft.
        assert_eq!(resolve_status_after_payment(Draft, 0, 500_000), Draft);
    }

    #[test]
    fn overdue_is_derived_at_read_time() {
        let base = Invoice {
            id: Uuid::new_v4(),
            contract_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            landlord_id: Uuid::new_v4(),
            house_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            period_month: "2026-01".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            total_amount: 500_000,
            paid_amount: 0,
            late_fee_percent: 0,
            status: InvoiceStatus::Sent,
            invoice_type: InvoiceType::Normal,
            is_netting: false,
            sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let after_due = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let before_due = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(base.effective_status(after_due), InvoiceStatus::Overdue);
        assert_eq!(base.effective_status(before_due), InvoiceStatus::Sent);

        let paid = Invoice {
            status: InvoiceStatus::Paid,
            ..base
        };
        assert_eq!(paid.effective_status(after_due), InvoiceStatus::Paid);
    }
}
