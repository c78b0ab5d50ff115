use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invalid_enum;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SepayTransactionStatus {
    Received,
    Matched,
    Unmatched,
    Ignored,
}

impl SepayTransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "received" => Ok(Self::Received),
            "matched" => Ok(Self::Matched),
            "unmatched" => Ok(Self::Unmatched),
            "ignored" => Ok(Self::Ignored),
            other => Err(invalid_enum("sepay transaction status", other)),
        }
    }
}

impl TryFrom<String> for SepayTransactionStatus {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

/// Append-only log row for one inbound bank-transfer webhook delivery, keyed
/// by the provider-assigned transaction id. Presence of a row means the event
/// has been handled and must not be reprocessed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SepayTransaction {
    pub id: Uuid,
    pub sepay_transaction_id: String,
    pub gateway: String,
    pub account_number: String,
    pub transfer_type: String,
    pub transfer_amount: i64,
    pub content: String,
    pub code: Option<String>,
    pub reference_code: Option<String>,
    pub description: Option<String>,
    pub transaction_date: String,
    #[sqlx(try_from = "String")]
    pub status: SepayTransactionStatus,
    pub invoice_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
