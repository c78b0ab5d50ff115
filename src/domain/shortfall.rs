use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invalid_enum;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallStatus {
    Pending,
    Applied,
}

impl ShortfallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            other => Err(invalid_enum("shortfall status", other)),
        }
    }
}

impl TryFrom<String> for ShortfallStatus {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

/// Snapshot of a flagged utility deficit for one (house, period). At most one
/// row per pair, enforced by a unique index.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UtilityShortfall {
    pub id: Uuid,
    pub house_id: Uuid,
    pub period_month: String,
    pub electricity_shortfall: i64,
    pub water_shortfall: i64,
    pub total_shortfall: i64,
    pub per_room_amount: i64,
    pub active_room_count: i64,
    #[sqlx(try_from = "String")]
    pub status: ShortfallStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentMode {
    PositiveOnly,
    NegativeOnly,
    Net,
}

impl AdjustmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PositiveOnly => "positive_only",
            Self::NegativeOnly => "negative_only",
            Self::Net => "net",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "positive_only" => Ok(Self::PositiveOnly),
            "negative_only" => Ok(Self::NegativeOnly),
            "net" => Ok(Self::Net),
            other => Err(invalid_enum("adjustment mode", other)),
        }
    }
}
