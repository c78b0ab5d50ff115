use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invalid_enum;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankQr,
    Sepay,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankQr => "bank_qr",
            Self::Sepay => "sepay",
        }
    }

    /// Strict parse. The upstream system silently defaulted unknown method
    /// strings to cash; here they are rejected.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "cash" => Ok(Self::Cash),
            "bank_qr" => Ok(Self::BankQr),
            "sepay" => Ok(Self::Sepay),
            other => Err(invalid_enum("payment method", other)),
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(invalid_enum("payment status", other)),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).map_err(|e| e.to_string())
    }
}

/// One funds-receipt attempt against one invoice. At most one PENDING payment
/// may exist per invoice; a payment never regresses from SUCCESS.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub method: PaymentMethod,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub transaction_code: String,
    pub sepay_transaction_id: Option<String>,
    pub note: Option<String>,
    pub proof_image_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_rejects_unknown_values() {
        assert_eq!(PaymentMethod::parse("cash").unwrap(), PaymentMethod::Cash);
        assert_eq!(
            PaymentMethod::parse("bank_qr").unwrap(),
            PaymentMethod::BankQr
        );
        assert_eq!(PaymentMethod::parse("sepay").unwrap(), PaymentMethod::Sepay);
        assert!(PaymentMethod::parse("momo").is_err());
        assert!(PaymentMethod::parse("").is_err());
    }
}
