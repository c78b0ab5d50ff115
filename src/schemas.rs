use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::payment::PaymentMethod;
use crate::domain::shortfall::AdjustmentMode;
use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_invoice_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListInvoicesQuery {
    pub house_id: Option<Uuid>,
    pub period_month: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_invoice_limit")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiatePaymentInput {
    /// Defaults to the invoice's remaining amount.
    pub amount: Option<i64>,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmManualPaymentInput {
    #[validate(range(min = 1))]
    pub amount: i64,
    pub method: PaymentMethod,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttachProofInput {
    #[validate(length(min = 1, max = 1024))]
    pub file_ref: String,
}

/// Inbound SePay webhook body. Field names follow the provider's JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SepayWebhookPayload {
    pub id: i64,
    pub gateway: Option<String>,
    pub transaction_date: Option<String>,
    pub account_number: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub transfer_type: String,
    #[serde(default)]
    pub transfer_amount: i64,
    pub code: Option<String>,
    pub reference_code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UtilityReconciliationQuery {
    pub house_id: Option<Uuid>,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShortfallPeriodInput {
    pub house_id: Uuid,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdjustmentDiffInput {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAdjustmentInput {
    pub house_id: Uuid,
    #[validate(custom(function = validate_period_month))]
    pub period_month: String,
    #[validate(nested, length(min = 1))]
    pub diffs: Vec<AdjustmentDiffInput>,
    pub mode: AdjustmentMode,
    #[validate(range(min = 0, max = 90))]
    pub due_days: Option<i64>,
}

fn validate_period_month(value: &str) -> Result<(), validator::ValidationError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && value[5..]
            .parse::<u8>()
            .is_ok_and(|month| (1..=12).contains(&month));
    if well_formed {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("period_month");
        error.message = Some("expected YYYY-MM".into());
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_payload_accepts_provider_field_names() {
        let payload: SepayWebhookPayload = serde_json::from_str(
            r#"{
                "id": 92704,
                "gateway": "Vietcombank",
                "transactionDate": "2025-01-05 14:02:37",
                "accountNumber": "0123499999",
                "content": "CK INV3fa85f64-5717-4562-b3fc-2c963f66afa6 thang 01",
                "transferType": "in",
                "transferAmount": 2277000,
                "code": null,
                "referenceCode": "MBVCB.3278907687",
                "description": ""
            }"#,
        )
        .unwrap();
        assert_eq!(payload.id, 92704);
        assert_eq!(payload.transfer_type, "in");
        assert_eq!(payload.transfer_amount, 2_277_000);
        assert!(payload.code.is_none());
    }

    #[test]
    fn period_month_must_be_year_dash_month() {
        for good in ["2025-01", "1999-12"] {
            assert!(validate_period_month(good).is_ok(), "{good}");
        }
        for bad in ["2025-13", "2025-00", "2025-1", "jan-2025", "2025/01"] {
            assert!(validate_period_month(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn adjustment_input_validates_nested_diffs() {
        let input = CreateAdjustmentInput {
            house_id: Uuid::new_v4(),
            period_month: "2025-02".to_string(),
            diffs: vec![AdjustmentDiffInput {
                label: String::new(),
                amount: 10_000,
            }],
            mode: AdjustmentMode::Net,
            due_days: None,
        };
        assert!(validate_input(&input).is_err());
    }
}
