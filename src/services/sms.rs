//! SMS collaborator. Best-effort only; a gateway failure never fails the
//! billing operation that triggered the message.

use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub struct InvoiceSms<'a> {
    pub phone: &'a str,
    pub room_code: &'a str,
    pub house_name: &'a str,
    pub address: &'a str,
    pub period_month: &'a str,
    pub amount: i64,
    pub due_date: &'a str,
    pub url: &'a str,
}

pub async fn send_invoice_notification(state: &AppState, sms: InvoiceSms<'_>) {
    let Some(gateway_url) = state.config.sms_gateway_url.clone() else {
        return;
    };

    let body = format!(
        "{house_name} ({address}) - Phong {room_code}: hoa don thang {period} \
         {amount} VND, han thanh toan {due_date}. Xem chi tiet: {url}",
        house_name = sms.house_name,
        address = sms.address,
        room_code = sms.room_code,
        period = sms.period_month,
        amount = format_vnd(sms.amount),
        due_date = sms.due_date,
        url = sms.url,
    );

    let payload = json!({
        "to": sms.phone,
        "content": body,
        "api_key": state.config.sms_gateway_api_key,
    });

    let client = state.http_client.clone();
    let phone = sms.phone.to_string();
    tokio::spawn(async move {
        match client.post(&gateway_url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), %phone, "SMS gateway rejected message");
            }
            Err(error) => warn!(%error, %phone, "SMS gateway call failed"),
            _ => {}
        }
    });
}

fn format_vnd(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().rev().enumerate() {
        if index > 0 && index % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::format_vnd;

    #[test]
    fn groups_thousands_with_dots() {
        assert_eq!(format_vnd(500_000), "500.000");
        assert_eq!(format_vnd(1_234_567), "1.234.567");
        assert_eq!(format_vnd(0), "0");
        assert_eq!(format_vnd(-75_000), "-75.000");
    }
}
