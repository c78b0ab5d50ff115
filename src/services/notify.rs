//! In-app/push notification collaborator. Strictly fire-and-forget: a failed
//! notification is logged and discarded, never surfaced to the operation
//! that triggered it.

use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

pub struct Notification {
    pub user_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Persist an in-app notification row and push it to the external gateway.
/// Called after the financial transaction has committed.
pub async fn notify_user(state: &AppState, notification: Notification) {
    let Ok(pool) = state.pool() else {
        return;
    };

    if let Err(error) = insert_row(pool, &notification).await {
        warn!(
            user_id = %notification.user_id,
            kind = notification.kind,
            %error,
            "Failed to store notification"
        );
    }

    // Push delivery happens off the request path entirely.
    if let Some(gateway_url) = state.config.push_gateway_url.clone() {
        let client = state.http_client.clone();
        let payload = json!({
            "user_id": notification.user_id,
            "type": notification.kind,
            "title": notification.title,
            "body": notification.body,
            "data": notification.data,
        });
        tokio::spawn(async move {
            if let Err(error) = client.post(&gateway_url).json(&payload).send().await {
                warn!(%error, "Push gateway call failed");
            }
        });
    }
}

async fn insert_row(pool: &PgPool, notification: &Notification) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_notifications (user_id, kind, title, body, data)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(notification.user_id)
    .bind(notification.kind)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.data)
    .execute(pool)
    .await?;
    Ok(())
}
