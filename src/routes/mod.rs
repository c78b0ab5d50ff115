use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod invoices;
pub mod payments;
pub mod reconciliation;
pub mod webhooks;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(invoices::router())
        .merge(payments::router())
        .merge(reconciliation::router())
        .merge(webhooks::router())
}
