use axum::{routing::get, Router};

use crate::state::AppState;

pub mod auth;
pub mod bills;
pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod reports;
pub mod rooms;
pub mod tenants;
pub mod transactions;
pub mod users;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(auth::router())
        .merge(rooms::router())
        .merge(tenants::router())
        .merge(bills::router())
        .merge(transactions::router())
        .merge(users::router())
        .merge(notifications::router())
        .merge(dashboard::router())
        .merge(reports::router())
}
