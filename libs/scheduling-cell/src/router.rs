// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/availability/week", get(handlers::get_week_availability))
        .route("/availability/navigate", post(handlers::post_navigate_week))
        .route("/appointments", post(handlers::book_appointment))
        .with_state(state)
}
