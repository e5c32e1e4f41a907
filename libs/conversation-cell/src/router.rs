// libs/conversation-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use shared_config::AppConfig;

use crate::handlers::{self, ConversationCellState};

pub fn conversation_routes(config: Arc<AppConfig>) -> Router {
    let state = Arc::new(ConversationCellState::new(&config));
    Router::new()
        .route("/webhook", post(handlers::inbound_message))
        .with_state(state)
}
