// libs/conversation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{AppError, CallerRole};

use crate::models::ConversationError;
use crate::services::flow::FlowEngine;
use crate::services::store::FlowStore;

/// Shared state for the conversation endpoints: one engine and one live
/// flow registry for the process.
pub struct ConversationCellState {
    pub flows: FlowStore,
    pub engine: FlowEngine,
}

impl ConversationCellState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            flows: FlowStore::new(config.flow_ttl_minutes),
            engine: FlowEngine::new(config),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub contact: String,
    pub organization_id: Uuid,
    pub message: String,
    pub role: Option<String>,
}

impl From<ConversationError> for AppError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::AnalysisFailed(msg) => AppError::Internal(msg),
            ConversationError::StorageFailed(msg) => AppError::Database(msg),
            ConversationError::Booking(e) => e.into(),
        }
    }
}

/// Inbound message webhook. One call is one conversation turn; turns from
/// the same contact are serialized by the per-flow lock.
pub async fn inbound_message(
    State(state): State<Arc<ConversationCellState>>,
    Json(inbound): Json<InboundMessage>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let role = inbound
        .role
        .as_deref()
        .and_then(CallerRole::parse)
        .unwrap_or(CallerRole::Patient);

    let flow_handle = state
        .flows
        .acquire(&inbound.contact, inbound.organization_id, role, now)
        .await;
    let mut flow = flow_handle.lock().await;

    flow.touch(&inbound.message, now, state.flows.ttl_minutes());
    let response = state
        .engine
        .handle_turn(&mut flow, &inbound.message, now)
        .await?;

    let terminal = response.new_state.is_terminal();
    drop(flow);
    if terminal {
        state.flows.remove(&inbound.contact).await;
    }

    Ok(Json(json!({
        "reply": response.reply,
        "state": response.new_state.as_str(),
        "should_continue": response.should_continue,
        "requires_human_handoff": response.requires_human_handoff,
    })))
}
