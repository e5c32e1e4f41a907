// libs/conversation-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduling_cell::dates::CalendarDate;
use scheduling_cell::models::{BookingDraft, SchedulingError, Urgency};
use shared_models::CallerRole;

// ==============================================================================
// CONVERSATION STATE
// ==============================================================================

/// Where a conversation currently is in the booking funnel. Terminal states
/// (completed, cancelled, escalated) accept no further transitions.
///
/// There is no separate booking state: the orchestrator runs inside the
/// confirm turn, which ends in `Completed`, `Escalated`, or back in
/// `CollectDate` on a rules rejection. A flow is never parked mid-booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Greeting,
    IntentDetection,
    CollectService,
    CollectDate,
    CollectTime,
    CollectDoctor,
    Confirm,
    Completed,
    Cancelled,
    Escalated,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Greeting => "greeting",
            ConversationState::IntentDetection => "intent_detection",
            ConversationState::CollectService => "collect_service",
            ConversationState::CollectDate => "collect_date",
            ConversationState::CollectTime => "collect_time",
            ConversationState::CollectDoctor => "collect_doctor",
            ConversationState::Confirm => "confirm",
            ConversationState::Completed => "completed",
            ConversationState::Cancelled => "cancelled",
            ConversationState::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "intent_detection" => ConversationState::IntentDetection,
            "collect_service" => ConversationState::CollectService,
            "collect_date" => ConversationState::CollectDate,
            "collect_time" => ConversationState::CollectTime,
            "collect_doctor" => ConversationState::CollectDoctor,
            "confirm" => ConversationState::Confirm,
            "completed" => ConversationState::Completed,
            "cancelled" => ConversationState::Cancelled,
            "escalated" => ConversationState::Escalated,
            _ => ConversationState::Greeting,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationState::Completed
                | ConversationState::Cancelled
                | ConversationState::Escalated
        )
    }
}

// ==============================================================================
// INTENT & ENTITIES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BookAppointment,
    RescheduleAppointment,
    CancelAppointment,
    CheckAvailability,
    GetInfo,
    HumanHandoff,
    Unknown,
}

/// One extracted value plus how sure the extractor is about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMatch<T> {
    pub value: T,
    pub confidence: f32,
}

impl<T> EntityMatch<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub date: Option<EntityMatch<CalendarDate>>,
    pub time: Option<EntityMatch<NaiveTime>>,
    pub service: Option<EntityMatch<String>>,
    pub doctor_name: Option<EntityMatch<String>>,
    pub urgency: Option<Urgency>,
}

/// Full analysis of one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAnalysis {
    pub intent: Intent,
    pub confidence: f32,
    pub entities: ExtractedEntities,
}

impl MessageAnalysis {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            entities: ExtractedEntities::default(),
        }
    }
}

// ==============================================================================
// FLOW
// ==============================================================================

/// One live conversation with one contact. Owned by the flow store; every
/// field mutation goes through the flow engine while the per-contact lock is
/// held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFlow {
    pub contact: String,
    pub organization_id: Uuid,
    pub caller_role: CallerRole,
    pub state: ConversationState,
    pub draft: BookingDraft,
    pub retries: u32,
    pub message_count: u32,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConversationFlow {
    pub fn new(
        contact: &str,
        organization_id: Uuid,
        caller_role: CallerRole,
        now: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            contact: contact.to_string(),
            organization_id,
            caller_role,
            state: ConversationState::Greeting,
            draft: BookingDraft::default(),
            retries: 0,
            message_count: 0,
            last_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    /// Records an inbound message and pushes the expiry window forward.
    pub fn touch(&mut self, message: &str, now: DateTime<Utc>, ttl_minutes: i64) {
        self.message_count += 1;
        self.last_message = Some(message.to_string());
        self.updated_at = now;
        self.expires_at = now + Duration::minutes(ttl_minutes);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the engine decided for one turn: the reply text and the state the
/// flow moved to.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub reply: String,
    pub new_state: ConversationState,
    pub should_continue: bool,
    pub requires_human_handoff: bool,
}

impl TurnResponse {
    pub fn continue_with(reply: String, state: ConversationState) -> Self {
        Self {
            reply,
            new_state: state,
            should_continue: true,
            requires_human_handoff: false,
        }
    }

    pub fn finished(reply: String, state: ConversationState) -> Self {
        Self {
            reply,
            new_state: state,
            should_continue: false,
            requires_human_handoff: false,
        }
    }

    pub fn handoff(reply: String) -> Self {
        Self {
            reply,
            new_state: ConversationState::Escalated,
            should_continue: false,
            requires_human_handoff: true,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Message analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Flow storage failed: {0}")]
    StorageFailed(String),

    #[error(transparent)]
    Booking(#[from] SchedulingError),
}
