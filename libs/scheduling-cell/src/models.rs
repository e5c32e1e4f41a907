// libs/scheduling-cell/src/models.rs
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::CallerRole;

use crate::dates::CalendarDate;

// ==============================================================================
// BOOKING MODELS
// ==============================================================================

/// Per-conversation accumulator for a booking in progress. Owned exclusively
/// by one conversation (or one UI request); never shared across patients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingDraft {
    pub service: Option<String>,
    pub date: Option<CalendarDate>,
    pub time: Option<NaiveTime>,
    pub doctor_id: Option<Uuid>,
    pub doctor_name: Option<String>,
    pub urgency: Option<Urgency>,
    pub notes: Option<String>,
}

impl BookingDraft {
    /// Fields still required before the draft can be booked.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.service.is_none() {
            missing.push("servicio");
        }
        if self.date.is_none() {
            missing.push("fecha");
        }
        if self.time.is_none() {
            missing.push("hora");
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// A fully-specified candidate booking, as seen by the rules engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub organization_id: Uuid,
    pub service_name: String,
    pub date: CalendarDate,
    pub time: NaiveTime,
    pub doctor_id: Option<Uuid>,
    pub caller_role: CallerRole,
    pub use_standard_rules: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub confirmation_code: String,
    pub service: String,
    pub date: CalendarDate,
    pub time: NaiveTime,
    pub doctor_name: Option<String>,
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

/// Aggregated outcome of one rules-engine pass. Violations are data, not
/// exceptions; every sub-validation runs so the caller sees all problems in
/// a single round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRuleValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl BusinessRuleValidation {
    pub fn new() -> Self {
        Self {
            valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

impl Default for BusinessRuleValidation {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunable parameters for the rules engine and the availability aggregator.
#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub advance_notice_hours: i64,
    pub clinic_utc_offset_minutes: i32,
    pub fallback_opening: NaiveTime,
    pub fallback_closing: NaiveTime,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            advance_notice_hours: 24,
            clinic_utc_offset_minutes: -360,
            fallback_opening: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            fallback_closing: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &shared_config::AppConfig) -> Self {
        Self {
            clinic_utc_offset_minutes: config.clinic_utc_offset_minutes,
            ..Self::default()
        }
    }
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityLevel {
    None,
    Low,
    Medium,
    High,
}

impl AvailabilityLevel {
    /// Fixed thresholds: 0 → none, 1–2 → low, 3–5 → medium, ≥6 → high.
    pub fn from_count(open_slots: usize) -> Self {
        match open_slots {
            0 => AvailabilityLevel::None,
            1..=2 => AvailabilityLevel::Low,
            3..=5 => AvailabilityLevel::Medium,
            _ => AvailabilityLevel::High,
        }
    }
}

/// One calendar day's aggregate in a weekly view. Computed fresh on every
/// request; never cached, since blocking depends on "now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub date: CalendarDate,
    pub day_name: String,
    pub open_slots: usize,
    pub level: AvailabilityLevel,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityFilters {
    pub service_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

/// Slot descriptor returned by the availability-fetch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInfo {
    pub start_time: NaiveTime,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub available: bool,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeekDirection {
    Previous,
    Next,
}

// ==============================================================================
// STORAGE CONTRACT MODELS
// ==============================================================================

/// Weekly business-hours table row: one entry per weekday (0 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHoursEntry {
    pub day_of_week: u32,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub full_name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    InProgress,
    PendingPayment,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that occupy a slot for conflict purposes.
    pub fn blocks_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress
                | AppointmentStatus::PendingPayment
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::PendingPayment => "pending_payment",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Appointment row as owned by the storage collaborator. Status transitions
/// after creation belong to the surrounding application, not this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: CalendarDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: CalendarDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Booking rejected by business rules")]
    ValidationFailed {
        errors: Vec<String>,
        suggestions: Vec<String>,
    },

    #[error("Failed to persist appointment: {0}")]
    PersistenceFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("No doctor available at the requested time")]
    DoctorNotAvailable,

    #[error("Incomplete booking draft: missing {0}")]
    IncompleteDraft(String),
}
