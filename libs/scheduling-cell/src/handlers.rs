// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{AppError, CallerRole};

use crate::dates::CalendarDate;
use crate::models::{
    AvailabilityFilters, BookingDraft, SchedulingError, SchedulingRules, WeekDirection,
};
use crate::services::availability::{navigate_week, WeeklyAvailabilityService};
use crate::services::booking::BookingOrchestrator;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct WeekQueryParams {
    pub organization_id: Uuid,
    pub week_start: String,
    pub service_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub role: Option<String>,
    pub use_standard_rules: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateWeekRequest {
    pub week_start: String,
    pub direction: WeekDirection,
    pub min_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub organization_id: Uuid,
    pub patient_contact: String,
    pub service: String,
    pub date: String,
    pub time: NaiveTime,
    pub doctor_id: Option<Uuid>,
    pub doctor_name: Option<String>,
    pub notes: Option<String>,
    pub role: Option<String>,
    pub use_standard_rules: Option<bool>,
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::InvalidDate(msg) => AppError::ValidationError(msg),
            SchedulingError::ValidationFailed { errors, suggestions } => {
                let mut detail = errors.join("; ");
                if !suggestions.is_empty() {
                    detail.push_str(&format!(" | Sugerencias: {}", suggestions.join("; ")));
                }
                AppError::Conflict(detail)
            }
            SchedulingError::PersistenceFailed(msg) => AppError::Database(msg),
            SchedulingError::StorageError(msg) => AppError::Database(msg),
            SchedulingError::ServiceNotFound(name) => {
                AppError::NotFound(format!("Service not found: {}", name))
            }
            SchedulingError::DoctorNotAvailable => {
                AppError::Conflict("No doctor available at the requested time".to_string())
            }
            SchedulingError::IncompleteDraft(fields) => {
                AppError::BadRequest(format!("Missing booking fields: {}", fields))
            }
        }
    }
}

fn parse_role(role: Option<&str>) -> CallerRole {
    role.and_then(CallerRole::parse).unwrap_or(CallerRole::Patient)
}

fn parse_date(raw: &str) -> Result<CalendarDate, AppError> {
    CalendarDate::parse(raw)
        .map_err(|e| AppError::ValidationError(format!("Invalid date '{}': {}", raw, e)))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

/// Weekly availability view: seven classified days from the Sunday of the
/// requested week.
pub async fn get_week_availability(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<WeekQueryParams>,
) -> Result<Json<Value>, AppError> {
    let week_start = parse_date(&params.week_start)?;
    let role = parse_role(params.role.as_deref());
    let filters = AvailabilityFilters {
        service_id: params.service_id,
        doctor_id: params.doctor_id,
        location_id: params.location_id,
    };

    let service = WeeklyAvailabilityService::new(&state);
    let days = service
        .week(
            params.organization_id,
            week_start,
            &filters,
            role,
            params.use_standard_rules.unwrap_or(false),
            Utc::now(),
        )
        .await?;

    Ok(Json(json!({
        "week_start": days.first().map(|d| d.date.to_string()),
        "days": days,
    })))
}

/// Computes the week start after a previous/next navigation, with guards
/// against navigating into fully-past weeks.
pub async fn post_navigate_week(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<NavigateWeekRequest>,
) -> Result<Json<Value>, AppError> {
    let rules = SchedulingRules::from_config(&state);
    let today = CalendarDate::today(Utc::now(), rules.clinic_utc_offset_minutes);

    let week_start = parse_date(&request.week_start)?.start_of_week();
    let min_date = match &request.min_date {
        Some(raw) => parse_date(raw)?,
        None => today.start_of_week(),
    };

    let result = navigate_week(week_start, request.direction, min_date, today);

    Ok(Json(json!({
        "week_start": result.to_string(),
        "moved": result != week_start,
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date(&request.date)?;
    let role = parse_role(request.role.as_deref());

    let draft = BookingDraft {
        service: Some(request.service),
        date: Some(date),
        time: Some(request.time),
        doctor_id: request.doctor_id,
        doctor_name: request.doctor_name,
        urgency: None,
        notes: request.notes,
    };

    let orchestrator = BookingOrchestrator::new(&state);
    let confirmation = orchestrator
        .book(
            &draft,
            &request.patient_contact,
            request.organization_id,
            role,
            request.use_standard_rules.unwrap_or(false),
            Utc::now(),
        )
        .await;

    match confirmation {
        Ok(confirmation) => Ok(Json(json!({
            "success": true,
            "confirmation": confirmation,
        }))),
        // Rule violations are a structured payload, not a bare error string.
        Err(SchedulingError::ValidationFailed { errors, suggestions }) => Ok(Json(json!({
            "success": false,
            "errors": errors,
            "suggestions": suggestions,
        }))),
        Err(e) => Err(e.into()),
    }
}
