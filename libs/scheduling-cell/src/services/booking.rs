// libs/scheduling-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{CallerRole, NoopNotifier, Notifier};

use crate::models::{
    AppointmentStatus, BookingConfirmation, BookingDraft, BookingRequest, NewAppointment,
    SchedulingError, SchedulingRules,
};
use crate::services::rules::BusinessRulesEngine;
use crate::store::{RestSchedulingStore, SchedulingStore};

/// Turns a fully-resolved booking draft into an appointment record. The
/// rules engine is always re-run here: time has elapsed since any earlier
/// validation pass and state may have changed.
pub struct BookingOrchestrator {
    store: Arc<dyn SchedulingStore>,
    engine: BusinessRulesEngine,
    notifier: Arc<dyn Notifier>,
}

impl BookingOrchestrator {
    pub fn new(config: &AppConfig) -> Self {
        let store: Arc<dyn SchedulingStore> = Arc::new(RestSchedulingStore::new(config));
        let engine =
            BusinessRulesEngine::with_store(Arc::clone(&store), SchedulingRules::from_config(config));
        Self {
            store,
            engine,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_parts(
        store: Arc<dyn SchedulingStore>,
        engine: BusinessRulesEngine,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn book(
        &self,
        draft: &BookingDraft,
        patient_contact: &str,
        organization_id: Uuid,
        caller_role: CallerRole,
        use_standard_rules: bool,
        now: DateTime<Utc>,
    ) -> Result<BookingConfirmation, SchedulingError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(SchedulingError::IncompleteDraft(missing.join(", ")));
        }

        let service_name = draft.service.clone().unwrap_or_default();
        let date = draft.date.ok_or_else(|| SchedulingError::IncompleteDraft("fecha".into()))?;
        let time = draft.time.ok_or_else(|| SchedulingError::IncompleteDraft("hora".into()))?;

        info!(
            "Booking {} on {} at {} for contact {} (org {})",
            service_name, date, time, patient_contact, organization_id
        );

        // Step 1: full rules pass against the current state of the world.
        let request = BookingRequest {
            organization_id,
            service_name: service_name.clone(),
            date,
            time,
            doctor_id: draft.doctor_id,
            caller_role,
            use_standard_rules,
        };

        let validation = self.engine.validate_booking(&request, now).await?;
        if !validation.valid {
            return Err(SchedulingError::ValidationFailed {
                errors: validation.errors,
                suggestions: validation.suggestions,
            });
        }

        // Step 2: resolve or create the patient by contact identifier.
        let patient = self
            .store
            .find_or_create_patient(organization_id, patient_contact)
            .await?;

        // Step 3: resolve the service by name.
        let service = self
            .store
            .find_active_service(organization_id, &service_name)
            .await?
            .ok_or_else(|| SchedulingError::ServiceNotFound(service_name.clone()))?;

        // Step 4: resolve the doctor (explicit id, matched name, or the
        // first doctor with an open slot at the requested time).
        let (doctor_id, doctor_name) = self.resolve_doctor(draft, organization_id, date, time).await?;

        // Step 5: persist. Persistence failure is surfaced, not retried;
        // retry policy belongs to the outer layer.
        let appointment = self
            .store
            .insert_appointment(&NewAppointment {
                organization_id,
                patient_id: patient.id,
                doctor_id,
                service_id: service.id,
                date,
                time,
                status: AppointmentStatus::Confirmed,
                notes: draft.notes.clone(),
            })
            .await?;

        let confirmation_code = confirmation_code(appointment.id);

        info!(
            "Appointment {} booked with doctor {} ({})",
            appointment.id, doctor_id, confirmation_code
        );

        // Delivery of the confirmation is delegated; a failed notification
        // never fails the booking.
        let message = format!(
            "Tu cita de {} quedó confirmada para el {} {} a las {}. Código: {}",
            service.name,
            date.day_name(),
            date,
            time.format("%H:%M"),
            confirmation_code
        );
        if let Err(e) = self.notifier.send_text(patient_contact, &message).await {
            warn!("Confirmation notification to {} failed: {}", patient_contact, e);
        }

        Ok(BookingConfirmation {
            appointment_id: appointment.id,
            confirmation_code,
            service: service.name,
            date,
            time,
            doctor_name,
        })
    }

    async fn resolve_doctor(
        &self,
        draft: &BookingDraft,
        organization_id: Uuid,
        date: crate::dates::CalendarDate,
        time: chrono::NaiveTime,
    ) -> Result<(Uuid, Option<String>), SchedulingError> {
        if let Some(id) = draft.doctor_id {
            return Ok((id, draft.doctor_name.clone()));
        }

        if let Some(name) = &draft.doctor_name {
            let doctors = self.store.doctors(organization_id).await?;
            let wanted = name.to_lowercase();
            if let Some(doctor) = doctors
                .iter()
                .find(|d| d.full_name.to_lowercase().contains(&wanted))
            {
                return Ok((doctor.id, Some(doctor.full_name.clone())));
            }
            debug!("Doctor name '{}' did not match, falling back to any doctor", name);
        }

        let slots = self
            .store
            .day_slots(organization_id, date, &Default::default())
            .await?;
        slots
            .iter()
            .find(|s| s.available && s.start_time == time)
            .map(|s| (s.doctor_id, Some(s.doctor_name.clone())))
            .ok_or(SchedulingError::DoctorNotAvailable)
    }
}

/// Short, human-readable confirmation identifier derived from the
/// appointment id.
fn confirmation_code(appointment_id: Uuid) -> String {
    let simple = appointment_id.simple().to_string();
    format!("CITA-{}", simple[..8].to_uppercase())
}
