// libs/scheduling-cell/src/services/rules.rs
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::RolePolicy;

use crate::dates::CalendarDate;
use crate::models::{
    BookingRequest, BusinessHoursEntry, BusinessRuleValidation, SchedulingError, SchedulingRules,
};
use crate::store::{RestSchedulingStore, SchedulingStore};

/// Validates a candidate booking against every business rule in one pass.
/// All sub-validations run (no short-circuit) so a conversational caller
/// sees every problem in a single message exchange.
///
/// "now" is always an explicit parameter; this engine never reads a clock.
pub struct BusinessRulesEngine {
    store: Arc<dyn SchedulingStore>,
    rules: SchedulingRules,
    policy: RolePolicy,
}

impl BusinessRulesEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(
            Arc::new(RestSchedulingStore::new(config)),
            SchedulingRules::from_config(config),
        )
    }

    pub fn with_store(store: Arc<dyn SchedulingStore>, rules: SchedulingRules) -> Self {
        Self {
            store,
            rules,
            policy: RolePolicy::default(),
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    pub async fn validate_booking(
        &self,
        request: &BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<BusinessRuleValidation, SchedulingError> {
        debug!(
            "Validating booking for org {} on {} at {} (role {})",
            request.organization_id, request.date, request.time, request.caller_role
        );

        let mut validation = BusinessRuleValidation::new();
        let hours_table = self.store.business_hours(request.organization_id).await?;

        self.check_advance_notice(request, &hours_table, now, &mut validation);
        self.check_business_hours(request, &hours_table, &mut validation);
        self.check_doctor_availability(request, &mut validation).await?;
        self.check_conflicts(request, &mut validation).await?;
        self.check_service(request, &mut validation).await?;

        validation.valid = validation.errors.is_empty();

        if !validation.valid {
            warn!(
                "Booking rejected for org {}: {} rule violation(s)",
                request.organization_id,
                validation.errors.len()
            );
        }

        Ok(validation)
    }

    /// The candidate slot as an instant, interpreting date+time in the
    /// clinic's operating timezone.
    fn candidate_instant(&self, date: CalendarDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.as_naive().and_time(time);
        let utc_naive = local - Duration::minutes(self.rules.clinic_utc_offset_minutes as i64);
        Utc.from_utc_datetime(&utc_naive)
    }

    fn opening_hour(&self, hours_table: &[BusinessHoursEntry], date: CalendarDate) -> NaiveTime {
        hours_table
            .iter()
            .find(|e| e.active && e.day_of_week == date.weekday_index())
            .map(|e| e.opens_at)
            .unwrap_or(self.rules.fallback_opening)
    }

    fn next_active_day(
        &self,
        hours_table: &[BusinessHoursEntry],
        after: CalendarDate,
    ) -> Option<CalendarDate> {
        (1..=7)
            .map(|offset| after.add_days(offset))
            .find(|d| {
                hours_table
                    .iter()
                    .any(|e| e.active && e.day_of_week == d.weekday_index())
            })
    }

    fn check_advance_notice(
        &self,
        request: &BookingRequest,
        hours_table: &[BusinessHoursEntry],
        now: DateTime<Utc>,
        validation: &mut BusinessRuleValidation,
    ) {
        if self
            .policy
            .exempt_from_advance_notice(request.caller_role, request.use_standard_rules)
        {
            return;
        }

        let candidate = self.candidate_instant(request.date, request.time);
        let required = Duration::hours(self.rules.advance_notice_hours);

        if candidate - now < required {
            validation.errors.push(format!(
                "Las citas requieren al menos {} horas de anticipación",
                self.rules.advance_notice_hours
            ));

            let next_day = self
                .next_active_day(hours_table, request.date)
                .unwrap_or_else(|| request.date.add_days(1));
            let opening = self.opening_hour(hours_table, next_day);
            validation.suggestions.push(format!(
                "Próximo horario válido: {} {} a las {}",
                next_day.day_name(),
                next_day,
                opening.format("%H:%M")
            ));
        }
    }

    fn check_business_hours(
        &self,
        request: &BookingRequest,
        hours_table: &[BusinessHoursEntry],
        validation: &mut BusinessRuleValidation,
    ) {
        let entry = hours_table
            .iter()
            .find(|e| e.day_of_week == request.date.weekday_index());

        match entry {
            Some(entry) if entry.active => {
                // Valid window is [opens_at, closes_at).
                if request.time < entry.opens_at || request.time >= entry.closes_at {
                    validation.errors.push(format!(
                        "La hora {} está fuera del horario de atención",
                        request.time.format("%H:%M")
                    ));
                    validation.suggestions.push(format!(
                        "El {} atendemos de {} a {}",
                        request.date.day_name(),
                        entry.opens_at.format("%H:%M"),
                        entry.closes_at.format("%H:%M")
                    ));
                }
            }
            _ => {
                validation.errors.push(format!(
                    "La clínica no atiende el {}",
                    request.date.day_name()
                ));
                if let Some(next) = self.next_active_day(hours_table, request.date) {
                    validation.suggestions.push(format!(
                        "El próximo día disponible es el {} {}",
                        next.day_name(),
                        next
                    ));
                }
            }
        }
    }

    async fn check_doctor_availability(
        &self,
        request: &BookingRequest,
        validation: &mut BusinessRuleValidation,
    ) -> Result<(), SchedulingError> {
        if let Some(doctor_id) = request.doctor_id {
            let open = self
                .store
                .doctor_has_open_slot(doctor_id, request.date, request.time)
                .await?;
            if !open {
                validation
                    .errors
                    .push("El doctor seleccionado no tiene espacio a esa hora".to_string());
                self.suggest_alternative_times(request, Some(doctor_id), validation)
                    .await?;
            }
            return Ok(());
        }

        // No doctor preference: at least one doctor in the organization must
        // have an open slot at that exact time.
        let slots = self
            .store
            .day_slots(request.organization_id, request.date, &Default::default())
            .await?;
        let any_free = slots
            .iter()
            .any(|s| s.available && s.start_time == request.time);

        if !any_free {
            validation
                .errors
                .push("No hay doctores disponibles a esa hora".to_string());
            self.suggest_alternative_times(request, None, validation).await?;
        }

        Ok(())
    }

    async fn suggest_alternative_times(
        &self,
        request: &BookingRequest,
        doctor_id: Option<Uuid>,
        validation: &mut BusinessRuleValidation,
    ) -> Result<(), SchedulingError> {
        let filters = crate::models::AvailabilityFilters {
            doctor_id,
            ..Default::default()
        };
        let slots = self
            .store
            .day_slots(request.organization_id, request.date, &filters)
            .await?;

        let alternatives: Vec<String> = slots
            .iter()
            .filter(|s| s.available && s.start_time != request.time)
            .map(|s| s.start_time.format("%H:%M").to_string())
            .take(3)
            .collect();

        if !alternatives.is_empty() {
            validation.suggestions.push(format!(
                "Horas alternativas el {}: {}",
                request.date,
                alternatives.join(", ")
            ));
        }

        Ok(())
    }

    async fn check_conflicts(
        &self,
        request: &BookingRequest,
        validation: &mut BusinessRuleValidation,
    ) -> Result<(), SchedulingError> {
        let conflicts = self
            .store
            .conflicting_appointments(
                request.organization_id,
                request.date,
                request.time,
                request.doctor_id,
            )
            .await?;

        if let Some(_doctor) = request.doctor_id {
            if !conflicts.is_empty() {
                validation
                    .errors
                    .push("El doctor ya tiene una cita agendada a esa hora".to_string());
            }
            return Ok(());
        }

        // Without a doctor preference the rule only fails when every doctor
        // is simultaneously busy.
        let doctors = self.store.doctors(request.organization_id).await?;
        if doctors.is_empty() {
            return Ok(());
        }

        let busy: HashSet<Uuid> = conflicts.iter().map(|c| c.doctor_id).collect();
        if doctors.iter().all(|d| busy.contains(&d.id)) {
            validation
                .errors
                .push("Todos los doctores están ocupados a esa hora".to_string());
        }

        Ok(())
    }

    async fn check_service(
        &self,
        request: &BookingRequest,
        validation: &mut BusinessRuleValidation,
    ) -> Result<(), SchedulingError> {
        let service = self
            .store
            .find_active_service(request.organization_id, &request.service_name)
            .await?;

        if service.is_none() {
            validation.errors.push(format!(
                "El servicio '{}' no está disponible en esta clínica",
                request.service_name
            ));

            let active = self.store.active_services(request.organization_id).await?;
            if !active.is_empty() {
                let names: Vec<&str> = active.iter().map(|s| s.name.as_str()).collect();
                validation
                    .suggestions
                    .push(format!("Servicios disponibles: {}", names.join(", ")));
            }
        }

        Ok(())
    }
}
