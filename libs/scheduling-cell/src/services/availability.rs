// libs/scheduling-cell/src/services/availability.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{CallerRole, RolePolicy};

use crate::dates::CalendarDate;
use crate::models::{
    AvailabilityDay, AvailabilityFilters, AvailabilityLevel, SchedulingError, SchedulingRules,
    WeekDirection,
};
use crate::store::{RestSchedulingStore, SchedulingStore};

/// Aggregates per-day slot data into a 7-day calendar view with role-aware
/// blocking. Results are computed fresh per request; blocking depends on the
/// injected "now", so caching would be a correctness bug.
pub struct WeeklyAvailabilityService {
    store: Arc<dyn SchedulingStore>,
    rules: SchedulingRules,
    policy: RolePolicy,
}

impl WeeklyAvailabilityService {
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

    /// Seven days starting at the Sunday of the week containing
    /// `week_start`. Index 0 is always the week start, in calendar order.
    pub async fn week(
        &self,
        organization_id: Uuid,
        week_start: CalendarDate,
        filters: &AvailabilityFilters,
        caller_role: CallerRole,
        use_standard_rules: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityDay>, SchedulingError> {
        let week_start = week_start.start_of_week();
        let today = CalendarDate::today(now, self.rules.clinic_utc_offset_minutes);

        debug!(
            "Aggregating week {} for org {} (role {})",
            week_start, organization_id, caller_role
        );

        let mut days = Vec::with_capacity(7);
        for offset in 0..7 {
            let date = week_start.add_days(offset);
            let slots = self.store.day_slots(organization_id, date, filters).await?;
            let open_slots = slots.iter().filter(|s| s.available).count();
            days.push(classify_day(
                date,
                open_slots,
                today,
                caller_role,
                use_standard_rules,
                &self.policy,
            ));
        }

        Ok(days)
    }
}

/// Pure classification of one day. Blocking is applied in order: past date,
/// role-based advance notice, zero open slots.
pub fn classify_day(
    date: CalendarDate,
    open_slots: usize,
    today: CalendarDate,
    caller_role: CallerRole,
    use_standard_rules: bool,
    policy: &RolePolicy,
) -> AvailabilityDay {
    let (is_blocked, block_reason, effective_slots) = if date < today {
        (true, Some("fecha pasada".to_string()), 0)
    } else if date == today && !policy.allows_same_day_booking(caller_role, use_standard_rules) {
        (
            true,
            Some("requiere 24 horas de anticipación".to_string()),
            0,
        )
    } else if open_slots == 0 {
        (true, Some("sin espacios disponibles".to_string()), 0)
    } else {
        (false, None, open_slots)
    };

    AvailabilityDay {
        date,
        day_name: date.day_name().to_string(),
        open_slots: effective_slots,
        level: AvailabilityLevel::from_count(effective_slots),
        is_blocked,
        block_reason,
    }
}

/// Week navigation is a pure function over the week start. Two guards: never
/// before the caller-supplied minimum date, and never to a week whose final
/// day is entirely in the past.
pub fn navigate_week(
    week_start: CalendarDate,
    direction: WeekDirection,
    min_date: CalendarDate,
    today: CalendarDate,
) -> CalendarDate {
    let candidate = match direction {
        WeekDirection::Previous => week_start.add_days(-7),
        WeekDirection::Next => week_start.add_days(7),
    };

    if candidate < min_date {
        return week_start;
    }
    if candidate.add_days(6) < today {
        return week_start;
    }

    candidate
}
