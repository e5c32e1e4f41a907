// Business rules engine against an in-memory store.
mod common;

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use scheduling_cell::models::{BookingRequest, SchedulingRules};
use scheduling_cell::services::rules::BusinessRulesEngine;
use shared_models::CallerRole;

use common::{date, time, FakeStore};

fn engine(store: Arc<FakeStore>) -> BusinessRulesEngine {
    BusinessRulesEngine::with_store(store, SchedulingRules::default())
}

fn request(store: &FakeStore, day: &str, h: u32, m: u32, role: CallerRole) -> BookingRequest {
    BookingRequest {
        organization_id: store.org,
        service_name: "Examen Visual Completo".to_string(),
        date: date(day),
        time: time(h, m),
        doctor_id: None,
        caller_role: role,
        use_standard_rules: false,
    }
}

/// A patient one hour before the requested slot: rejected, and the
/// suggestion names the next open day at opening time.
#[tokio::test]
async fn patient_same_day_booking_is_rejected_with_suggestion() {
    let store = Arc::new(FakeStore::new());
    // Monday 2025-03-10, clinic local 10:00 at UTC-6 = 16:00 UTC.
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-10"), time(11, 0), true);

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-10", 11, 0, CallerRole::Patient), now)
        .await
        .unwrap();

    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("24 horas de anticipación")));
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("martes 2025-03-11 a las 08:00")));
}

/// The same slot requested by an admin passes every check.
#[tokio::test]
async fn admin_same_day_booking_is_accepted() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-10"), time(11, 0), true);

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-10", 11, 0, CallerRole::Admin), now)
        .await
        .unwrap();

    assert!(result.valid, "errors: {:?}", result.errors);
}

/// An admin opting back into standard rules is rejected like a patient.
#[tokio::test]
async fn admin_with_standard_rules_loses_exemption() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-10"), time(11, 0), true);

    let engine = engine(Arc::clone(&store));
    let mut req = request(&store, "2025-03-10", 11, 0, CallerRole::Admin);
    req.use_standard_rules = true;
    let result = engine.validate_booking(&req, now).await.unwrap();

    assert!(!result.valid);
}

/// Monotonicity of the advance-notice rule: once a slot is far enough out
/// to be accepted, every later slot that day is accepted too.
#[tokio::test]
async fn advance_notice_is_monotonic_over_the_day() {
    let store = Arc::new(FakeStore::new());
    // Tuesday 10:00 local.
    let now = Utc.with_ymd_and_hms(2025, 3, 11, 16, 0, 0).unwrap();
    let target = date("2025-03-12");
    for hour in 8..20 {
        store.add_slot(target, time(hour, 0), true);
    }

    let engine = engine(Arc::clone(&store));
    let mut accepted_from = None;
    for hour in 8..20 {
        let result = engine
            .validate_booking(&request(&store, "2025-03-12", hour, 0, CallerRole::Patient), now)
            .await
            .unwrap();
        let notice_ok = !result
            .errors
            .iter()
            .any(|e| e.contains("anticipación"));
        if notice_ok {
            accepted_from.get_or_insert(hour);
        } else {
            assert!(
                accepted_from.is_none(),
                "rejection at {}:00 after acceptance at {}:00",
                hour,
                accepted_from.unwrap()
            );
        }
    }
    // 10:00 local now → acceptance starts at 10:00 the next day.
    assert_eq!(accepted_from, Some(10));
}

#[tokio::test]
async fn closed_day_is_rejected_with_next_open_day() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    // Sunday 2025-03-16.
    store.add_slot(date("2025-03-16"), time(10, 0), true);

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-16", 10, 0, CallerRole::Patient), now)
        .await
        .unwrap();

    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("no atiende el domingo")));
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("lunes 2025-03-17")));
}

#[tokio::test]
async fn out_of_hours_time_is_rejected() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-12"), time(21, 0), true);

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-12", 21, 0, CallerRole::Patient), now)
        .await
        .unwrap();

    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("fuera del horario")));
    // Closing time is exclusive.
    let at_close = engine
        .validate_booking(&request(&store, "2025-03-12", 20, 0, CallerRole::Patient), now)
        .await
        .unwrap();
    assert!(at_close
        .errors
        .iter()
        .any(|e| e.contains("fuera del horario")));
}

#[tokio::test]
async fn unknown_service_lists_available_ones() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-12"), time(10, 0), true);

    let engine = engine(Arc::clone(&store));
    let mut req = request(&store, "2025-03-12", 10, 0, CallerRole::Patient);
    req.service_name = "Resonancia Magnética".to_string();
    let result = engine.validate_booking(&req, now).await.unwrap();

    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Resonancia Magnética")));
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("Examen Visual Completo")));
}

/// With every doctor busy at the requested time the conflict rule fires
/// even without a doctor preference.
#[tokio::test]
async fn all_doctors_busy_is_a_conflict() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-12"), time(10, 0), true);
    store.add_conflict(date("2025-03-12"), time(10, 0));

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-12", 10, 0, CallerRole::Patient), now)
        .await
        .unwrap();

    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("ocupados")));
}

/// No open slot at the exact time: rejected with alternative times taken
/// from the same day.
#[tokio::test]
async fn missing_slot_suggests_alternatives() {
    let store = Arc::new(FakeStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
    store.add_slot(date("2025-03-12"), time(9, 0), true);
    store.add_slot(date("2025-03-12"), time(12, 0), true);

    let engine = engine(Arc::clone(&store));
    let result = engine
        .validate_booking(&request(&store, "2025-03-12", 10, 0, CallerRole::Patient), now)
        .await
        .unwrap();

    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("No hay doctores disponibles")));
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("09:00") && s.contains("12:00")));
}
