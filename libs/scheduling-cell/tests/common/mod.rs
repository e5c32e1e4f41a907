// Shared in-memory fixtures for scheduling-cell integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use scheduling_cell::dates::CalendarDate;
use scheduling_cell::models::{
    AppointmentRecord, AppointmentStatus, AvailabilityFilters, BusinessHoursEntry, DoctorRecord,
    NewAppointment, PatientRecord, SchedulingError, ServiceRecord, SlotInfo,
};
use scheduling_cell::store::SchedulingStore;

pub fn date(s: &str) -> CalendarDate {
    CalendarDate::parse(s).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// In-memory store: fixed business hours (closed Sundays), one service,
/// one doctor, slots set per test.
pub struct FakeStore {
    pub org: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub slots: Mutex<HashMap<CalendarDate, Vec<SlotInfo>>>,
    pub conflicts: Mutex<Vec<AppointmentRecord>>,
    pub inserted: Mutex<Vec<NewAppointment>>,
    pub created_patients: Mutex<Vec<String>>,
    pub fail_inserts: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            org: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            slots: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            created_patients: Mutex::new(Vec::new()),
            fail_inserts: false,
        }
    }

    pub fn add_slot(&self, day: CalendarDate, at: NaiveTime, available: bool) {
        let slot = SlotInfo {
            start_time: at,
            doctor_id: self.doctor_id,
            doctor_name: "Dra. Marcela Ruiz".to_string(),
            available,
            price: Some(850.0),
        };
        self.slots.lock().unwrap().entry(day).or_default().push(slot);
    }

    pub fn add_conflict(&self, day: CalendarDate, at: NaiveTime) {
        self.conflicts.lock().unwrap().push(AppointmentRecord {
            id: Uuid::new_v4(),
            organization_id: self.org,
            patient_id: Uuid::new_v4(),
            doctor_id: self.doctor_id,
            service_id: self.service_id,
            date: day,
            time: at,
            status: AppointmentStatus::Confirmed,
        });
    }
}

#[async_trait]
impl SchedulingStore for FakeStore {
    async fn business_hours(&self, _org: Uuid) -> Result<Vec<BusinessHoursEntry>, SchedulingError> {
        // Monday..Saturday 08:00-20:00, Sunday closed.
        Ok((0..7)
            .map(|dow| BusinessHoursEntry {
                day_of_week: dow,
                opens_at: time(8, 0),
                closes_at: time(20, 0),
                active: dow != 0,
            })
            .collect())
    }

    async fn find_active_service(
        &self,
        org: Uuid,
        name: &str,
    ) -> Result<Option<ServiceRecord>, SchedulingError> {
        let known = "Examen Visual Completo";
        if name.eq_ignore_ascii_case(known) {
            Ok(Some(ServiceRecord {
                id: self.service_id,
                organization_id: org,
                name: known.to_string(),
                active: true,
            }))
        } else {
            Ok(None)
        }
    }

    async fn active_services(&self, org: Uuid) -> Result<Vec<ServiceRecord>, SchedulingError> {
        Ok(vec![ServiceRecord {
            id: self.service_id,
            organization_id: org,
            name: "Examen Visual Completo".to_string(),
            active: true,
        }])
    }

    async fn doctors(&self, org: Uuid) -> Result<Vec<DoctorRecord>, SchedulingError> {
        Ok(vec![DoctorRecord {
            id: self.doctor_id,
            organization_id: org,
            full_name: "Dra. Marcela Ruiz".to_string(),
            active: true,
        }])
    }

    async fn doctor_has_open_slot(
        &self,
        doctor_id: Uuid,
        date: CalendarDate,
        at: NaiveTime,
    ) -> Result<bool, SchedulingError> {
        let slots = self.slots.lock().unwrap();
        Ok(slots.get(&date).is_some_and(|day| {
            day.iter()
                .any(|s| s.doctor_id == doctor_id && s.start_time == at && s.available)
        }))
    }

    async fn conflicting_appointments(
        &self,
        _org: Uuid,
        date: CalendarDate,
        at: NaiveTime,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentRecord>, SchedulingError> {
        let conflicts = self.conflicts.lock().unwrap();
        Ok(conflicts
            .iter()
            .filter(|c| c.date == date && c.time == at)
            .filter(|c| doctor_id.map_or(true, |d| c.doctor_id == d))
            .cloned()
            .collect())
    }

    async fn day_slots(
        &self,
        _org: Uuid,
        date: CalendarDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<SlotInfo>, SchedulingError> {
        let slots = self.slots.lock().unwrap();
        Ok(slots
            .get(&date)
            .map(|day| {
                day.iter()
                    .filter(|s| filters.doctor_id.map_or(true, |d| s.doctor_id == d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<AppointmentRecord, SchedulingError> {
        if self.fail_inserts {
            return Err(SchedulingError::PersistenceFailed(
                "unique constraint violation".to_string(),
            ));
        }
        self.inserted.lock().unwrap().push(appointment.clone());
        Ok(AppointmentRecord {
            id: Uuid::new_v4(),
            organization_id: appointment.organization_id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            service_id: appointment.service_id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status.clone(),
        })
    }

    async fn find_or_create_patient(
        &self,
        org: Uuid,
        contact: &str,
    ) -> Result<PatientRecord, SchedulingError> {
        self.created_patients.lock().unwrap().push(contact.to_string());
        Ok(PatientRecord {
            id: Uuid::new_v4(),
            organization_id: org,
            contact: contact.to_string(),
            full_name: None,
        })
    }
}
