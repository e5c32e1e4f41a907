// libs/scheduling-cell/src/store.rs
use async_trait::async_trait;
use chrono::NaiveTime;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StorageClient;

use crate::dates::CalendarDate;
use crate::models::{
    AppointmentRecord, AvailabilityFilters, BusinessHoursEntry, DoctorRecord, NewAppointment,
    PatientRecord, SchedulingError, ServiceRecord, SlotInfo,
};

/// Storage and availability-fetch collaborator contract. The relational
/// store behind it owns conflict detection at the persistence layer (unique
/// constraint) as the backstop for the rules engine's check-then-act.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn business_hours(&self, org: Uuid) -> Result<Vec<BusinessHoursEntry>, SchedulingError>;

    async fn find_active_service(
        &self,
        org: Uuid,
        name: &str,
    ) -> Result<Option<ServiceRecord>, SchedulingError>;

    async fn active_services(&self, org: Uuid) -> Result<Vec<ServiceRecord>, SchedulingError>;

    async fn doctors(&self, org: Uuid) -> Result<Vec<DoctorRecord>, SchedulingError>;

    async fn doctor_has_open_slot(
        &self,
        doctor_id: Uuid,
        date: CalendarDate,
        time: NaiveTime,
    ) -> Result<bool, SchedulingError>;

    async fn conflicting_appointments(
        &self,
        org: Uuid,
        date: CalendarDate,
        time: NaiveTime,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentRecord>, SchedulingError>;

    /// Slot descriptors for one organization/date, optionally filtered by
    /// service, doctor and location.
    async fn day_slots(
        &self,
        org: Uuid,
        date: CalendarDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<SlotInfo>, SchedulingError>;

    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<AppointmentRecord, SchedulingError>;

    async fn find_or_create_patient(
        &self,
        org: Uuid,
        contact: &str,
    ) -> Result<PatientRecord, SchedulingError>;
}

/// PostgREST-backed implementation over the shared [`StorageClient`].
pub struct RestSchedulingStore {
    storage: Arc<StorageClient>,
}

impl RestSchedulingStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            storage: Arc::new(StorageClient::new(config)),
        }
    }

    pub fn with_client(storage: Arc<StorageClient>) -> Self {
        Self { storage }
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, SchedulingError> {
        let rows: Vec<Value> = self
            .storage
            .request(Method::GET, path, None)
            .await
            .map_err(|e| SchedulingError::StorageError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| SchedulingError::StorageError(format!("Failed to parse rows: {}", e)))
    }
}

#[async_trait]
impl SchedulingStore for RestSchedulingStore {
    async fn business_hours(&self, org: Uuid) -> Result<Vec<BusinessHoursEntry>, SchedulingError> {
        let path = format!(
            "/rest/v1/business_hours?organization_id=eq.{}&order=day_of_week.asc",
            org
        );
        self.get_rows(&path).await
    }

    async fn find_active_service(
        &self,
        org: Uuid,
        name: &str,
    ) -> Result<Option<ServiceRecord>, SchedulingError> {
        let path = format!(
            "/rest/v1/services?organization_id=eq.{}&active=eq.true&name=ilike.{}",
            org,
            urlencoding::encode(name)
        );
        let services: Vec<ServiceRecord> = self.get_rows(&path).await?;
        Ok(services.into_iter().next())
    }

    async fn active_services(&self, org: Uuid) -> Result<Vec<ServiceRecord>, SchedulingError> {
        let path = format!(
            "/rest/v1/services?organization_id=eq.{}&active=eq.true&order=name.asc",
            org
        );
        self.get_rows(&path).await
    }

    async fn doctors(&self, org: Uuid) -> Result<Vec<DoctorRecord>, SchedulingError> {
        let path = format!(
            "/rest/v1/doctors?organization_id=eq.{}&active=eq.true&order=full_name.asc",
            org
        );
        self.get_rows(&path).await
    }

    async fn doctor_has_open_slot(
        &self,
        doctor_id: Uuid,
        date: CalendarDate,
        time: NaiveTime,
    ) -> Result<bool, SchedulingError> {
        let path = format!(
            "/rest/v1/doctor_schedule_slots?doctor_id=eq.{}&date=eq.{}&start_time=eq.{}&available=eq.true",
            doctor_id,
            date,
            time.format("%H:%M:%S")
        );
        let slots: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::StorageError(e.to_string()))?;
        Ok(!slots.is_empty())
    }

    async fn conflicting_appointments(
        &self,
        org: Uuid,
        date: CalendarDate,
        time: NaiveTime,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentRecord>, SchedulingError> {
        let mut query_parts = vec![
            format!("organization_id=eq.{}", org),
            format!("date=eq.{}", date),
            format!("time=eq.{}", time.format("%H:%M:%S")),
            "status=in.(confirmed,in_progress,pending_payment)".to_string(),
        ];

        if let Some(doctor) = doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor));
        }

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        self.get_rows(&path).await
    }

    async fn day_slots(
        &self,
        org: Uuid,
        date: CalendarDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<SlotInfo>, SchedulingError> {
        let mut query_parts = vec![
            format!("organization_id=eq.{}", org),
            format!("date=eq.{}", date),
        ];

        if let Some(service_id) = filters.service_id {
            query_parts.push(format!("service_id=eq.{}", service_id));
        }
        if let Some(doctor_id) = filters.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(location_id) = filters.location_id {
            query_parts.push(format!("location_id=eq.{}", location_id));
        }

        let path = format!(
            "/rest/v1/doctor_schedule_slots?{}&order=start_time.asc",
            query_parts.join("&")
        );
        self.get_rows(&path).await
    }

    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<AppointmentRecord, SchedulingError> {
        debug!(
            "Inserting appointment for patient {} on {} at {}",
            appointment.patient_id, appointment.date, appointment.time
        );

        let body = json!({
            "organization_id": appointment.organization_id,
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "service_id": appointment.service_id,
            "date": appointment.date.to_string(),
            "time": appointment.time.format("%H:%M:%S").to_string(),
            "status": appointment.status.to_string(),
            "notes": appointment.notes,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .storage
            .request_with_headers(Method::POST, "/rest/v1/appointments", Some(body), Some(headers))
            .await
            .map_err(|e| SchedulingError::PersistenceFailed(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| SchedulingError::PersistenceFailed("empty insert response".into()))?;

        serde_json::from_value(row).map_err(|e| {
            SchedulingError::PersistenceFailed(format!("Failed to parse created appointment: {}", e))
        })
    }

    async fn find_or_create_patient(
        &self,
        org: Uuid,
        contact: &str,
    ) -> Result<PatientRecord, SchedulingError> {
        let path = format!(
            "/rest/v1/patients?organization_id=eq.{}&contact=eq.{}",
            org,
            urlencoding::encode(contact)
        );
        let existing: Vec<PatientRecord> = self.get_rows(&path).await?;

        if let Some(patient) = existing.into_iter().next() {
            return Ok(patient);
        }

        debug!("Creating patient record for contact {}", contact);

        let body = json!({
            "organization_id": org,
            "contact": contact,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .storage
            .request_with_headers(Method::POST, "/rest/v1/patients", Some(body), Some(headers))
            .await
            .map_err(|e| SchedulingError::StorageError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| SchedulingError::StorageError("empty patient insert response".into()))?;

        serde_json::from_value(row)
            .map_err(|e| SchedulingError::StorageError(format!("Failed to parse patient: {}", e)))
    }
}
