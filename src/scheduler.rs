//! Consultation booking on the counselors' shared calendar.
//!
//! A slot is `(counselor, date, time)`. At most one pending or confirmed
//! appointment may hold a slot; the store enforces this on insert, the
//! pre-check here only produces the friendlier error in the common case.

use std::sync::Arc;

use axum::extract::{Query, rejection::JsonRejection};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::require_role;
use crate::models::{Appointment, AppointmentListing, AppointmentStatus, Identity, RecentAppointment, Role};
use crate::store::{AppointmentStore, IdentityStore, NewAppointment, StoreError};
use crate::{breaks, proceeds, AppState, Error, Payload};

pub const SESSION_MINUTES: i32 = 60;
pub const RECENT_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("invalid booking: {0}")]
    InvalidInput(String),

    #[error("student does not exist")]
    NotFound,

    #[error("only students may book consultations")]
    Forbidden,

    #[error("no counselor is available")]
    NoCounselorAvailable,

    #[error("slot is already taken")]
    SlotUnavailable,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SchedulingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => SchedulingError::SlotUnavailable,
            other => SchedulingError::Store(other),
        }
    }
}

/// Booking fields as the client sent them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Counselor the student asked for; when absent one is assigned.
    pub counselor_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Booking {
    date: NaiveDate,
    time: NaiveTime,
    reason: String,
    notes: Option<String>,
    counselor_id: Option<Uuid>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

impl Booking {
    fn parse(request: BookingRequest) -> Result<Booking, SchedulingError> {
        let missing =
            || SchedulingError::InvalidInput("Tanggal, waktu, dan alasan harus diisi".to_string());
        let date = non_empty(request.date).ok_or_else(missing)?;
        let time = non_empty(request.time).ok_or_else(missing)?;
        let reason = non_empty(request.reason).ok_or_else(missing)?;

        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            SchedulingError::InvalidInput(format!("Tanggal `{}` tidak valid", date))
        })?;
        let time = parse_time(&time).ok_or_else(|| {
            SchedulingError::InvalidInput(format!("Waktu `{}` tidak valid", time))
        })?;

        Ok(Booking {
            date,
            time,
            reason,
            notes: non_empty(request.notes),
            counselor_id: request.counselor_id,
        })
    }
}

#[derive(Clone)]
pub struct Scheduler {
    identities: Arc<dyn IdentityStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl Scheduler {
    pub fn new(identities: Arc<dyn IdentityStore>, appointments: Arc<dyn AppointmentStore>) -> Self {
        Self {
            identities,
            appointments,
        }
    }

    pub async fn create(
        &self,
        student_id: Uuid,
        request: BookingRequest,
    ) -> Result<Appointment, SchedulingError> {
        let booking = Booking::parse(request)?;

        let student = self
            .identities
            .find_by_id(student_id)
            .await?
            .ok_or(SchedulingError::NotFound)?;
        if student.role != Role::Student {
            return Err(SchedulingError::Forbidden);
        }

        let counselor = self
            .pick_counselor(booking.counselor_id, booking.date)
            .await?;

        let taken = self
            .appointments
            .find_active_in_slot(counselor.id, booking.date, booking.time)
            .await?;
        if !taken.is_empty() {
            return Err(SchedulingError::SlotUnavailable);
        }

        let now = Utc::now();
        let appointment = self
            .appointments
            .insert_pending(NewAppointment {
                student_id: student.id,
                counselor_id: counselor.id,
                date: booking.date,
                time: booking.time,
                duration_minutes: SESSION_MINUTES,
                reason: booking.reason,
                notes: booking.notes,
                created_at: now,
            })
            .await?;
        debug_assert_eq!(appointment.status, AppointmentStatus::Pending);
        Ok(appointment)
    }

    /// The requested counselor if it is one; otherwise the counselor with the
    /// fewest active bookings that day, lowest id first on a tie.
    pub async fn pick_counselor(
        &self,
        requested: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<Identity, SchedulingError> {
        if let Some(id) = requested {
            return match self.identities.find_by_id(id).await? {
                Some(identity) if identity.role == Role::Teacher => Ok(identity),
                _ => Err(SchedulingError::NoCounselorAvailable),
            };
        }

        let mut best: Option<(i64, Identity)> = None;
        for counselor in self.identities.list_by_role(Role::Teacher).await? {
            let load = self.appointments.count_active_on(counselor.id, date).await?;
            let better = match &best {
                None => true,
                Some((best_load, current)) => (load, counselor.id) < (*best_load, current.id),
            };
            if better {
                best = Some((load, counselor));
            }
        }
        best.map(|(_, counselor)| counselor)
            .ok_or(SchedulingError::NoCounselorAvailable)
    }

    pub async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, SchedulingError> {
        Ok(self.appointments.list_for_student(student_id).await?)
    }
}

pub async fn create_appointment(
    payload: Result<Json<CreateAppointment>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<AppointmentCreated> {
    let Json(body) = payload?;
    let student = state.sessions.authenticate(body.token.as_deref(), None).await?;

    let appointment = match state.scheduler().create(student.id, body.booking).await {
        Ok(appointment) => appointment,
        Err(SchedulingError::SlotUnavailable) => {
            log::warn!("Slot conflict for student `{}`", student.username);
            return breaks(SchedulingError::SlotUnavailable.into());
        }
        Err(err) => return breaks(err.into()),
    };
    log::info!(
        "Appointment {} booked by `{}` for {} {}",
        appointment.id,
        student.username,
        appointment.date,
        appointment.time
    );
    proceeds(AppointmentCreated {
        message: "Jadwal konsultasi berhasil dibuat",
        appointment: CreatedRef {
            id: appointment.id,
            status: appointment.status,
        },
    })
}

pub async fn list_appointments(
    Query(query): Query<ListQuery>,
    Extension(state): Extension<AppState>,
) -> Payload<AppointmentList> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::invalid("User ID diperlukan"))?;
    let user_id = Uuid::parse_str(user_id.trim())
        .map_err(|_| Error::invalid(format!("User ID `{}` tidak valid", user_id)))?;

    let appointments = state.scheduler().list_for_student(user_id).await?;
    proceeds(AppointmentList { appointments })
}

pub async fn recent_appointments(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<RecentAppointments> {
    let identity = state.sessions.authenticate(None, bearer.as_ref()).await?;
    require_role(identity, Role::Teacher)?;

    let appointments = state.appointments.recent(RECENT_LIMIT).await?;
    proceeds(RecentAppointments { appointments })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointment {
    pub token: Option<String>,
    #[serde(flatten)]
    pub booking: BookingRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRef {
    pub id: Uuid,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentCreated {
    pub message: &'static str,
    pub appointment: CreatedRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentList {
    pub appointments: Vec<AppointmentListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentAppointments {
    pub appointments: Vec<RecentAppointment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(date: &str, time: &str, reason: &str) -> BookingRequest {
        BookingRequest {
            date: Some(date.to_string()),
            time: Some(time.to_string()),
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_short_and_long_times() {
        let short = Booking::parse(request("2024-05-01", "14:00", "ujian")).unwrap();
        let long = Booking::parse(request("2024-05-01", "14:00:00", "ujian")).unwrap();
        assert_eq!(short.time, long.time);
        assert_eq!(short.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn blank_fields_are_invalid() {
        for (date, time, reason) in [("", "14:00", "x"), ("2024-05-01", " ", "x"), ("2024-05-01", "14:00", "")] {
            assert!(matches!(
                Booking::parse(request(date, time, reason)),
                Err(SchedulingError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            Booking::parse(BookingRequest::default()),
            Err(SchedulingError::InvalidInput(_))
        ));
    }

    #[test]
    fn unparseable_date_or_time_is_invalid() {
        assert!(Booking::parse(request("01/05/2024", "14:00", "x")).is_err());
        assert!(Booking::parse(request("2024-05-01", "2pm", "x")).is_err());
    }

    #[test]
    fn empty_notes_become_none() {
        let mut req = request("2024-05-01", "14:00", "x");
        req.notes = Some("   ".to_string());
        assert_eq!(Booking::parse(req).unwrap().notes, None);
    }
}
