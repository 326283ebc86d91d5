//! Persistence seams. Every domain component talks to these traits, never to a pool.
//!
//! [`PgStore`] is the production backend; [`MemoryStore`] backs the tests and
//! local runs without a database. Both enforce the active-slot uniqueness of
//! appointments themselves, so the scheduler never relies on its own pre-check.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AnonymousReport, Appointment, AppointmentListing, Identity, NewAssessment, NewNotification,
    Notification, RecentAppointment, Role, StressAssessment, TeacherStats,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflicting row: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Identity record together with the stored password hash. Only login sees this.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: Identity,
    pub password_hash: String,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError>;
    /// Every identity holding `role`, ordered by id.
    async fn list_by_role(&self, role: Role) -> Result<Vec<Identity>, StoreError>;
    async fn count_by_role(&self, role: Role) -> Result<i64, StoreError>;
}

/// Fields of a fresh booking; the store assigns id and keeps the given timestamps.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub student_id: Uuid,
    pub counselor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Pending or confirmed appointments occupying the given slot.
    async fn find_active_in_slot(
        &self,
        counselor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn count_active_on(&self, counselor_id: Uuid, date: NaiveDate)
        -> Result<i64, StoreError>;

    /// Inserts as `pending`. Fails with [`StoreError::Conflict`] if the slot is
    /// already held by an active appointment, atomically with the insert.
    async fn insert_pending(&self, new: NewAppointment) -> Result<Appointment, StoreError>;

    async fn list_for_student(&self, student_id: Uuid)
        -> Result<Vec<AppointmentListing>, StoreError>;

    async fn recent(&self, limit: i64) -> Result<Vec<RecentAppointment>, StoreError>;

    async fn count_pending(&self) -> Result<i64, StoreError>;

    /// Completed appointments created in the calendar month containing `now`.
    async fn count_completed_in_month(&self, now: DateTime<Utc>) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert(&self, new: NewAssessment) -> Result<StressAssessment, StoreError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StressAssessment>, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;
    async fn list_related(&self, related_id: Uuid) -> Result<Vec<Notification>, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn recent(&self, limit: i64) -> Result<Vec<AnonymousReport>, StoreError>;
    async fn count_pending(&self) -> Result<i64, StoreError>;
}

/// Counters for the counselor dashboard, gathered from three stores.
pub async fn teacher_stats(
    identities: &dyn IdentityStore,
    appointments: &dyn AppointmentStore,
    reports: &dyn ReportStore,
    now: DateTime<Utc>,
) -> Result<TeacherStats, StoreError> {
    Ok(TeacherStats {
        total_students: identities.count_by_role(Role::Student).await?,
        pending_appointments: appointments.count_pending().await?,
        completed_sessions: appointments.count_completed_in_month(now).await?,
        anonymous_reports: reports.count_pending().await?,
    })
}
