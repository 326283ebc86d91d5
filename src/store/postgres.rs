use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AppointmentStore, AssessmentStore, Credentials, IdentityStore, NewAppointment,
    NotificationStore, ReportStore, StoreError,
};
use crate::models::{
    AnonymousReport, Answers, Appointment, AppointmentListing, AppointmentStatus, Identity,
    NewAssessment, NewNotification, Notification, RecentAppointment, Role, StressAssessment,
};

const UNIQUE_VIOLATION: &str = "23505";

const APPOINTMENT_COLUMNS: &str = "a.id, a.student_id, a.teacher_id, a.scheduled_date, \
     a.scheduled_time, a.duration_minutes, a.reason, a.notes, a.status, a.created_at, a.updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn conflict_or_database(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    role: String,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    class: Option<String>,
}

impl TryFrom<UserRow> for Credentials {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Credentials {
            identity: Identity {
                id: row.id,
                username: row.username,
                role: row.role.parse::<Role>().map_err(StoreError::Corrupt)?,
                full_name: row.full_name,
                email: row.email,
                phone: row.phone,
                class_name: row.class,
            },
            password_hash: row.password_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    student_id: Uuid,
    teacher_id: Uuid,
    scheduled_date: NaiveDate,
    scheduled_time: NaiveTime,
    duration_minutes: i32,
    reason: String,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            student_id: row.student_id,
            counselor_id: row.teacher_id,
            date: row.scheduled_date,
            time: row.scheduled_time,
            duration_minutes: row.duration_minutes,
            reason: row.reason,
            notes: row.notes,
            status: row
                .status
                .parse::<AppointmentStatus>()
                .map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    appointment: AppointmentRow,
    teacher_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RecentRow {
    #[sqlx(flatten)]
    appointment: AppointmentRow,
    student_name: String,
    student_class: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: Uuid,
    user_id: Uuid,
    test_date: DateTime<Utc>,
    scores: Json<Answers>,
    total_score: i32,
    stress_percentage: i32,
    recommendations: Json<Vec<String>>,
}

impl From<AssessmentRow> for StressAssessment {
    fn from(row: AssessmentRow) -> Self {
        StressAssessment {
            id: row.id,
            user_id: row.user_id,
            submitted_at: row.test_date,
            raw_answers: row.scores.0,
            total_score: row.total_score,
            stress_percentage: row.stress_percentage,
            recommendations: row.recommendations.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    notification_type: String,
    related_id: Option<Uuid>,
    related_type: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            message: row.message,
            notification_type: row.notification_type,
            related_id: row.related_id,
            related_type: row.related_type,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    attachment_url: Option<String>,
    status: String,
    priority: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReportRow> for AnonymousReport {
    fn from(row: ReportRow) -> Self {
        AnonymousReport {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            attachment_url: row.attachment_url,
            status: row.status,
            priority: row.priority,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Credentials::try_from(row).map(|c| c.identity))
            .transpose()
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1 LIMIT 1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Credentials::try_from).transpose()
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Identity>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE role = $1 ORDER BY id")
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Credentials::try_from(row).map(|c| c.identity))
            .collect()
    }

    async fn count_by_role(&self, role: Role) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn find_active_in_slot(
        &self,
        counselor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Vec<Appointment>, StoreError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {} FROM appointments a \
             WHERE a.teacher_id = $1 AND a.scheduled_date = $2 AND a.scheduled_time = $3 \
             AND a.status IN ('pending', 'confirmed')",
            APPOINTMENT_COLUMNS
        ))
        .bind(counselor_id)
        .bind(date)
        .bind(time)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn count_active_on(
        &self,
        counselor_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM appointments \
             WHERE teacher_id = $1 AND scheduled_date = $2 AND status IN ('pending', 'confirmed')",
        )
        .bind(counselor_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_pending(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        // appointments_active_slot turns a lost race into a unique violation
        let row = sqlx::query_as::<_, AppointmentRow>(
            "INSERT INTO appointments (id, student_id, teacher_id, scheduled_date, \
             scheduled_time, duration_minutes, reason, notes, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.student_id)
        .bind(new.counselor_id)
        .bind(new.date)
        .bind(new.time)
        .bind(new.duration_minutes)
        .bind(&new.reason)
        .bind(&new.notes)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_database)?;
        Appointment::try_from(row)
    }

    async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {}, t.full_name AS teacher_name FROM appointments a \
             LEFT JOIN users t ON a.teacher_id = t.id \
             WHERE a.student_id = $1 \
             ORDER BY a.scheduled_date DESC, a.scheduled_time DESC",
            APPOINTMENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(AppointmentListing {
                    appointment: Appointment::try_from(row.appointment)?,
                    teacher_name: row.teacher_name,
                })
            })
            .collect()
    }

    async fn recent(&self, limit: i64) -> Result<Vec<RecentAppointment>, StoreError> {
        let rows = sqlx::query_as::<_, RecentRow>(&format!(
            "SELECT {}, s.full_name AS student_name, s.class AS student_class \
             FROM appointments a JOIN users s ON a.student_id = s.id \
             ORDER BY a.created_at DESC LIMIT $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(RecentAppointment {
                    appointment: Appointment::try_from(row.appointment)?,
                    student_name: row.student_name,
                    student_class: row.student_class,
                })
            })
            .collect()
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM appointments WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_completed_in_month(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM appointments WHERE status = 'completed' \
             AND date_trunc('month', created_at) = date_trunc('month', $1::timestamptz)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn insert(&self, new: NewAssessment) -> Result<StressAssessment, StoreError> {
        let row = sqlx::query_as::<_, AssessmentRow>(
            "INSERT INTO stress_tests (id, user_id, test_date, scores, total_score, \
             stress_percentage, recommendations) \
             VALUES ($1, $2, CURRENT_TIMESTAMP, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(Json(&new.raw_answers))
        .bind(new.total_score)
        .bind(new.stress_percentage)
        .bind(Json(&new.recommendations))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StressAssessment>, StoreError> {
        let rows = sqlx::query_as::<_, AssessmentRow>(
            "SELECT * FROM stress_tests WHERE user_id = $1 ORDER BY test_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StressAssessment::from).collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO notifications (id, user_id, title, message, notification_type, \
             related_id, related_type, is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, CURRENT_TIMESTAMP) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.notification_type)
        .bind(new.related_id)
        .bind(new.related_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn list_related(&self, related_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE related_id = $1 ORDER BY created_at",
        )
        .bind(related_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn recent(&self, limit: i64) -> Result<Vec<AnonymousReport>, StoreError> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT id, title, description, category, attachment_url, status, priority, \
             created_at, updated_at FROM anonymous_reports ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AnonymousReport::from).collect())
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM anonymous_reports WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
