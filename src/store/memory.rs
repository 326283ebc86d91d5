use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use super::{
    AppointmentStore, AssessmentStore, Credentials, IdentityStore, NewAppointment,
    NotificationStore, ReportStore, StoreError,
};
use crate::models::{
    AnonymousReport, Appointment, AppointmentListing, AppointmentStatus, Identity, NewAssessment,
    NewNotification, Notification, RecentAppointment, Role, StressAssessment,
};

#[derive(Default)]
struct Tables {
    users: Vec<Credentials>,
    appointments: Vec<Appointment>,
    assessments: Vec<StressAssessment>,
    notifications: Vec<Notification>,
    reports: Vec<AnonymousReport>,
    failing_recipients: HashSet<Uuid>,
}

/// Store kept entirely in process memory behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn add_identity(&self, identity: Identity, password_hash: String) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables
            .users
            .iter()
            .any(|c| c.identity.id == identity.id || c.identity.username == identity.username)
        {
            return Err(StoreError::Conflict(format!(
                "user `{}` already exists",
                identity.username
            )));
        }
        tables.users.push(Credentials {
            identity,
            password_hash,
        });
        Ok(())
    }

    pub fn remove_identity(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables()?.users.retain(|c| c.identity.id != id);
        Ok(())
    }

    pub fn add_report(&self, report: AnonymousReport) -> Result<(), StoreError> {
        self.tables()?.reports.push(report);
        Ok(())
    }

    /// Applies a status change the way the counselor inbox would.
    pub fn set_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let appointment = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::Corrupt(format!("no appointment {}", id)))?;
        if !appointment.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "cannot move appointment from {} to {}",
                appointment.status.as_str(),
                status.as_str()
            )));
        }
        appointment.status = status;
        appointment.updated_at = Utc::now();
        Ok(())
    }

    /// Makes every later notification insert for `user_id` fail.
    pub fn fail_notifications_for(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.tables()?.failing_recipients.insert(user_id);
        Ok(())
    }

    pub fn appointment_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.appointments.len())
    }

    pub fn assessment_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.assessments.len())
    }

    fn find_identity(tables: &Tables, id: Uuid) -> Option<&Identity> {
        tables
            .users
            .iter()
            .map(|c| &c.identity)
            .find(|identity| identity.id == id)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(Self::find_identity(&*self.tables()?, id).cloned())
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|c| c.identity.username == username)
            .cloned())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Identity>, StoreError> {
        let mut found: Vec<Identity> = self
            .tables()?
            .users
            .iter()
            .filter(|c| c.identity.role == role)
            .map(|c| c.identity.clone())
            .collect();
        found.sort_by_key(|identity| identity.id);
        Ok(found)
    }

    async fn count_by_role(&self, role: Role) -> Result<i64, StoreError> {
        Ok(self
            .tables()?
            .users
            .iter()
            .filter(|c| c.identity.role == role)
            .count() as i64)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn find_active_in_slot(
        &self,
        counselor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .filter(|a| {
                a.counselor_id == counselor_id
                    && a.date == date
                    && a.time == time
                    && a.status.is_active()
            })
            .cloned()
            .collect())
    }

    async fn count_active_on(
        &self,
        counselor_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .filter(|a| a.counselor_id == counselor_id && a.date == date && a.status.is_active())
            .count() as i64)
    }

    async fn insert_pending(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables()?;
        let taken = tables.appointments.iter().any(|a| {
            a.counselor_id == new.counselor_id
                && a.date == new.date
                && a.time == new.time
                && a.status.is_active()
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "slot {} {} already held for counselor {}",
                new.date, new.time, new.counselor_id
            )));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            counselor_id: new.counselor_id,
            date: new.date,
            time: new.time,
            duration_minutes: new.duration_minutes,
            reason: new.reason,
            notes: new.notes,
            status: AppointmentStatus::Pending,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        tables.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        let tables = self.tables()?;
        let mut listed: Vec<AppointmentListing> = tables
            .appointments
            .iter()
            .filter(|a| a.student_id == student_id)
            .map(|a| AppointmentListing {
                appointment: a.clone(),
                teacher_name: Self::find_identity(&tables, a.counselor_id)
                    .map(|t| t.full_name.clone()),
            })
            .collect();
        listed.sort_by(|x, y| {
            (y.appointment.date, y.appointment.time).cmp(&(x.appointment.date, x.appointment.time))
        });
        Ok(listed)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<RecentAppointment>, StoreError> {
        let tables = self.tables()?;
        let mut recent: Vec<RecentAppointment> = tables
            .appointments
            .iter()
            .filter_map(|a| {
                Self::find_identity(&tables, a.student_id).map(|student| RecentAppointment {
                    appointment: a.clone(),
                    student_name: student.full_name.clone(),
                    student_class: student.class_name.clone(),
                })
            })
            .collect();
        recent.sort_by(|x, y| y.appointment.created_at.cmp(&x.appointment.created_at));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Pending)
            .count() as i64)
    }

    async fn count_completed_in_month(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .filter(|a| {
                a.status == AppointmentStatus::Completed
                    && a.created_at.year() == now.year()
                    && a.created_at.month() == now.month()
            })
            .count() as i64)
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert(&self, new: NewAssessment) -> Result<StressAssessment, StoreError> {
        let assessment = StressAssessment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            submitted_at: Utc::now(),
            raw_answers: new.raw_answers,
            total_score: new.total_score,
            stress_percentage: new.stress_percentage,
            recommendations: new.recommendations,
        };
        self.tables()?.assessments.push(assessment.clone());
        Ok(assessment)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StressAssessment>, StoreError> {
        Ok(self
            .tables()?
            .assessments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let mut tables = self.tables()?;
        if tables.failing_recipients.contains(&new.user_id) {
            return Err(StoreError::Unavailable(format!(
                "notification insert refused for {}",
                new.user_id
            )));
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            message: new.message,
            notification_type: new.notification_type.to_string(),
            related_id: new.related_id,
            related_type: new.related_type.map(str::to_string),
            is_read: false,
            created_at: Utc::now(),
        };
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let mut found: Vec<Notification> = self
            .tables()?
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.reverse();
        Ok(found)
    }

    async fn list_related(&self, related_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .tables()?
            .notifications
            .iter()
            .filter(|n| n.related_id == Some(related_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn recent(&self, limit: i64) -> Result<Vec<AnonymousReport>, StoreError> {
        let mut reports = self.tables()?.reports.clone();
        reports.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        reports.truncate(limit.max(0) as usize);
        Ok(reports)
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        Ok(self
            .tables()?
            .reports
            .iter()
            .filter(|r| r.status == "pending")
            .count() as i64)
    }
}
