use std::sync::Arc;

use uuid::Uuid;

use crate::models::{NewNotification, Role};
use crate::store::{IdentityStore, NotificationStore, StoreError};

pub const STUDENT_ALERT: &str = "stress_alert";
pub const TEACHER_ALERT: &str = "teacher_alert";
pub const RELATED_STRESS_TEST: &str = "stress_test";

/// Outcome of one fan-out. Failed recipients are logged, never retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

impl FanoutReport {
    pub fn created(&self) -> usize {
        self.delivered.len()
    }
}

#[derive(Clone)]
pub struct Notifier {
    identities: Arc<dyn IdentityStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl Notifier {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            identities,
            notifications,
        }
    }

    /// One alert for the student and one for every counselor. Each insert stands
    /// alone, so a failed recipient costs only its own notification.
    ///
    /// Fails only when the counselor roster itself cannot be read, and even then
    /// the student's alert has already been attempted.
    pub async fn escalate(
        &self,
        subject_user_id: Uuid,
        percentage: i32,
        related_id: Uuid,
    ) -> Result<FanoutReport, StoreError> {
        let mut report = FanoutReport::default();

        let student_alert = NewNotification {
            user_id: subject_user_id,
            title: "Tingkat Stres Tinggi Terdeteksi".to_string(),
            message: "Hasil tes menunjukkan tingkat stres yang cukup tinggi. Kami menyarankan \
                      untuk segera berkonsultasi dengan guru BK."
                .to_string(),
            notification_type: STUDENT_ALERT,
            related_id: Some(related_id),
            related_type: Some(RELATED_STRESS_TEST),
        };
        self.deliver(student_alert, &mut report).await;

        let counselors = self.identities.list_by_role(Role::Teacher).await?;
        for counselor in counselors {
            let alert = NewNotification {
                user_id: counselor.id,
                title: "Siswa dengan Tingkat Stres Tinggi".to_string(),
                message: format!(
                    "Seorang siswa menunjukkan tingkat stres {}% pada tes terbaru. \
                     Pertimbangkan untuk memberikan perhatian khusus.",
                    percentage
                ),
                notification_type: TEACHER_ALERT,
                related_id: Some(related_id),
                related_type: Some(RELATED_STRESS_TEST),
            };
            self.deliver(alert, &mut report).await;
        }

        if !report.failed.is_empty() {
            log::warn!(
                "Stress alert {} reached {} of {} recipients",
                related_id,
                report.delivered.len(),
                report.delivered.len() + report.failed.len()
            );
        }
        Ok(report)
    }

    async fn deliver(&self, notification: NewNotification, report: &mut FanoutReport) {
        let recipient = notification.user_id;
        match self.notifications.insert(notification).await {
            Ok(_) => report.delivered.push(recipient),
            Err(err) => {
                log::warn!("Could not notify {}: {}", recipient, err);
                report.failed.push(recipient);
            }
        }
    }
}
