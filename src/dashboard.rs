use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, TypedHeader};
use chrono::Utc;
use serde::Serialize;

use crate::auth::require_role;
use crate::models::{AnonymousReport, Notification, Role, TeacherStats};
use crate::store::teacher_stats;
use crate::{proceeds, AppState, Payload};

pub const RECENT_REPORTS: i64 = 10;

pub async fn teacher_dashboard_stats(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<TeacherStats> {
    let identity = state.sessions.authenticate(None, bearer.as_ref()).await?;
    require_role(identity, Role::Teacher)?;

    let stats = teacher_stats(
        state.identities.as_ref(),
        state.appointments.as_ref(),
        state.reports.as_ref(),
        Utc::now(),
    )
    .await?;
    proceeds(stats)
}

pub async fn recent_reports(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<RecentReports> {
    let identity = state.sessions.authenticate(None, bearer.as_ref()).await?;
    require_role(identity, Role::Teacher)?;

    let reports = state.reports.recent(RECENT_REPORTS).await?;
    proceeds(RecentReports { reports })
}

pub async fn list_notifications(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<NotificationList> {
    let identity = state.sessions.authenticate(None, bearer.as_ref()).await?;
    let notifications = state.notifications.list_for_user(identity.id).await?;
    proceeds(NotificationList { notifications })
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentReports {
    pub reports: Vec<AnonymousReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
}
