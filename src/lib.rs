pub mod assessment;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod err;
pub mod models;
pub mod notify;
pub mod password;
pub mod scheduler;
pub mod store;
pub mod token;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;

pub use crate::err::{Error, Success};

use crate::assessment::StressEngine;
use crate::auth::Sessions;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::store::{
    AppointmentStore, AssessmentStore, IdentityStore, NotificationStore, ReportStore,
};
use crate::token::TokenService;

pub type Payload<T> = axum::response::Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

/// Handles shared by every request. Cloned per request; all fields are cheap.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Sessions,
    pub identities: Arc<dyn IdentityStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub assessments: Arc<dyn AssessmentStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub reports: Arc<dyn ReportStore>,
}

impl AppState {
    /// Wires every store seam to the same backend.
    pub fn new<S>(store: Arc<S>, tokens: TokenService) -> Self
    where
        S: IdentityStore
            + AppointmentStore
            + AssessmentStore
            + NotificationStore
            + ReportStore
            + 'static,
    {
        let identities: Arc<dyn IdentityStore> = store.clone();
        Self {
            sessions: Sessions::new(tokens, identities.clone()),
            identities,
            appointments: store.clone(),
            assessments: store.clone(),
            notifications: store.clone(),
            reports: store,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.identities.clone(), self.appointments.clone())
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.identities.clone(), self.notifications.clone())
    }

    pub fn stress_engine(&self) -> StressEngine {
        StressEngine::new(self.assessments.clone(), self.notifier())
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", post(auth::verify))
        .route("/appointments/create", post(scheduler::create_appointment))
        .route("/appointments/list", get(scheduler::list_appointments))
        .route("/appointments/recent", get(scheduler::recent_appointments))
        .route("/stress-test/questions", get(assessment::questions))
        .route("/stress-test/submit", post(assessment::submit_stress_test))
        .route("/notifications/list", get(dashboard::list_notifications))
        .route("/reports/recent", get(dashboard::recent_reports))
        .route(
            "/dashboard/teacher/stats",
            get(dashboard::teacher_dashboard_stats),
        )
        .fallback(err::handler404.into_service())
        .layer(ServiceBuilder::new().layer(Extension(state)))
}
