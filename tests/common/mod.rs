#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::Duration;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use bk_counsel::models::{Identity, Role};
use bk_counsel::password::hash_password;
use bk_counsel::store::MemoryStore;
use bk_counsel::token::TokenService;
use bk_counsel::{app, AppState};

pub const PASSWORD: &str = "rahasia-sekolah-42";
pub const SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub student: Identity,
    pub counselors: Vec<Identity>,
}

pub fn identity(username: &str, role: Role) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        username: username.to_string(),
        role,
        full_name: format!("{} lengkap", username),
        email: Some(format!("{}@sma1.sch.id", username)),
        phone: None,
        class_name: match role {
            Role::Student => Some("XI IPS 1".to_string()),
            Role::Teacher => None,
        },
    }
}

pub fn tokens() -> TokenService {
    TokenService::new(SECRET, Duration::hours(24)).unwrap()
}

/// One student, `counselors` teachers, everyone sharing [`PASSWORD`].
pub fn fixture(counselors: usize) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let hash = hash_password(PASSWORD).unwrap();

    let student = identity("siti", Role::Student);
    store.add_identity(student.clone(), hash.clone()).unwrap();

    let counselors: Vec<Identity> = (0..counselors)
        .map(|n| {
            let counselor = identity(&format!("guru-bk-{}", n), Role::Teacher);
            store.add_identity(counselor.clone(), hash.clone()).unwrap();
            counselor
        })
        .collect();

    let state = AppState::new(store.clone(), tokens());
    Fixture {
        store,
        state,
        student,
        counselors,
    }
}

impl Fixture {
    pub fn add_student(&self, username: &str) -> Identity {
        let student = identity(username, Role::Student);
        self.store
            .add_identity(student.clone(), "not-a-phc-hash".to_string())
            .unwrap();
        student
    }

    pub fn token_for(&self, identity: &Identity) -> String {
        self.state.sessions.tokens().issue(identity)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_with_bearer(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}
