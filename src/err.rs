use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::assessment::AssessmentError;
use crate::auth::AuthError;
use crate::scheduler::SchedulingError;
use crate::store::StoreError;

const SYSTEM_FAILURE: &str = "Terjadi kesalahan sistem";

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

/// Every failure a handler can answer with. Serialized as `{"error": <variant>, "message": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    InvalidPayload { message: String },
    AuthenticationFailure { message: String },
    Forbidden { message: String },
    NotFound { message: String },
    Conflict { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    fn unauthenticated<S: Into<String>>(msg: S) -> Error {
        Error::AuthenticationFailure {
            message: msg.into(),
        }
    }

    /// Logs the real cause and hides it from the client.
    pub fn internal(kind: &'static str, cause: &dyn std::fmt::Display) -> Error {
        log::error!("{}: {}", kind, cause);
        Error::InternalError {
            kind,
            message: SYSTEM_FAILURE.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::internal("DatabaseError", &err)
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Error::unauthenticated("Token tidak ditemukan"),
            AuthError::MalformedToken | AuthError::InvalidSignature => {
                Error::unauthenticated("Token tidak valid")
            }
            AuthError::Expired => Error::unauthenticated("Token telah kadaluarsa"),
            AuthError::UnknownUser => Error::unauthenticated("User tidak ditemukan"),
            AuthError::BadCredentials => Error::unauthenticated("Username atau password salah"),
            AuthError::MissingCredentials => Error::invalid("Username dan password harus diisi"),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<SchedulingError> for Error {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::InvalidInput(message) => Error::InvalidPayload { message },
            SchedulingError::NotFound => Error::NotFound {
                message: "User tidak ditemukan".to_string(),
            },
            SchedulingError::Forbidden => Error::Forbidden {
                message: "Hanya siswa yang dapat membuat jadwal konsultasi".to_string(),
            },
            SchedulingError::NoCounselorAvailable => Error::NotFound {
                message: "Tidak ada guru BK yang tersedia".to_string(),
            },
            SchedulingError::SlotUnavailable => Error::Conflict {
                message: "Waktu tersebut sudah tidak tersedia. Silakan pilih waktu lain."
                    .to_string(),
            },
            SchedulingError::Store(err) => err.into(),
        }
    }
}

impl From<AssessmentError> for Error {
    fn from(err: AssessmentError) -> Self {
        match err {
            AssessmentError::InvalidInput(message) => Error::InvalidPayload { message },
            AssessmentError::Forbidden => Error::Forbidden {
                message: "Hasil tes hanya dapat dikirim oleh pemiliknya".to_string(),
            },
            AssessmentError::Store(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(err: JsonRejection) -> Self {
        Error::invalid(format!("Format permintaan tidak valid: {}", err))
    }
}
