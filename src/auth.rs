use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Identity, Role};
use crate::password::verify_password;
use crate::store::{IdentityStore, StoreError};
use crate::token::TokenService;
use crate::{proceeds, AppState, Payload};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token was presented")]
    MissingToken,

    #[error("token could not be decoded")]
    MalformedToken,

    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token refers to an unknown user")]
    UnknownUser,

    #[error("username or password is wrong")]
    BadCredentials,

    #[error("username and password are required")]
    MissingCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues tokens on login and turns presented tokens back into live identities.
#[derive(Clone)]
pub struct Sessions {
    tokens: TokenService,
    identities: Arc<dyn IdentityStore>,
}

impl Sessions {
    pub fn new(tokens: TokenService, identities: Arc<dyn IdentityStore>) -> Self {
        Self { tokens, identities }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(String, Identity), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let credentials = self
            .identities
            .find_credentials(username)
            .await?
            .ok_or(AuthError::BadCredentials)?;
        if !verify_password(password, &credentials.password_hash) {
            return Err(AuthError::BadCredentials);
        }
        let token = self.tokens.issue(&credentials.identity);
        Ok((token, credentials.identity))
    }

    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Returns the stored identity, not the token's copy, so profile and role
    /// changes apply to tokens issued before them.
    pub async fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let claims = self.tokens.decode_at(token, now)?;
        self.identities
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::UnknownUser)
    }

    /// Token from the request body wins over the `Authorization` header.
    pub async fn authenticate(
        &self,
        body_token: Option<&str>,
        bearer: Option<&TypedHeader<Authorization<Bearer>>>,
    ) -> Result<Identity, AuthError> {
        let token = body_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| bearer.map(|TypedHeader(auth)| auth.token()))
            .ok_or(AuthError::MissingToken)?;
        let result = self.verify(token).await;
        if let Err(err) = &result {
            log::warn!("Rejected session token: {}", err);
        }
        result
    }
}

/// Identity that must hold `role`, otherwise the caller is forbidden.
pub fn require_role(identity: Identity, role: Role) -> Result<Identity, crate::Error> {
    if identity.role != role {
        return Err(crate::Error::Forbidden {
            message: "Akses ditolak untuk peran ini".to_string(),
        });
    }
    Ok(identity)
}

pub async fn login(
    payload: Result<Json<LoginRequest>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<LoggedIn> {
    let Json(login) = payload?;
    let username = login.username.unwrap_or_default();
    let password = login.password.unwrap_or_default();

    let (token, user) = state.sessions.login(&username, &password).await.map_err(|err| {
        if matches!(err, AuthError::BadCredentials) {
            log::warn!("Failed login for `{}`", username);
        }
        err
    })?;
    log::info!("User `{}` logged in as {}", user.username, user.role);
    proceeds(LoggedIn { token, user })
}

pub async fn verify(
    payload: Result<Json<VerifyRequest>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<Verified> {
    let Json(body) = payload?;
    let user = state
        .sessions
        .authenticate(body.token.as_deref(), None)
        .await?;
    proceeds(Verified { user })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIn {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verified {
    pub user: Identity,
}
