use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::{header::AUTHORIZATION, request::Parts};
use serde_json::Value;
use tracing::debug;

use crate::auth::now_millis;
use crate::db::{get_api_token_by_value, get_session, DbPool};
use crate::error::AppError;
use crate::models::CallableRequest;
use crate::AppState;

/// The caller subject resolved from a session cookie or API token, if any.
/// Whether its absence is an error is up to the operation.
pub struct Identity(pub Option<String>);

impl Identity {
    pub fn subject(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// A caller authenticated via session cookie only (no API tokens).
pub struct SessionUser(pub String);

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = session_user(parts, &state.db)? {
            return Ok(Identity(Some(user_id)));
        }

        if let Some(user_id) = bearer_user(parts, &state.db)? {
            return Ok(Identity(Some(user_id)));
        }

        debug!("request carries no caller identity");
        Ok(Identity(None))
    }
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_user(parts, &state.db)?
            .map(SessionUser)
            .ok_or(AppError::Unauthenticated)
    }
}

fn session_user(parts: &Parts, db: &DbPool) -> Result<Option<String>, AppError> {
    let cookies = parts
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|s| s.trim().split_once('='));

    let now = now_millis();
    for (name, value) in cookies {
        if name != "session" {
            continue;
        }
        if let Some(session) = get_session(db, value)? {
            if session.expires_at > now {
                return Ok(Some(session.user_id));
            }
        }
    }
    Ok(None)
}

fn bearer_user(parts: &Parts, db: &DbPool) -> Result<Option<String>, AppError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match token {
        Some(token) => Ok(get_api_token_by_value(db, token)?.map(|t| t.user_id)),
        None => Ok(None),
    }
}

/// The `data` member of a callable request envelope. An empty body is
/// treated as `{"data": null}`.
pub struct CallableData(pub Value);

impl<S: Send + Sync> FromRequest<S> for CallableData {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::InvalidArgument(format!("Bad request body: {e}")))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(CallableData(Value::Null));
        }

        let envelope: CallableRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidArgument(format!("Bad request envelope: {e}")))?;
        Ok(CallableData(envelope.data))
    }
}
