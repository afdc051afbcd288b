use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::info;

use crate::auth::{generate_session_id, generate_token, hash_password, now_millis, verify_password};
use crate::db::{
    create_api_token, create_session, create_user, delete_api_token, delete_session,
    get_user_by_username, list_api_tokens,
};
use crate::error::AppError;
use crate::middleware::SessionUser;
use crate::models::{ApiToken, CreateApiToken, Credentials, Session, User};
use crate::AppState;

const SESSION_DAYS: i64 = 7;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<Credentials>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if req.username.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "username must not be empty.".to_string(),
        ));
    }
    if req.password.is_empty() {
        return Err(AppError::InvalidArgument(
            "password must not be empty.".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let user = create_user(&state.db, req.username.trim(), &password_hash)?;
    info!(user_id = %user.id, "Registered user");

    let jar = open_session(&state, jar, &user)?;
    Ok((
        jar,
        (
            StatusCode::CREATED,
            Json(json!({ "user_id": user.id, "username": user.username })),
        ),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<Credentials>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    let user = get_user_by_username(&state.db, req.username.trim())?
        .filter(|user| verify_password(&req.password, &user.password_hash))
        .ok_or(AppError::Unauthenticated)?;

    let jar = open_session(&state, jar, &user)?;
    info!(user_id = %user.id, "User logged in");

    Ok((
        jar,
        Json(json!({ "user_id": user.id, "username": user.username })),
    ))
}

fn open_session(state: &AppState, jar: CookieJar, user: &User) -> Result<CookieJar, AppError> {
    let session_id = generate_session_id();
    let now = now_millis();
    let lifetime = time::Duration::days(SESSION_DAYS);

    let session = Session {
        id: session_id.clone(),
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + lifetime.whole_milliseconds() as i64,
    };
    create_session(&state.db, &session)?;

    let cookie = Cookie::build(("session", session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(lifetime);

    Ok(jar.add(cookie))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get("session") {
        delete_session(&state.db, session_cookie.value())?;
    }
    info!("User logged out");

    let cookie = Cookie::build(("session", ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

pub async fn list_tokens(
    SessionUser(user_id): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiToken>>, AppError> {
    let tokens = list_api_tokens(&state.db, &user_id)?;
    Ok(Json(tokens))
}

pub async fn create_token(
    SessionUser(user_id): SessionUser,
    State(state): State<AppState>,
    Json(req): Json<CreateApiToken>,
) -> Result<Json<ApiToken>, AppError> {
    let token_value = generate_token();
    let token = create_api_token(&state.db, &user_id, &token_value, req.name.as_deref())?;
    info!(%user_id, name = ?req.name, "Created API token");
    Ok(Json(token))
}

pub async fn revoke_token(
    SessionUser(user_id): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if delete_api_token(&state.db, &user_id, id)? {
        info!(%user_id, id, "Revoked API token");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Token not found."))
    }
}
