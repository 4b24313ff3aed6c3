use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::User;
use crate::services::auth::{self, Session};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// Argon2 hashing blocks, so both routes run on the blocking pool.

// POST /users
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = tokio::task::spawn_blocking(move || {
        let db = state.db()?;
        auth::register(
            &db,
            chrono::Utc::now().naive_utc(),
            &body.email,
            body.phone.as_deref(),
            &body.password,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    Ok((StatusCode::CREATED, Json(user)))
}

// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    let session = tokio::task::spawn_blocking(move || {
        let db = state.db()?;
        auth::login(
            &db,
            &state.config.session_secret,
            state.config.session_ttl_hours,
            chrono::Utc::now().naive_utc(),
            &body.email,
            &body.password,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    Ok(Json(session))
}
