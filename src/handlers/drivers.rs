use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::bookings::assign;
use super::check_admin;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::Driver;
use crate::services::drivers::{self, AvailabilityUpdate, NewDriver};
use crate::state::AppState;

// POST /drivers
pub async fn create_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewDriver>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    let db = state.db()?;
    let driver = drivers::create_driver(&db, chrono::Utc::now().naive_utc(), body)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

// GET /drivers
pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Driver>>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    let db = state.db()?;
    Ok(Json(queries::list_drivers(&db)?))
}

// GET /drivers/available
pub async fn list_available(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Driver>>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    let db = state.db()?;
    Ok(Json(queries::list_available_drivers(&db)?))
}

// PUT /drivers/:id/availability
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AvailabilityUpdate>,
) -> Result<Json<Driver>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    let db = state.db()?;
    let driver = drivers::set_availability(&db, chrono::Utc::now().naive_utc(), &id, body)?;
    Ok(Json(driver))
}

// POST /drivers/:id/assign
#[derive(Deserialize)]
pub struct AssignRequest {
    #[serde(alias = "bookingId")]
    pub booking_id: String,
}

pub async fn assign_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    assign(&state, &body.booking_id, Some(&id))
}
