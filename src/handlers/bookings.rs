use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;

use super::{check_admin, session_user};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Driver};
use crate::services::assignment;
use crate::services::booking::{self, BookingUpdate, NewBooking};
use crate::services::notifications::NotificationKind;
use crate::state::AppState;

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub(crate) fn rider_phone(conn: &Connection, user_id: &str) -> Option<String> {
    match queries::get_user(conn, user_id) {
        Ok(user) => user.and_then(|u| u.phone),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "could not look up rider for notification");
            None
        }
    }
}

/// Runs after the response data is settled; nothing here can fail the request.
pub(crate) fn notify(
    state: &AppState,
    kind: NotificationKind,
    booking: &Booking,
    phone: Option<String>,
    driver: Option<&Driver>,
) {
    state
        .notifier
        .booking_event(kind, booking, phone.as_deref(), driver);
}

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let user_id = session_user(&headers, &state)?;
    if body.user_id.as_deref().is_some_and(|u| u != user_id) {
        return Err(AppError::Forbidden(
            "user_id does not match the signed-in user".to_string(),
        ));
    }

    let (booking, phone) = {
        let db = state.db()?;
        let booking = booking::create_booking(
            &db,
            now(),
            state.config.auto_confirm,
            &state.rates,
            &user_id,
            body,
        )?;
        let phone = rider_phone(&db, &user_id);
        (booking, phone)
    };

    notify(&state, NotificationKind::Created, &booking, phone, None);
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /bookings?status=
#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let user_id = session_user(&headers, &state)?;
    let db = state.db()?;
    let bookings = booking::list_bookings(&db, &user_id, query.status.as_deref())?;
    Ok(Json(bookings))
}

// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let user_id = session_user(&headers, &state)?;
    let db = state.db()?;
    Ok(Json(booking::get_booking(&db, Some(&user_id), &id)?))
}

// PUT /bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<BookingUpdate>,
) -> Result<Json<Booking>, AppError> {
    let user_id = session_user(&headers, &state)?;
    let mut db = state.db()?;
    let booking = booking::update_booking(&mut db, now(), &state.rates, &user_id, &id, body)?;
    Ok(Json(booking))
}

// PUT /bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let user_id = session_user(&headers, &state)?;

    let (booking, phone) = {
        let mut db = state.db()?;
        let booking = booking::cancel_booking(&mut db, now(), Some(&user_id), &id)?;
        let phone = rider_phone(&db, &user_id);
        (booking, phone)
    };

    notify(&state, NotificationKind::Cancelled, &booking, phone, None);
    Ok(Json(booking))
}

// POST /bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let (booking, phone) = {
        let mut db = state.db()?;
        let booking = booking::confirm_booking(&mut db, now(), &id)?;
        let phone = rider_phone(&db, &booking.user_id);
        (booking, phone)
    };

    notify(&state, NotificationKind::Confirmed, &booking, phone, None);
    Ok(Json(booking))
}

// POST /bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let (booking, phone) = {
        let mut db = state.db()?;
        let booking = booking::complete_booking(&mut db, now(), &id)?;
        let phone = rider_phone(&db, &booking.user_id);
        (booking, phone)
    };

    notify(&state, NotificationKind::Completed, &booking, phone, None);
    Ok(Json(booking))
}

// POST /bookings/:id/assign
pub async fn auto_assign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;
    assign(&state, &id, None)
}

pub(crate) fn assign(
    state: &AppState,
    booking_id: &str,
    driver_id: Option<&str>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (booking, driver, phone) = {
        let mut db = state.db()?;
        let (booking, driver) = assignment::assign_driver(&mut db, now(), booking_id, driver_id)?;
        let phone = rider_phone(&db, &booking.user_id);
        (booking, driver, phone)
    };

    notify(state, NotificationKind::Assigned, &booking, phone, Some(&driver));
    Ok(Json(serde_json::json!({ "booking": booking, "driver": driver })))
}
