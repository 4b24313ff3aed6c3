use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use super::bookings::{notify, rider_phone};
use super::check_admin;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::booking;
use crate::services::notifications::NotificationKind;
use crate::state::AppState;

// GET /api/dashboard/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let status = booking::parse_status_filter(query.status.as_deref())?;

    let db = state.db()?;
    Ok(Json(queries::list_bookings(&db, status, limit)?))
}

// POST /api/dashboard/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let (booking, phone) = {
        let mut db = state.db()?;
        let booking = booking::cancel_booking(&mut db, chrono::Utc::now().naive_utc(), None, &id)?;
        let phone = rider_phone(&db, &booking.user_id);
        (booking, phone)
    };

    notify(&state, NotificationKind::Cancelled, &booking, phone, None);
    Ok(Json(booking))
}

// GET /api/dashboard/events — SSE stream
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource can't set headers, so the token rides in the query
    let token = query.token.as_deref().unwrap_or("");
    if token.is_empty() || token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let live_stream = BroadcastStream::new(state.notifier.subscribe()).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(data).event(event.kind.clone())))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "dashboard subscriber lagging, events dropped");
            None
        }
    });

    let keepalive_stream = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keepalive")));

    Ok(Sse::new(live_stream.merge(keepalive_stream)))
}
