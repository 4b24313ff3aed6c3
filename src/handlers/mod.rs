pub mod app;
pub mod bookings;
pub mod dashboard;
pub mod drivers;
pub mod health;
pub mod pricing;
pub mod users;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::services::auth;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(app::app_page))
        .route("/health", get(health::health))
        .route("/users", post(users::register))
        .route("/auth/login", post(users::login))
        .route("/pricing/estimate", get(pricing::estimate))
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route(
            "/bookings/:id",
            get(bookings::get_booking).put(bookings::update_booking),
        )
        .route("/bookings/:id/cancel", put(bookings::cancel_booking))
        .route("/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/bookings/:id/complete", post(bookings::complete_booking))
        .route("/bookings/:id/assign", post(bookings::auto_assign))
        .route(
            "/drivers",
            post(drivers::create_driver).get(drivers::list_drivers),
        )
        .route("/drivers/available", get(drivers::list_available))
        .route(
            "/drivers/:id/availability",
            put(drivers::set_availability),
        )
        .route("/drivers/:id/assign", post(drivers::assign_driver))
        .route("/api/dashboard/bookings", get(dashboard::get_bookings))
        .route(
            "/api/dashboard/bookings/:id/cancel",
            post(dashboard::cancel_booking),
        )
        .route("/api/dashboard/events", get(dashboard::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

/// Dispatcher routes: the static admin token.
pub(crate) fn check_admin(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let token = bearer_token(headers);
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Rider routes: a session token from `/auth/login`. Returns the user id.
pub(crate) fn session_user(headers: &HeaderMap, state: &AppState) -> Result<String, AppError> {
    let token = bearer_token(headers);
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }
    auth::verify_token(&state.config.session_secret, token, chrono::Utc::now().naive_utc())
}
