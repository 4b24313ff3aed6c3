use chrono::{NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, ServiceClass};
use crate::services::pricing::RateTable;

fn default_resource() -> String {
    ServiceClass::Standard.as_str().to_string()
}

/// Body of `POST /bookings`. Accepts both snake_case and camelCase names.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default = "default_resource", alias = "resourceId")]
    pub resource_id: String,
    #[serde(alias = "pickupAddress")]
    pub pickup_address: String,
    #[serde(alias = "dropoffAddress")]
    pub dropoff_address: String,
    #[serde(alias = "startTime", alias = "dateTime")]
    pub start_time: NaiveDateTime,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PUT /bookings/{id}`; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingUpdate {
    #[serde(default, alias = "resourceId")]
    pub resource_id: Option<String>,
    #[serde(default, alias = "pickupAddress")]
    pub pickup_address: Option<String>,
    #[serde(default, alias = "dropoffAddress")]
    pub dropoff_address: Option<String>,
    #[serde(default, alias = "startTime", alias = "dateTime")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn parse_class(resource_id: &str) -> Result<ServiceClass, AppError> {
    ServiceClass::parse(resource_id)
        .ok_or_else(|| AppError::validation(format!("unknown resource_id: {resource_id}")))
}

fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Rows keep whole seconds; trimming up front keeps what we return equal to
/// what a later read gives back.
fn whole_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

pub fn validate_timing(
    now: &NaiveDateTime,
    start: &NaiveDateTime,
    end: Option<&NaiveDateTime>,
) -> Result<(), AppError> {
    if start <= now {
        return Err(AppError::validation("start_time must be in the future"));
    }
    if let Some(end) = end {
        if end <= start {
            return Err(AppError::validation("end_time must be after start_time"));
        }
    }
    Ok(())
}

pub fn parse_status_filter(status: Option<&str>) -> Result<Option<BookingStatus>, AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("unknown status: {s}"))),
    }
}

pub fn create_booking(
    conn: &Connection,
    now: NaiveDateTime,
    auto_confirm: bool,
    rates: &RateTable,
    user_id: &str,
    new: NewBooking,
) -> Result<Booking, AppError> {
    let now = whole_seconds(now);
    let class = parse_class(&new.resource_id)?;
    let pickup_address = require_text("pickup_address", &new.pickup_address)?;
    let dropoff_address = require_text("dropoff_address", &new.dropoff_address)?;
    validate_timing(&now, &new.start_time, new.end_time.as_ref())?;

    let fare = rates.estimate_addresses(class, &pickup_address, &dropoff_address);

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        resource_id: class.as_str().to_string(),
        pickup_address,
        dropoff_address,
        start_time: whole_seconds(new.start_time),
        end_time: new.end_time.map(whole_seconds),
        status: if auto_confirm {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        },
        driver_id: None,
        fare_cents: fare.fare_cents,
        distance_km: fare.distance_km,
        notes: new.notes.filter(|n| !n.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };

    queries::insert_booking(conn, &booking)?;

    tracing::info!(
        booking_id = %booking.id,
        user_id = %booking.user_id,
        status = %booking.status,
        fare_cents = booking.fare_cents,
        "booking created"
    );
    Ok(booking)
}

/// Looks a booking up on behalf of `owner`. Someone else's booking is
/// reported exactly like a missing one.
pub fn get_booking(conn: &Connection, owner: Option<&str>, id: &str) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, id)?
        .filter(|b| owner.map_or(true, |o| b.user_id == o))
        .ok_or_else(|| AppError::not_found("booking"))
}

pub fn list_bookings(
    conn: &Connection,
    user_id: &str,
    status: Option<&str>,
) -> Result<Vec<Booking>, AppError> {
    let status = parse_status_filter(status)?;
    Ok(queries::list_bookings_for_user(conn, user_id, status)?)
}

pub fn update_booking(
    conn: &mut Connection,
    now: NaiveDateTime,
    rates: &RateTable,
    user_id: &str,
    id: &str,
    update: BookingUpdate,
) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;
    let mut booking = get_booking(&tx, Some(user_id), id)?;

    if !booking.status.is_editable() {
        return Err(AppError::conflict(format!(
            "booking is {} and can no longer be changed",
            booking.status
        )));
    }

    if let Some(resource_id) = update.resource_id {
        booking.resource_id = parse_class(&resource_id)?.as_str().to_string();
    }
    if let Some(pickup) = update.pickup_address {
        booking.pickup_address = require_text("pickup_address", &pickup)?;
    }
    if let Some(dropoff) = update.dropoff_address {
        booking.dropoff_address = require_text("dropoff_address", &dropoff)?;
    }
    if let Some(start) = update.start_time {
        booking.start_time = whole_seconds(start);
    }
    if let Some(end) = update.end_time {
        booking.end_time = Some(whole_seconds(end));
    }
    if let Some(notes) = update.notes {
        booking.notes = Some(notes).filter(|n| !n.trim().is_empty());
    }

    validate_timing(&now, &booking.start_time, booking.end_time.as_ref())?;

    let fare = rates.estimate_addresses(
        parse_class(&booking.resource_id)?,
        &booking.pickup_address,
        &booking.dropoff_address,
    );
    booking.fare_cents = fare.fare_cents;
    booking.distance_km = fare.distance_km;
    booking.updated_at = whole_seconds(now);

    queries::update_booking_details(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(booking_id = %booking.id, "booking updated");
    Ok(booking)
}

/// Moves a booking along its lifecycle. Leaving `assigned` for a terminal
/// state puts the driver back into the available pool in the same
/// transaction.
pub fn transition(
    conn: &mut Connection,
    now: NaiveDateTime,
    owner: Option<&str>,
    id: &str,
    to: BookingStatus,
) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;
    let booking = get_booking(&tx, owner, id)?;
    let from = booking.status;

    if !from.can_transition_to(to) {
        return Err(AppError::conflict(format!("cannot move booking from {from} to {to}")));
    }

    if !queries::update_booking_status(&tx, id, from, to, None, &now)? {
        return Err(AppError::conflict("booking changed concurrently"));
    }

    if to.is_terminal() {
        if let Some(driver_id) = booking.driver_id.as_deref() {
            queries::release_driver(&tx, driver_id, &now)?;
            tracing::info!(booking_id = %id, driver_id = %driver_id, "driver released");
        }
    }

    let updated = get_booking(&tx, None, id)?;
    tx.commit()?;

    tracing::info!(booking_id = %id, from = %from, to = %to, "booking status changed");
    Ok(updated)
}

pub fn cancel_booking(
    conn: &mut Connection,
    now: NaiveDateTime,
    owner: Option<&str>,
    id: &str,
) -> Result<Booking, AppError> {
    transition(conn, now, owner, id, BookingStatus::Cancelled)
}

pub fn confirm_booking(conn: &mut Connection, now: NaiveDateTime, id: &str) -> Result<Booking, AppError> {
    transition(conn, now, None, id, BookingStatus::Confirmed)
}

pub fn complete_booking(conn: &mut Connection, now: NaiveDateTime, id: &str) -> Result<Booking, AppError> {
    transition(conn, now, None, id, BookingStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::auth;
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn setup() -> (Connection, String) {
        let conn = db::init_db(":memory:").unwrap();
        let user = auth::register(&conn, now(), "rider@example.com", None, "hunter22!").unwrap();
        (conn, user.id)
    }

    fn new_booking(start: NaiveDateTime) -> NewBooking {
        NewBooking {
            user_id: None,
            resource_id: "standard".to_string(),
            pickup_address: "1 Main St".to_string(),
            dropoff_address: "Airport".to_string(),
            start_time: start,
            end_time: None,
            notes: None,
        }
    }

    #[test]
    fn test_create_then_read_returns_submitted_fields() {
        let (conn, user_id) = setup();
        let start = (now() + Duration::hours(2)).with_nanosecond(0).unwrap();
        let mut req = new_booking(start);
        req.end_time = Some(start + Duration::minutes(45));

        let created = create_booking(&conn, now(), true, &RateTable::standard(), &user_id, req).unwrap();
        let read = get_booking(&conn, Some(&user_id), &created.id).unwrap();

        assert_eq!(read.user_id, user_id);
        assert_eq!(read.resource_id, "standard");
        assert_eq!(read.start_time, start);
        assert_eq!(read.end_time, Some(start + Duration::minutes(45)));
        assert_eq!(read.status, BookingStatus::Confirmed);
        assert_eq!(read.fare_cents, 250);
    }

    #[test]
    fn test_past_start_rejected() {
        let (conn, user_id) = setup();
        let result = create_booking(
            &conn,
            now(),
            true,
            &RateTable::standard(),
            &user_id,
            new_booking(now() - Duration::minutes(5)),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let (conn, user_id) = setup();
        let start = now() + Duration::hours(1);
        let mut req = new_booking(start);
        req.end_time = Some(start - Duration::minutes(1));
        let result = create_booking(&conn, now(), true, &RateTable::standard(), &user_id, req);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let (conn, user_id) = setup();
        let mut req = new_booking(now() + Duration::hours(1));
        req.pickup_address = "   ".to_string();
        assert!(create_booking(&conn, now(), true, &RateTable::standard(), &user_id, req).is_err());

        let mut req = new_booking(now() + Duration::hours(1));
        req.resource_id = "helicopter".to_string();
        assert!(create_booking(&conn, now(), true, &RateTable::standard(), &user_id, req).is_err());
    }

    #[test]
    fn test_pending_when_not_auto_confirmed() {
        let (mut conn, user_id) = setup();
        let booking = create_booking(
            &conn,
            now(),
            false,
            &RateTable::standard(),
            &user_id,
            new_booking(now() + Duration::hours(1)),
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);

        let confirmed = confirm_booking(&mut conn, now(), &booking.id).unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_other_users_booking_is_not_found() {
        let (conn, user_id) = setup();
        let booking = create_booking(
            &conn,
            now(),
            true,
            &RateTable::standard(),
            &user_id,
            new_booking(now() + Duration::hours(1)),
        )
        .unwrap();

        assert!(matches!(
            get_booking(&conn, Some("someone-else"), &booking.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            get_booking(&conn, Some(&user_id), "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let (mut conn, user_id) = setup();
        let booking = create_booking(
            &conn,
            now(),
            true,
            &RateTable::standard(),
            &user_id,
            new_booking(now() + Duration::hours(1)),
        )
        .unwrap();

        let cancelled = cancel_booking(&mut conn, now(), Some(&user_id), &booking.id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        assert!(matches!(
            cancel_booking(&mut conn, now(), Some(&user_id), &booking.id),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            update_booking(
                &mut conn,
                now(),
                &RateTable::standard(),
                &user_id,
                &booking.id,
                BookingUpdate::default()
            ),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_reprices() {
        let (mut conn, user_id) = setup();
        let booking = create_booking(
            &conn,
            now(),
            true,
            &RateTable::standard(),
            &user_id,
            new_booking(now() + Duration::hours(1)),
        )
        .unwrap();

        let updated = update_booking(
            &mut conn,
            now(),
            &RateTable::standard(),
            &user_id,
            &booking.id,
            BookingUpdate {
                resource_id: Some("premium".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.resource_id, "premium");
        assert_eq!(updated.fare_cents, 500);

        let stored = get_booking(&conn, Some(&user_id), &booking.id).unwrap();
        assert_eq!(stored.fare_cents, 500);
    }

    #[test]
    fn test_list_filters_by_status() {
        let (mut conn, user_id) = setup();
        let rates = RateTable::standard();
        let a = create_booking(&conn, now(), true, &rates, &user_id, new_booking(now() + Duration::hours(1))).unwrap();
        create_booking(&conn, now(), true, &rates, &user_id, new_booking(now() + Duration::hours(2))).unwrap();
        cancel_booking(&mut conn, now(), Some(&user_id), &a.id).unwrap();

        assert_eq!(list_bookings(&conn, &user_id, None).unwrap().len(), 2);
        let cancelled = list_bookings(&conn, &user_id, Some("cancelled")).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a.id);
        assert!(matches!(
            list_bookings(&conn, &user_id, Some("bogus")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_new_booking_accepts_camel_case() {
        let json = r#"{"userId":"u1","resourceId":"xl","pickupAddress":"A","dropoffAddress":"B","dateTime":"2030-01-01T10:00:00"}"#;
        let req: NewBooking = serde_json::from_str(json).unwrap();
        assert_eq!(req.user_id.as_deref(), Some("u1"));
        assert_eq!(req.resource_id, "xl");
        assert_eq!(req.start_time.to_string(), "2030-01-01 10:00:00");
    }
}
