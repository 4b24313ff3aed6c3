use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Driver};

/// Pairs a confirmed booking with a driver.
///
/// With `driver_id` the named driver is claimed; without it the available
/// driver assigned longest ago is taken. The driver claim and the booking
/// update commit together or not at all, and the claim only succeeds while
/// the driver is still flagged available, so one driver can never end up on
/// two bookings.
pub fn assign_driver(
    conn: &mut Connection,
    now: NaiveDateTime,
    booking_id: &str,
    driver_id: Option<&str>,
) -> Result<(Booking, Driver), AppError> {
    let tx = conn.transaction()?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking"))?;
    if booking.status != BookingStatus::Confirmed {
        return Err(AppError::conflict(format!(
            "booking is {}, only confirmed bookings can be assigned",
            booking.status
        )));
    }

    let driver_id = match driver_id {
        Some(id) => {
            if queries::get_driver(&tx, id)?.is_none() {
                return Err(AppError::not_found("driver"));
            }
            id.to_string()
        }
        None => queries::next_available_driver_id(&tx)?
            .ok_or_else(|| AppError::conflict("no drivers available"))?,
    };

    if !queries::claim_driver(&tx, &driver_id, &now)? {
        return Err(AppError::conflict("driver is not available"));
    }

    if !queries::update_booking_status(
        &tx,
        booking_id,
        BookingStatus::Confirmed,
        BookingStatus::Assigned,
        Some(&driver_id),
        &now,
    )? {
        return Err(AppError::conflict("booking changed concurrently"));
    }

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::not_found("booking"))?;
    let driver = queries::get_driver(&tx, &driver_id)?
        .ok_or_else(|| AppError::not_found("driver"))?;
    tx.commit()?;

    tracing::info!(booking_id = %booking.id, driver_id = %driver.id, "driver assigned");
    Ok((booking, driver))
}
