use anyhow::Context;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::models::{Booking, BookingStatus, Driver, Location, User};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("bad timestamp in row: {s}"))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, resource_id, pickup_address, dropoff_address, start_time, end_time, \
     status, driver_id, fare_cents, distance_km, notes, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, user_id, resource_id, pickup_address, dropoff_address, start_time, end_time,
                               status, driver_id, fare_cents, distance_km, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            booking.id,
            booking.user_id,
            booking.resource_id,
            booking.pickup_address,
            booking.dropoff_address,
            format_ts(&booking.start_time),
            booking.end_time.as_ref().map(format_ts),
            booking.status.as_str(),
            booking.driver_id,
            booking.fare_cents,
            booking.distance_km,
            booking.notes,
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings_for_user(
    conn: &Connection,
    user_id: &str,
    status: Option<BookingStatus>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC, id ASC"
    ))?;

    let rows = stmt.query_map(params![user_id, status.map(|s| s.as_str())], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_bookings(
    conn: &Connection,
    status: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY start_time DESC, id ASC LIMIT ?2"
    ))?;

    let rows = stmt.query_map(params![status.map(|s| s.as_str()), limit], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Overwrites the rider-editable fields and the fare.
pub fn update_booking_details(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET resource_id = ?1, pickup_address = ?2, dropoff_address = ?3,
                start_time = ?4, end_time = ?5, fare_cents = ?6, distance_km = ?7, notes = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            booking.resource_id,
            booking.pickup_address,
            booking.dropoff_address,
            format_ts(&booking.start_time),
            booking.end_time.as_ref().map(format_ts),
            booking.fare_cents,
            booking.distance_km,
            booking.notes,
            format_ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

/// Compare-and-set on status: only succeeds while the row still has `from`.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    driver_id: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, driver_id = COALESCE(?2, driver_id), updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![to.as_str(), driver_id, format_ts(now), id, from.as_str()],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(5)?;
    let end_time: Option<String> = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        resource_id: row.get(2)?,
        pickup_address: row.get(3)?,
        dropoff_address: row.get(4)?,
        start_time: parse_ts(&start_time)?,
        end_time: end_time.as_deref().map(parse_ts).transpose()?,
        status: BookingStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status in row: {status_str}"))?,
        driver_id: row.get(8)?,
        fare_cents: row.get(9)?,
        distance_km: row.get(10)?,
        notes: row.get(11)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Drivers ──

const DRIVER_COLUMNS: &str =
    "id, name, license_number, phone, available, on_duty, lat, lng, last_assigned_at, created_at, updated_at";

/// Returns false when the license number is already registered.
pub fn insert_driver(conn: &Connection, driver: &Driver) -> anyhow::Result<bool> {
    let result = conn.execute(
        "INSERT INTO drivers (id, name, license_number, phone, available, on_duty, lat, lng, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            driver.id,
            driver.name,
            driver.license_number,
            driver.phone,
            driver.available as i32,
            driver.on_duty as i32,
            driver.location.map(|l| l.lat),
            driver.location.map(|l| l.lng),
            format_ts(&driver.created_at),
            format_ts(&driver.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn get_driver(conn: &Connection, id: &str) -> anyhow::Result<Option<Driver>> {
    let result = conn.query_row(
        &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?1"),
        params![id],
        |row| Ok(parse_driver_row(row)),
    );

    match result {
        Ok(driver) => Ok(Some(driver?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_drivers(conn: &Connection) -> anyhow::Result<Vec<Driver>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRIVER_COLUMNS} FROM drivers ORDER BY name ASC, id ASC"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_driver_row(row)))?;

    let mut drivers = vec![];
    for row in rows {
        drivers.push(row??);
    }
    Ok(drivers)
}

/// Available drivers in round-robin order: whoever was assigned longest ago
/// (or never) comes first.
pub fn list_available_drivers(conn: &Connection) -> anyhow::Result<Vec<Driver>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRIVER_COLUMNS} FROM drivers WHERE available = 1
         ORDER BY assign_seq ASC, created_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_driver_row(row)))?;

    let mut drivers = vec![];
    for row in rows {
        drivers.push(row??);
    }
    Ok(drivers)
}

pub fn next_available_driver_id(conn: &Connection) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM drivers WHERE available = 1
             ORDER BY assign_seq ASC, created_at ASC, id ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Puts the driver on or off shift. Going off shift also leaves the pool; the
/// caller checks that a driver coming on shift is not mid-ride.
pub fn set_driver_availability(
    conn: &Connection,
    id: &str,
    available: bool,
    location: Option<Location>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE drivers SET available = ?1, on_duty = ?1,
                lat = COALESCE(?2, lat), lng = COALESCE(?3, lng), updated_at = ?4
         WHERE id = ?5",
        params![
            available as i32,
            location.map(|l| l.lat),
            location.map(|l| l.lng),
            format_ts(now),
            id,
        ],
    )?;
    Ok(count > 0)
}

/// Takes the driver out of the available pool. Returns false if someone else
/// got there first or the driver does not exist.
pub fn claim_driver(conn: &Connection, id: &str, now: &NaiveDateTime) -> anyhow::Result<bool> {
    let ts = format_ts(now);
    let count = conn.execute(
        "UPDATE drivers SET available = 0, last_assigned_at = ?1, updated_at = ?1,
                assign_seq = (SELECT COALESCE(MAX(assign_seq), 0) + 1 FROM drivers)
         WHERE id = ?2 AND available = 1",
        params![ts, id],
    )?;
    Ok(count > 0)
}

/// Ends a ride. The driver rejoins the pool only if still on shift.
pub fn release_driver(conn: &Connection, id: &str, now: &NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE drivers SET available = on_duty, updated_at = ?1 WHERE id = ?2",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn driver_has_active_booking(conn: &Connection, driver_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE driver_id = ?1 AND status = 'assigned'",
        params![driver_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_driver_row(row: &rusqlite::Row) -> anyhow::Result<Driver> {
    let lat: Option<f64> = row.get(6)?;
    let lng: Option<f64> = row.get(7)?;
    let last_assigned_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Driver {
        id: row.get(0)?,
        name: row.get(1)?,
        license_number: row.get(2)?,
        phone: row.get(3)?,
        available: row.get::<_, i32>(4)? != 0,
        on_duty: row.get::<_, i32>(5)? != 0,
        location: match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Location { lat, lng }),
            _ => None,
        },
        last_assigned_at: last_assigned_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Users ──

/// Returns false when the email is already registered.
pub fn insert_user(conn: &Connection, user: &User) -> anyhow::Result<bool> {
    let result = conn.execute(
        "INSERT INTO users (id, email, phone, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.email,
            user.phone,
            user.password_hash,
            format_ts(&user.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    query_user(conn, "SELECT id, email, phone, password_hash, created_at FROM users WHERE email = ?1", email)
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    query_user(conn, "SELECT id, email, phone, password_hash, created_at FROM users WHERE id = ?1", id)
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(sql, params![key], |row| {
        let created_at: String = row.get(4)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            created_at,
        ))
    });

    match result {
        Ok((id, email, phone, password_hash, created_at)) => Ok(Some(User {
            id,
            email,
            phone,
            password_hash,
            created_at: parse_ts(&created_at)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            phone: None,
            password_hash: "hash".to_string(),
            created_at: now(),
        }
    }

    fn driver(id: &str, license: &str) -> Driver {
        Driver {
            id: id.to_string(),
            name: format!("Driver {id}"),
            license_number: license.to_string(),
            phone: None,
            available: true,
            on_duty: true,
            location: None,
            last_assigned_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_duplicate_email_reports_false() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(insert_user(&conn, &user("u1")).unwrap());

        let mut dup = user("u2");
        dup.email = "u1@example.com".to_string();
        assert!(!insert_user(&conn, &dup).unwrap());
    }

    #[test]
    fn test_duplicate_license_reports_false() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(insert_driver(&conn, &driver("d1", "LIC-1")).unwrap());
        assert!(!insert_driver(&conn, &driver("d2", "LIC-1")).unwrap());
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let conn = db::init_db(":memory:").unwrap();
        insert_driver(&conn, &driver("d1", "LIC-1")).unwrap();

        assert!(claim_driver(&conn, "d1", &now()).unwrap());
        assert!(!claim_driver(&conn, "d1", &now()).unwrap());
        assert!(!claim_driver(&conn, "missing", &now()).unwrap());

        release_driver(&conn, "d1", &now()).unwrap();
        assert!(claim_driver(&conn, "d1", &now()).unwrap());
    }

    #[test]
    fn test_available_order_rotates_after_claim() {
        let conn = db::init_db(":memory:").unwrap();
        insert_driver(&conn, &driver("a", "LIC-A")).unwrap();
        insert_driver(&conn, &driver("b", "LIC-B")).unwrap();

        let first = next_available_driver_id(&conn).unwrap().unwrap();
        claim_driver(&conn, &first, &now()).unwrap();
        release_driver(&conn, &first, &now()).unwrap();

        let second = next_available_driver_id(&conn).unwrap().unwrap();
        assert_ne!(first, second);

        let order: Vec<String> = list_available_drivers(&conn)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(order, vec![second, first]);
    }

    #[test]
    fn test_release_respects_off_shift() {
        let conn = db::init_db(":memory:").unwrap();
        insert_driver(&conn, &driver("d1", "LIC-1")).unwrap();

        assert!(claim_driver(&conn, "d1", &now()).unwrap());
        set_driver_availability(&conn, "d1", false, None, &now()).unwrap();
        release_driver(&conn, "d1", &now()).unwrap();

        let d = get_driver(&conn, "d1").unwrap().unwrap();
        assert!(!d.available);
        assert!(!d.on_duty);
        assert!(next_available_driver_id(&conn).unwrap().is_none());

        set_driver_availability(&conn, "d1", true, None, &now()).unwrap();
        assert_eq!(next_available_driver_id(&conn).unwrap().as_deref(), Some("d1"));
    }

    #[test]
    fn test_missing_booking_is_none() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(get_booking_by_id(&conn, "nope").unwrap().is_none());
    }
}
