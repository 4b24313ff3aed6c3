use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Driver, Location};

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub name: String,
    #[serde(alias = "licenseNumber")]
    pub license_number: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityUpdate {
    pub available: bool,
    #[serde(default)]
    pub location: Option<Location>,
}

fn check_location(location: Option<Location>) -> Result<Option<Location>, AppError> {
    location
        .map(|l| Location::new(l.lat, l.lng))
        .transpose()
        .map_err(|e| AppError::validation(e.to_string()))
}

pub fn create_driver(conn: &Connection, now: NaiveDateTime, new: NewDriver) -> Result<Driver, AppError> {
    let name = new.name.trim();
    let license_number = new.license_number.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if license_number.is_empty() {
        return Err(AppError::validation("license_number is required"));
    }

    let driver = Driver {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        license_number: license_number.to_string(),
        phone: new.phone.filter(|p| !p.trim().is_empty()),
        available: true,
        on_duty: true,
        location: check_location(new.location)?,
        last_assigned_at: None,
        created_at: now,
        updated_at: now,
    };

    if !queries::insert_driver(conn, &driver)? {
        return Err(AppError::conflict("license_number already registered"));
    }

    tracing::info!(driver_id = %driver.id, "driver registered");
    Ok(driver)
}

pub fn set_availability(
    conn: &Connection,
    now: NaiveDateTime,
    id: &str,
    update: AvailabilityUpdate,
) -> Result<Driver, AppError> {
    let location = check_location(update.location)?;

    if update.available && queries::driver_has_active_booking(conn, id)? {
        return Err(AppError::conflict("driver is on an assigned booking"));
    }

    if !queries::set_driver_availability(conn, id, update.available, location, &now)? {
        return Err(AppError::not_found("driver"));
    }

    tracing::info!(driver_id = %id, available = update.available, "driver availability changed");
    queries::get_driver(conn, id)?.ok_or_else(|| AppError::not_found("driver"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn new_driver(license: &str) -> NewDriver {
        NewDriver {
            name: "Dana".to_string(),
            license_number: license.to_string(),
            phone: Some("+15552223333".to_string()),
            location: Some(Location { lat: 40.7, lng: -74.0 }),
        }
    }

    #[test]
    fn test_create_driver_starts_available() {
        let conn = db::init_db(":memory:").unwrap();
        let driver = create_driver(&conn, now(), new_driver("LIC-1")).unwrap();
        assert!(driver.available);

        let available = queries::list_available_drivers(&conn).unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].location, Some(Location { lat: 40.7, lng: -74.0 }));
    }

    #[test]
    fn test_duplicate_license_conflicts() {
        let conn = db::init_db(":memory:").unwrap();
        create_driver(&conn, now(), new_driver("LIC-1")).unwrap();
        assert!(matches!(
            create_driver(&conn, now(), new_driver("LIC-1")),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_bad_location_rejected() {
        let conn = db::init_db(":memory:").unwrap();
        let mut req = new_driver("LIC-1");
        req.location = Some(Location { lat: 123.0, lng: 0.0 });
        assert!(matches!(
            create_driver(&conn, now(), req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_toggle_availability() {
        let conn = db::init_db(":memory:").unwrap();
        let driver = create_driver(&conn, now(), new_driver("LIC-1")).unwrap();

        let off = set_availability(
            &conn,
            now(),
            &driver.id,
            AvailabilityUpdate { available: false, location: None },
        )
        .unwrap();
        assert!(!off.available);
        assert!(queries::list_available_drivers(&conn).unwrap().is_empty());

        assert!(matches!(
            set_availability(&conn, now(), "missing", AvailabilityUpdate { available: true, location: None }),
            Err(AppError::NotFound(_))
        ));
    }
}
