use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Location;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub license_number: String,
    pub phone: Option<String>,
    pub available: bool,
    /// Cleared when a dispatcher takes the driver off shift. A finished ride
    /// only returns the driver to the pool while this is set.
    pub on_duty: bool,
    pub location: Option<Location>,
    pub last_assigned_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
