use serde::{Deserialize, Serialize};

use super::{Booking, BookingStatus};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DashboardEvent {
    pub kind: String,
    pub booking_id: String,
    pub user_id: String,
    pub status: BookingStatus,
    pub driver_id: Option<String>,
    pub created_at: String,
}

impl DashboardEvent {
    pub fn for_booking(kind: &str, booking: &Booking) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            status: booking.status,
            driver_id: booking.driver_id.clone(),
            created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
