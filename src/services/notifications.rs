use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};

use crate::models::{Booking, DashboardEvent, Driver};
use crate::services::messaging::MessagingProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Created,
    Confirmed,
    Assigned,
    Cancelled,
    Completed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Created => "booking_created",
            NotificationKind::Confirmed => "booking_confirmed",
            NotificationKind::Assigned => "booking_assigned",
            NotificationKind::Cancelled => "booking_cancelled",
            NotificationKind::Completed => "booking_completed",
        }
    }
}

/// Fans booking state changes out to the dashboard stream and to SMS.
///
/// Delivery is best effort. Sends run detached from the request that
/// triggered them, at most `concurrency` at a time, and a failed send is
/// logged and dropped.
pub struct Notifier {
    provider: Arc<dyn MessagingProvider>,
    dashboard_tx: broadcast::Sender<DashboardEvent>,
    permits: Arc<Semaphore>,
    dispatch_phone: Option<String>,
}

impl Notifier {
    pub fn new(
        provider: Arc<dyn MessagingProvider>,
        concurrency: usize,
        dispatch_phone: Option<String>,
    ) -> Self {
        let (dashboard_tx, _) = broadcast::channel(256);
        Self {
            provider,
            dashboard_tx,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            dispatch_phone: dispatch_phone.filter(|p| !p.is_empty()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.dashboard_tx.subscribe()
    }

    pub fn booking_event(
        &self,
        kind: NotificationKind,
        booking: &Booking,
        rider_phone: Option<&str>,
        driver: Option<&Driver>,
    ) {
        // No subscribers is fine
        let _ = self
            .dashboard_tx
            .send(DashboardEvent::for_booking(kind.as_str(), booking));

        if let Some(phone) = rider_phone.filter(|p| !p.is_empty()) {
            self.send_detached(phone, rider_message(kind, booking, driver), &booking.id);
        }

        if kind == NotificationKind::Assigned {
            if let Some(phone) = driver.and_then(|d| d.phone.as_deref()) {
                self.send_detached(phone, driver_message(booking), &booking.id);
            }
        }

        if let Some(phone) = self.dispatch_phone.as_deref() {
            let body = format!("[{}] booking {} is now {}", kind.as_str(), booking.id, booking.status);
            self.send_detached(phone, body, &booking.id);
        }
    }

    fn send_detached(&self, to: &str, body: String, booking_id: &str) {
        let provider = Arc::clone(&self.provider);
        let permits = Arc::clone(&self.permits);
        let to = to.to_string();
        let booking_id = booking_id.to_string();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match provider.send_message(&to, &body).await {
                Ok(()) => tracing::debug!(booking_id = %booking_id, to = %to, "notification sent"),
                Err(e) => {
                    tracing::warn!(error = %e, booking_id = %booking_id, to = %to, "notification dropped")
                }
            }
        });
    }
}

fn format_pickup(booking: &Booking) -> String {
    booking.start_time.format("%b %-d at %H:%M").to_string()
}

fn rider_message(kind: NotificationKind, booking: &Booking, driver: Option<&Driver>) -> String {
    match kind {
        NotificationKind::Created => format!(
            "Booking received: {} ride from {} on {}. Estimated fare ${:.2}.",
            booking.resource_id,
            booking.pickup_address,
            format_pickup(booking),
            booking.fare_cents as f64 / 100.0
        ),
        NotificationKind::Confirmed => {
            format!("Your ride on {} is confirmed.", format_pickup(booking))
        }
        NotificationKind::Assigned => match driver {
            Some(d) => format!("{} will pick you up on {}.", d.name, format_pickup(booking)),
            None => format!("A driver has been assigned for {}.", format_pickup(booking)),
        },
        NotificationKind::Cancelled => {
            format!("Your ride on {} has been cancelled.", format_pickup(booking))
        }
        NotificationKind::Completed => format!(
            "Thanks for riding with us. Fare: ${:.2}.",
            booking.fare_cents as f64 / 100.0
        ),
    }
}

fn driver_message(booking: &Booking) -> String {
    format!(
        "New pickup {}: {} -> {}.",
        format_pickup(booking),
        booking.pickup_address,
        booking.dropoff_address
    )
}
