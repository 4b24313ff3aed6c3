use serde::Serialize;

use crate::models::{Location, ServiceClass};

/// Longer than any great-circle trip, short enough that fares fit in an i64.
pub const MAX_DISTANCE_KM: f64 = 25_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rate {
    pub base_cents: i64,
    pub per_km_cents: i64,
}

/// Hard-coded fare table, one rate per service class.
#[derive(Debug, Clone)]
pub struct RateTable {
    standard: Rate,
    premium: Rate,
    xl: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FareEstimate {
    pub service_class: ServiceClass,
    pub distance_km: f64,
    pub base_cents: i64,
    pub distance_cents: i64,
    pub fare_cents: i64,
}

#[derive(Debug, PartialEq)]
pub enum PricingError {
    InvalidDistance(f64),
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::InvalidDistance(d) => {
                write!(
                    f,
                    "distance must be between 0 and {MAX_DISTANCE_KM} km, got {d}"
                )
            }
        }
    }
}

impl std::error::Error for PricingError {}

impl RateTable {
    pub fn standard() -> Self {
        Self {
            standard: Rate { base_cents: 250, per_km_cents: 120 },
            premium: Rate { base_cents: 500, per_km_cents: 200 },
            xl: Rate { base_cents: 400, per_km_cents: 160 },
        }
    }

    pub fn rate(&self, class: ServiceClass) -> Rate {
        match class {
            ServiceClass::Standard => self.standard,
            ServiceClass::Premium => self.premium,
            ServiceClass::Xl => self.xl,
        }
    }

    /// `fare = base + round(distance * per_km)`, in cents.
    pub fn estimate(&self, class: ServiceClass, distance_km: f64) -> Result<FareEstimate, PricingError> {
        if !distance_km.is_finite() || !(0.0..=MAX_DISTANCE_KM).contains(&distance_km) {
            return Err(PricingError::InvalidDistance(distance_km));
        }

        Ok(self.price(class, distance_km))
    }

    pub fn estimate_between(&self, class: ServiceClass, from: &Location, to: &Location) -> FareEstimate {
        self.price(class, from.distance_km(to))
    }

    /// Bookings carry free-text addresses. When both parse as coordinates the
    /// trip is priced by distance, otherwise only the base rate applies.
    pub fn estimate_addresses(&self, class: ServiceClass, pickup: &str, dropoff: &str) -> FareEstimate {
        match (Location::parse(pickup), Location::parse(dropoff)) {
            (Ok(from), Ok(to)) => self.estimate_between(class, &from, &to),
            _ => self.price(class, 0.0),
        }
    }

    fn price(&self, class: ServiceClass, distance_km: f64) -> FareEstimate {
        let rate = self.rate(class);
        let distance_cents = (distance_km * rate.per_km_cents as f64).round() as i64;

        FareEstimate {
            service_class: class,
            distance_km,
            base_cents: rate.base_cents,
            distance_cents,
            fare_cents: rate.base_cents + distance_cents,
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::standard()
    }
}
