use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> anyhow::Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(anyhow::anyhow!("latitude out of range: {lat}"));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(anyhow::anyhow!("longitude out of range: {lng}"));
        }
        Ok(Self { lat, lng })
    }

    /// Parses `"lat,lng"`, whitespace allowed around either number.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| anyhow::anyhow!("expected \"lat,lng\", got: {s}"))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid latitude in: {s}"))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid longitude in: {s}"))?;
        Self::new(lat, lng)
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}
