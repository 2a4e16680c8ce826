//! Geographic location types

use serde::{Deserialize, Serialize};

/// Scale of the fixed-point coordinates used on the wire
pub const COORDINATE_SCALE: f64 = 1e7;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic location with optional altitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
    /// Optional altitude in meters
    pub altitude: Option<f64>,
}

impl Location {
    /// Create a new location
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Attach an altitude in meters
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Build from wire fixed-point coordinates (degrees × 1e7)
    ///
    /// Returns `None` when either coordinate is absent or zero, which radios
    /// use to mean "no fix".
    pub fn from_fixed_point(latitude_i: Option<i32>, longitude_i: Option<i32>) -> Option<Self> {
        match (latitude_i, longitude_i) {
            (Some(lat), Some(lon)) if lat != 0 && lon != 0 => Some(Self::new(
                lat as f64 / COORDINATE_SCALE,
                lon as f64 / COORDINATE_SCALE,
            )),
            _ => None,
        }
    }

    /// Check that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another location in kilometers (Haversine formula)
    pub fn distance_km(&self, other: &Location) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Great-circle distance to another location in meters
    pub fn distance_to(&self, other: &Location) -> f64 {
        self.distance_km(other) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let sf = Location::new(37.7749, -122.4194);
        let la = Location::new(34.0522, -118.2437);

        let distance = sf.distance_to(&la);
        // Approximately 559 km
        assert!((distance - 559_000.0).abs() < 10_000.0);
    }

    #[test]
    fn test_tenth_degree_latitude() {
        let a = Location::new(40.0, -105.0);
        let b = Location::new(40.1, -105.0);
        let km = a.distance_km(&b);
        assert!(km > 11.0 && km < 11.2, "got {km}");
    }

    #[test]
    fn test_fixed_point_rejects_zero_and_absent() {
        assert!(Location::from_fixed_point(Some(0), Some(1)).is_none());
        assert!(Location::from_fixed_point(Some(1), None).is_none());

        let loc = Location::from_fixed_point(Some(401_234_567), Some(-1_051_234_567)).unwrap();
        assert!((loc.latitude - 40.1234567).abs() < 1e-9);
        assert!((loc.longitude + 105.1234567).abs() < 1e-9);
        assert!(loc.is_valid());
    }
}
