//! Equatorial coordinate helpers.
//!
//! Directions are unit vectors in an equatorial frame (x towards RA 0h,
//! z towards the north celestial pole). Drivers speak right ascension in hours
//! and declination in degrees; [`EquatorialCoords`] converts between the two.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Equinox of the coordinates a mount reports and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Equinox {
    /// Mean equinox of the current date.
    JNow,
    /// Fixed standard epoch J2000.0.
    #[default]
    J2000,
}

impl fmt::Display for Equinox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equinox::JNow => write!(f, "JNow"),
            Equinox::J2000 => write!(f, "J2000"),
        }
    }
}

/// Pointing direction in an equatorial frame.
pub type Vec3 = Vector3<f64>;

/// Converts spherical angles (longitude, latitude in radians) to a unit vector.
pub fn sphe_to_rect(lng: f64, lat: f64) -> Vec3 {
    let cos_lat = lat.cos();
    Vec3::new(cos_lat * lng.cos(), cos_lat * lng.sin(), lat.sin())
}

/// Converts a vector to spherical angles `(lng, lat)` in radians.
///
/// `lng` is in `(-PI, PI]`. The vector does not need to be normalized.
pub fn rect_to_sphe(v: &Vec3) -> (f64, f64) {
    let lng = v.y.atan2(v.x);
    let lat = v.z.atan2(v.x.hypot(v.y));
    (lng, lat)
}

/// Right ascension / declination pair in driver units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoords {
    /// Right ascension in hours, `[0, 24)`
    pub ra_hours: f64,
    /// Declination in degrees, `[-90, 90]`
    pub dec_degrees: f64,
}

impl EquatorialCoords {
    /// Coordinates from RA in hours and Dec in degrees.
    pub fn new(ra_hours: f64, dec_degrees: f64) -> Self {
        Self {
            ra_hours,
            dec_degrees,
        }
    }

    /// Right ascension and declination in radians.
    pub fn to_radians(&self) -> (f64, f64) {
        (self.ra_hours * (PI / 12.0), self.dec_degrees * (PI / 180.0))
    }

    /// Unit direction vector for these coordinates.
    pub fn to_direction(&self) -> Vec3 {
        let (ra, dec) = self.to_radians();
        sphe_to_rect(ra, dec)
    }

    /// Coordinates of a direction; the vector need not be normalized.
    pub fn from_direction(direction: &Vec3) -> Self {
        let (ra, dec) = rect_to_sphe(direction);
        let ra_hours = (ra * (12.0 / PI)).rem_euclid(24.0);
        // rem_euclid can round up to exactly 24.0 for tiny negative inputs
        let ra_hours = if ra_hours >= 24.0 { 0.0 } else { ra_hours };
        Self {
            ra_hours,
            dec_degrees: dec * (180.0 / PI),
        }
    }
}

impl fmt::Display for EquatorialCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA {:.4}h Dec {:+.4}°", self.ra_hours, self.dec_degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_reading_converts_to_radians() {
        let coords = EquatorialCoords::new(12.0, 45.0);
        let (ra, dec) = coords.to_radians();
        assert!((ra - PI).abs() < TOLERANCE);
        assert!((dec - FRAC_PI_4).abs() < TOLERANCE);

        let v = coords.to_direction();
        let half = FRAC_PI_4.cos();
        assert!((v.x + half).abs() < TOLERANCE);
        assert!(v.y.abs() < TOLERANCE);
        assert!((v.z - half).abs() < TOLERANCE);
    }

    #[test]
    fn test_direction_round_trip() {
        let directions = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.3, 0.4, -0.5),
            Vec3::new(-0.7, -0.1, 0.2),
            Vec3::new(0.001, 0.0, 0.9999),
        ];
        for raw in directions {
            let direction = raw.normalize();
            let coords = EquatorialCoords::from_direction(&direction);
            let back = coords.to_direction();
            assert!(
                (direction - back).norm() < TOLERANCE,
                "{:?} came back as {:?}",
                direction,
                back
            );
        }
    }

    #[test]
    fn test_right_ascension_is_normalized() {
        let coords = EquatorialCoords::from_direction(&sphe_to_rect(-PI / 2.0, 0.1));
        assert!((coords.ra_hours - 18.0).abs() < TOLERANCE);
        assert!((0.0..24.0).contains(&coords.ra_hours));
    }

    #[test]
    fn test_equinox_serde_names() {
        let jnow: Equinox = serde_json::from_str("\"jnow\"").unwrap();
        assert_eq!(jnow, Equinox::JNow);
        assert_eq!(serde_json::to_string(&Equinox::J2000).unwrap(), "\"j2000\"");
    }
}
