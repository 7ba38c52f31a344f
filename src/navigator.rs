//! Equinox conversion service supplied by the host.
//!
//! The client never looks the navigator up globally; it is handed an
//! `Arc<dyn Navigator>` at construction.

use crate::clock::Clock;
use crate::coordinates::Vec3;
use nalgebra::{Rotation3, Vector3};
use std::sync::Arc;

/// Converts directions between the mean equinox of date and J2000.
pub trait Navigator: Send + Sync {
    /// Mean equinox of date to J2000.
    fn equinox_to_j2000(&self, direction: Vec3) -> Vec3;
    /// J2000 to mean equinox of date.
    fn j2000_to_equinox(&self, direction: Vec3) -> Vec3;
}

/// Navigator for hosts that treat the date equinox as J2000.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNavigator;

impl Navigator for IdentityNavigator {
    fn equinox_to_j2000(&self, direction: Vec3) -> Vec3 {
        direction
    }

    fn j2000_to_equinox(&self, direction: Vec3) -> Vec3 {
        direction
    }
}

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);
const JD_UNIX_EPOCH: f64 = 2_440_587.5;
const JD_J2000: f64 = 2_451_545.0;
const MICROS_PER_DAY: f64 = 86_400.0 * 1_000_000.0;

/// IAU 1976 precession between J2000 and the mean equinox of the clock's date.
pub struct PrecessionNavigator {
    clock: Arc<dyn Clock>,
}

impl PrecessionNavigator {
    /// Navigator precessing to the date given by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Rotation taking J2000 vectors to the mean equinox at `micros`.
    fn rotation_at(micros: i64) -> Rotation3<f64> {
        let jd = micros as f64 / MICROS_PER_DAY + JD_UNIX_EPOCH;
        let t = (jd - JD_J2000) / 36_525.0;
        let t2 = t * t;
        let t3 = t2 * t;

        let zeta = (2306.2181 * t + 0.30188 * t2 + 0.017998 * t3) * ARCSEC_TO_RAD;
        let z = (2306.2181 * t + 1.09468 * t2 + 0.018203 * t3) * ARCSEC_TO_RAD;
        let theta = (2004.3109 * t - 0.42665 * t2 - 0.041833 * t3) * ARCSEC_TO_RAD;

        // R3(-z) R2(theta) R3(-zeta) with frame rotations, as active rotations
        Rotation3::from_axis_angle(&Vector3::z_axis(), z)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -theta)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), zeta)
    }
}

impl Navigator for PrecessionNavigator {
    fn equinox_to_j2000(&self, direction: Vec3) -> Vec3 {
        Self::rotation_at(self.clock.now_micros()).inverse_transform_vector(&direction)
    }

    fn j2000_to_equinox(&self, direction: Vec3) -> Vec3 {
        Self::rotation_at(self.clock.now_micros()) * direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn navigator_at(year: i32) -> PrecessionNavigator {
        let time = Utc.with_ymd_and_hms(year, 1, 1, 12, 0, 0).unwrap();
        PrecessionNavigator::new(Arc::new(ManualClock::starting_at(time)))
    }

    #[test]
    fn test_identity_at_j2000() {
        let nav = navigator_at(2000);
        let v = Vec3::new(0.6, 0.0, 0.8);
        let moved = nav.j2000_to_equinox(v);
        assert!((v - moved).norm() < 1e-7);
    }

    #[test]
    fn test_pole_moves_by_theta() {
        let nav = navigator_at(2025);
        let pole = Vec3::new(0.0, 0.0, 1.0);
        let moved = nav.equinox_to_j2000(pole);
        // theta is ~2004.3"/century, 25 years ~ 501"
        let arcsec = pole.angle(&moved) / ARCSEC_TO_RAD;
        assert!((arcsec - 501.0).abs() < 2.0, "pole moved {arcsec}\"");
    }

    #[test]
    fn test_pole_matches_closed_form_column() {
        let nav = navigator_at(2050);
        let jd = nav.clock.now_micros() as f64 / MICROS_PER_DAY + JD_UNIX_EPOCH;
        let t = (jd - JD_J2000) / 36_525.0;
        let z = (2306.2181 * t + 1.09468 * t * t + 0.018203 * t * t * t) * ARCSEC_TO_RAD;
        let theta = (2004.3109 * t - 0.42665 * t * t - 0.041833 * t * t * t) * ARCSEC_TO_RAD;

        let moved = nav.j2000_to_equinox(Vec3::new(0.0, 0.0, 1.0));
        let expected = Vec3::new(-theta.sin() * z.cos(), -theta.sin() * z.sin(), theta.cos());
        assert!((moved - expected).norm() < 1e-12);
    }

    #[test]
    fn test_conversions_are_inverse() {
        let nav = navigator_at(2031);
        let v = Vec3::new(-0.2, 0.9, 0.3).normalize();
        let back = nav.equinox_to_j2000(nav.j2000_to_equinox(v));
        assert!((v - back).norm() < 1e-12);
        assert!((back.norm() - 1.0).abs() < 1e-12);
    }
}
