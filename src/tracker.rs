//! Position tracker: throttled polling and interpolated position queries.
//!
//! The host asks for the telescope position every frame, but the mount is
//! only read once per polling interval. Queries are answered by linear
//! interpolation between the two most recent samples, evaluated one interval
//! in the past so the estimate never runs ahead of the newest reading.

use crate::clock::Clock;
use crate::coordinates::{Equinox, Vec3};
use crate::navigator::Navigator;
use crate::session::DeviceSession;
use ringbuf::{HeapRb, Rb};
use std::sync::Arc;
use tracing::trace;

/// Default polling interval, also the interpolation lag.
pub const POSITION_REFRESH_INTERVAL_MICROS: i64 = 5_000_000;

const RETAINED_SAMPLES: usize = 2;

/// A J2000 direction read from the mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// Unit direction, J2000
    pub direction: Vec3,
    /// When the reading was captured on this side, µs
    pub client_micros: i64,
    /// When the mount was asked for the reading, µs
    pub server_micros: i64,
}

/// Result of a [`PositionTracker::poll_if_due`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The interval has not elapsed yet
    NotDue,
    /// The mount could not be connected
    Disconnected,
    /// The mount is parked; nothing was read
    Parked,
    /// The session faulted or went away during the poll
    Failed,
    /// A new sample was recorded
    Sampled,
}

/// Throttled position sampler for one mount.
pub struct PositionTracker {
    interval_micros: i64,
    next_poll_micros: i64,
    samples: HeapRb<PositionSample>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
}

impl PositionTracker {
    /// Tracker whose first poll is due one interval after `now`.
    pub fn new(
        interval_micros: i64,
        now: i64,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interval_micros,
            next_poll_micros: now.saturating_add(interval_micros),
            samples: HeapRb::new(RETAINED_SAMPLES),
            navigator,
            clock,
        }
    }

    /// Polling interval, also the interpolation lag.
    pub fn interval_micros(&self) -> i64 {
        self.interval_micros
    }

    /// When the next poll is due.
    pub fn next_poll_micros(&self) -> i64 {
        self.next_poll_micros
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    /// Read the mount if the polling interval has elapsed.
    ///
    /// The next poll is scheduled one interval after `now` whatever the
    /// outcome, so a parked or disconnected mount is retried at the normal
    /// rate rather than every cycle.
    pub fn poll_if_due(&mut self, now: i64, session: &mut DeviceSession) -> PollOutcome {
        if now < self.next_poll_micros {
            return PollOutcome::NotDue;
        }
        self.next_poll_micros = now.saturating_add(self.interval_micros);

        if !session.ensure_connected() {
            return PollOutcome::Disconnected;
        }
        match session.is_parked() {
            Some(false) => {}
            Some(true) => return PollOutcome::Parked,
            None => return PollOutcome::Failed,
        }

        let Some(coords) = session.read_position() else {
            return PollOutcome::Failed;
        };
        let direction = coords.to_direction();
        // coordinate-system detection is not attempted, the configured equinox is trusted
        let direction = match session.equinox() {
            Equinox::JNow => self.navigator.equinox_to_j2000(direction),
            Equinox::J2000 => direction,
        };

        self.record(PositionSample {
            direction,
            client_micros: self.clock.now_micros(),
            server_micros: now,
        });
        trace!("Telescope '{}' at {}", session.name(), coords);
        PollOutcome::Sampled
    }

    /// Store a sample, dropping the oldest beyond two.
    pub fn record(&mut self, sample: PositionSample) {
        self.samples.push_overwrite(sample);
    }

    /// Interpolated J2000 direction at `now - interval`.
    ///
    /// Zero vector until the first sample arrives. Outside the span of the two
    /// samples the nearest one is returned; nothing is extrapolated.
    pub fn query_position(&self, now: i64) -> Vec3 {
        let at = now.saturating_sub(self.interval_micros);
        let mut samples = self.samples.iter();
        match (samples.next(), samples.next()) {
            (None, _) => Vec3::zeros(),
            (Some(only), None) => only.direction,
            (Some(older), Some(newer)) => interpolate(older, newer, at),
        }
    }
}

fn interpolate(older: &PositionSample, newer: &PositionSample, at: i64) -> Vec3 {
    let span = newer.client_micros.saturating_sub(older.client_micros);
    if span <= 0 {
        return newer.direction;
    }
    let t = (at.saturating_sub(older.client_micros) as f64 / span as f64).clamp(0.0, 1.0);
    let blended = older.direction * (1.0 - t) + newer.direction * t;
    // antipodal samples blend to nothing
    blended.try_normalize(f64::EPSILON).unwrap_or(newer.direction)
}
