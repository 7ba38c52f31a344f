//! Host-facing telescope client.
//!
//! [`TelescopeClient`] is what the planetarium host talks to every update
//! cycle. [`DriverClient`] implements it on top of a [`DeviceSession`] and a
//! [`PositionTracker`]:
//!
//! ```text
//! host cycle --perform_communication--> PositionTracker::poll_if_due --> DeviceSession
//! host frame --j2000_position---------> PositionTracker::query_position
//! host goto  --goto--------------------> (J2000 -> mount equinox) --> DeviceSession::dispatch
//! DeviceSession --fault--> broadcast::Sender<ClientEvent> --> host
//! ```
//!
//! Everything the host receives is J2000. A JNow mount's readings are converted
//! on ingestion and go-to targets are converted on dispatch, each exactly once.

use crate::clock::Clock;
use crate::config::TelescopeConfig;
use crate::coordinates::{Equinox, Vec3};
use crate::driver::{ConnectionParams, DriverFactory};
use crate::navigator::Navigator;
use crate::session::{DeviceSession, SlewMode};
use crate::tracker::{PollOutcome, PositionTracker, POSITION_REFRESH_INTERVAL_MICROS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Notification raised by a client outside of a host call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// The driver reported an exception; the client is finished.
    Fault {
        /// Telescope name
        name: String,
        /// Formatted driver error
        message: String,
    },
}

/// Contract between the host and one telescope connection.
pub trait TelescopeClient {
    /// Display name of the telescope.
    fn name(&self) -> &str;

    /// False before a driver was opened and forever after a fault.
    fn is_initialized(&mut self) -> bool;

    /// Whether the driver currently reports a live link.
    fn is_connected(&mut self) -> bool;

    /// Current pointing direction in J2000, interpolated for `now` (µs).
    fn j2000_position(&self, now: i64) -> Vec3;

    /// Whether [`perform_communication`](Self::perform_communication) is worth calling.
    fn prepare_communication(&mut self) -> bool;

    /// Reconnect if needed and refresh the position when due.
    fn perform_communication(&mut self);

    /// Slew to a J2000 direction. Silently dropped if the mount can't.
    fn goto(&mut self, j2000_target: Vec3);

    /// Stream of fault events for this client.
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Telescope client backed by an automation driver.
pub struct DriverClient {
    session: DeviceSession,
    tracker: PositionTracker,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ClientEvent>,
}

impl DriverClient {
    /// Create a client and try to bring its driver on line.
    ///
    /// `params` is the connection parameter string. A client whose driver
    /// could not be opened is still returned; it reports itself as
    /// uninitialized.
    pub fn new(
        name: &str,
        params: &str,
        equinox: Equinox,
        factory: &dyn DriverFactory,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self::with_interval(
            name,
            params,
            equinox,
            POSITION_REFRESH_INTERVAL_MICROS,
            factory,
            navigator,
            clock,
            events,
        )
    }

    /// Build a client from a configuration entry.
    pub fn from_config(
        config: &TelescopeConfig,
        factory: &dyn DriverFactory,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self::with_interval(
            &config.name,
            &config.connection,
            config.equinox,
            config.poll_interval_micros(),
            factory,
            navigator,
            clock,
            events,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_interval(
        name: &str,
        params: &str,
        equinox: Equinox,
        interval_micros: i64,
        factory: &dyn DriverFactory,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        debug!("Creating telescope client: {} {}", name, params);
        let session = match ConnectionParams::parse(params) {
            Ok(params) => {
                DeviceSession::initialize(name, &params, equinox, factory, events.clone())
            }
            Err(e) => {
                debug!("Telescope '{}' not initialized: {}", name, e);
                DeviceSession::uninitialized(name, equinox, events.clone())
            }
        };
        let tracker = PositionTracker::new(
            interval_micros,
            clock.now_micros(),
            navigator.clone(),
            clock.clone(),
        );
        Self {
            session,
            tracker,
            navigator,
            clock,
            events,
        }
    }

    /// Equinox the mount is configured for.
    pub fn equinox(&self) -> Equinox {
        self.session.equinox()
    }

    /// Position sampling state.
    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Like [`TelescopeClient::perform_communication`], reporting what happened.
    pub fn poll(&mut self) -> Option<PollOutcome> {
        if !self.session.is_initialized() {
            return None;
        }
        let now = self.clock.now_micros();
        Some(self.tracker.poll_if_due(now, &mut self.session))
    }

    /// Like [`TelescopeClient::goto`], reporting how the slew was sent.
    pub fn goto_target(&mut self, j2000_target: Vec3) -> Option<SlewMode> {
        if !self.session.is_initialized() || !self.session.ensure_connected() {
            return None;
        }
        let target = match self.session.equinox() {
            Equinox::JNow => self.navigator.j2000_to_equinox(j2000_target),
            Equinox::J2000 => j2000_target,
        };
        self.session.dispatch(target)
    }
}

impl TelescopeClient for DriverClient {
    fn name(&self) -> &str {
        self.session.name()
    }

    fn is_initialized(&mut self) -> bool {
        self.session.is_initialized()
    }

    fn is_connected(&mut self) -> bool {
        self.session.is_connected()
    }

    fn j2000_position(&self, now: i64) -> Vec3 {
        self.tracker.query_position(now)
    }

    fn prepare_communication(&mut self) -> bool {
        self.session.is_initialized()
    }

    fn perform_communication(&mut self) {
        self.poll();
    }

    fn goto(&mut self, j2000_target: Vec3) {
        self.goto_target(j2000_target);
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
