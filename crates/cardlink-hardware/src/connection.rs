//! Connection lifecycle of a card reader.
//!
//! # States
//!
//! - `Uninitialized`: no `initialize` call yet
//! - `Initializing`: connecting, or re-arming after a reset
//! - `Connected`: link up; `ready` tells whether commands are accepted
//! - `Releasing`: release requested, waiting for the peripheral
//! - `Disconnected`: link down
//!
//! # Valid Transitions
//!
//! - any state → Initializing (initialize, reset)
//! - Initializing → Connected / Releasing / Disconnected
//! - Connected → Releasing / Disconnected
//! - Releasing → Disconnected
//! - Disconnected → Releasing
//!
//! # Examples
//!
//! ```
//! use cardlink_hardware::connection::{ConnectOptions, ConnectionLifecycle, ConnectionState};
//! use cardlink_hardware::timing::TimingEngine;
//! use std::time::Duration;
//!
//! let mut engine = TimingEngine::new();
//! let mut connection = ConnectionLifecycle::new();
//!
//! connection.initialize(&mut engine, &ConnectOptions::default()).unwrap();
//! assert_eq!(connection.status(), ConnectionState::Initializing);
//!
//! engine.advance(Duration::from_millis(200));
//! connection.on_connected(engine.now()).unwrap();
//! assert!(connection.is_ready());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use cardlink_core::{
    ErrorRecord,
    constants::{MAX_HISTORY_SIZE, READER_CONNECTION_TIME_MS},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ReaderError, Result};
use crate::event::{ConnectFailure, ReaderEvent};
use crate::timing::{TimerHandle, TimingEngine};

/// Connection state of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Initializing,
    Connected,
    Releasing,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Uninitialized => "Uninitialized",
            ConnectionState::Initializing => "Initializing",
            ConnectionState::Connected => "Connected",
            ConnectionState::Releasing => "Releasing",
            ConnectionState::Disconnected => "Disconnected",
        };
        write!(f, "{}", state_str)
    }
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_hardware::connection::ConnectionState;
    ///
    /// assert!(ConnectionState::Connected.can_transition_to(&ConnectionState::Releasing));
    /// assert!(ConnectionState::Disconnected.can_transition_to(&ConnectionState::Releasing));
    /// assert!(!ConnectionState::Uninitialized.can_transition_to(&ConnectionState::Releasing));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            // Initialize and reset are allowed from anywhere
            (_, ConnectionState::Initializing)
            // From Initializing
            | (ConnectionState::Initializing, ConnectionState::Connected | ConnectionState::Releasing | ConnectionState::Disconnected)
            // From Connected
            | (ConnectionState::Connected, ConnectionState::Releasing | ConnectionState::Disconnected)
            // From Releasing
            | (ConnectionState::Releasing, ConnectionState::Disconnected)
            // From Disconnected
            | (ConnectionState::Disconnected, ConnectionState::Releasing)
        )
    }
}

/// A recorded connection transition, stamped with logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: Duration,
}

/// How a connection attempt behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Delay before the connected event.
    pub connect_after: Duration,

    /// Never report the connection (simulated timeout).
    pub suppress_connect: bool,

    /// Fail a connection still initializing after this long.
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_after: Duration::from_millis(READER_CONNECTION_TIME_MS),
            suppress_connect: false,
            connect_timeout: None,
        }
    }
}

/// Connection state machine with readiness and configuration flags.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    ready: bool,
    configured: bool,
    resetting: bool,
    history: VecDeque<ConnectionTransition>,
    timers: Vec<TimerHandle>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            ready: false,
            configured: false,
            resetting: false,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            timers: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionState {
        self.state
    }

    /// Connected and accepting commands.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected && self.ready
    }

    /// The reader holds configuration from a previous transaction.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn set_configured(&mut self, configured: bool) {
        self.configured = configured;
    }

    /// An internal reset is running.
    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<ConnectionTransition> {
        &self.history
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    /// Returns [`ReaderError::InvalidTransition`] if the move is not allowed.
    pub fn transition_to(&mut self, to: ConnectionState, at: Duration) -> Result<ConnectionTransition> {
        if !self.state.can_transition_to(&to) {
            return Err(ReaderError::invalid_transition(self.state, to));
        }
        let transition = ConnectionTransition {
            from: self.state,
            to,
            at,
        };
        debug!("Connection {} -> {}", self.state, to);
        self.state = to;
        if to != ConnectionState::Connected {
            self.ready = false;
        }
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        Ok(transition)
    }

    /// Start connecting. Pending connection timers are cancelled.
    pub fn initialize(
        &mut self,
        engine: &mut TimingEngine<ReaderEvent>,
        options: &ConnectOptions,
    ) -> Result<()> {
        self.cancel_timers(engine);
        self.transition_to(ConnectionState::Initializing, engine.now())?;
        self.resetting = false;

        if options.suppress_connect {
            info!("Reader initializing, connection suppressed");
        } else {
            let handle = engine.schedule(options.connect_after, ReaderEvent::Connected);
            self.track(engine, handle);
        }
        if let Some(timeout) = options.connect_timeout {
            let handle = engine.schedule(timeout, ReaderEvent::ConnectTimeout);
            self.track(engine, handle);
        }
        Ok(())
    }

    /// Re-arm a connected reader.
    ///
    /// Re-enters `Initializing` with `ready = false`; a `ResetComplete` event
    /// follows after `delay`. Clears the configured flag.
    pub fn begin_reset(&mut self, engine: &mut TimingEngine<ReaderEvent>, delay: Duration) -> Result<()> {
        if !self.is_ready() {
            return Err(ReaderError::NotConnected);
        }
        self.transition_to(ConnectionState::Initializing, engine.now())?;
        self.resetting = true;
        self.configured = false;
        let handle = engine.schedule(delay, ReaderEvent::ResetComplete);
        self.track(engine, handle);
        Ok(())
    }

    /// Apply a connected event.
    ///
    /// Returns `false` when the event is stale (not initializing).
    pub fn on_connected(&mut self, at: Duration) -> Result<bool> {
        if self.state != ConnectionState::Initializing || self.resetting {
            return Ok(false);
        }
        self.transition_to(ConnectionState::Connected, at)?;
        self.ready = true;
        info!("Reader connected");
        Ok(true)
    }

    /// Apply a reset completion.
    pub fn on_reset_complete(&mut self, at: Duration) -> Result<bool> {
        if self.state != ConnectionState::Initializing || !self.resetting {
            return Ok(false);
        }
        self.transition_to(ConnectionState::Connected, at)?;
        self.ready = true;
        self.resetting = false;
        debug!("Reader reset complete");
        Ok(true)
    }

    /// Apply the connect timeout. Returns the error to report, if any.
    pub fn on_connect_timeout(&mut self, at: Duration) -> Result<Option<ErrorRecord>> {
        if self.state != ConnectionState::Initializing || self.resetting {
            return Ok(None);
        }
        warn!("Reader did not connect in time");
        self.transition_to(ConnectionState::Disconnected, at)?;
        Ok(Some(ErrorRecord::card_reader_timeout()))
    }

    /// Apply a transport failure. Returns the error to report, if any.
    pub fn on_connect_failed(
        &mut self,
        engine: &mut TimingEngine<ReaderEvent>,
        failure: ConnectFailure,
    ) -> Result<Option<ErrorRecord>> {
        if !matches!(
            self.state,
            ConnectionState::Initializing | ConnectionState::Connected
        ) {
            return Ok(None);
        }
        self.cancel_timers(engine);
        self.resetting = false;
        warn!("Reader link failed: {:?}", failure);
        self.transition_to(ConnectionState::Disconnected, engine.now())?;
        Ok(Some(Self::failure_record(failure)))
    }

    /// Start releasing. A `ReleaseComplete` event follows after `delay`.
    ///
    /// A disconnected reader can still be released. A release while one is
    /// already running keeps the pending completion.
    ///
    /// # Errors
    /// Returns [`ReaderError::InvalidTransition`] if the reader was never
    /// initialized.
    pub fn release(&mut self, engine: &mut TimingEngine<ReaderEvent>, delay: Duration) -> Result<()> {
        if self.state == ConnectionState::Releasing {
            debug!("Release already running");
            return Ok(());
        }
        if self.state == ConnectionState::Uninitialized {
            return Err(ReaderError::invalid_transition(self.state, ConnectionState::Releasing));
        }
        self.transition_to(ConnectionState::Releasing, engine.now())?;
        self.cancel_timers(engine);
        self.resetting = false;
        let handle = engine.schedule(delay, ReaderEvent::ReleaseComplete);
        self.track(engine, handle);
        info!("Releasing reader");
        Ok(())
    }

    /// Apply a release completion.
    pub fn on_release_complete(&mut self, at: Duration) -> Result<bool> {
        if self.state != ConnectionState::Releasing {
            return Ok(false);
        }
        self.transition_to(ConnectionState::Disconnected, at)?;
        self.timers.clear();
        info!("Reader released");
        Ok(true)
    }

    /// Record for a transport failure.
    pub fn failure_record(failure: ConnectFailure) -> ErrorRecord {
        match failure {
            ConnectFailure::Unreachable => ErrorRecord::card_reader_unable_to_connect(),
            ConnectFailure::Lost => ErrorRecord::card_reader_not_connected(),
        }
    }

    /// Timers this connection still holds.
    pub fn tracked_timers(&self) -> usize {
        self.timers.len()
    }

    // Fired handles are dropped so the list stays bounded.
    fn track(&mut self, engine: &TimingEngine<ReaderEvent>, handle: TimerHandle) {
        self.timers.retain(|h| engine.is_pending(*h));
        self.timers.push(handle);
    }

    fn cancel_timers(&mut self, engine: &mut TimingEngine<ReaderEvent>) {
        for handle in self.timers.drain(..) {
            engine.cancel(handle);
        }
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
