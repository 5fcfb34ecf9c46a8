//! Peripheral discovery.
//!
//! A [`DiscoverySession`] runs one search at a time:
//!
//! ```text
//! Idle ─► Searching ─► (DeviceFound)* ─► Completed
//!              │              │
//!              └──────────────┴──► Cancelled
//! ```
//!
//! Starting a search while one is running cancels the running one first.
//! Cancelling is idempotent and guarantees no further emissions for the
//! cancelled search.

use std::fmt;
use std::time::Duration;

use cardlink_core::{ErrorRecord, PeripheralDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::event::ReaderEvent;
use crate::timing::{TimerHandle, TimingEngine};
use crate::traits::SearchListener;

/// State of a discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    #[default]
    Idle,
    Searching,
    DeviceFound,
    Completed,
    Cancelled,
}

impl DiscoveryState {
    /// Whether a search is running.
    pub fn is_active(&self) -> bool {
        matches!(self, DiscoveryState::Searching | DiscoveryState::DeviceFound)
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            DiscoveryState::Idle => "Idle",
            DiscoveryState::Searching => "Searching",
            DiscoveryState::DeviceFound => "DeviceFound",
            DiscoveryState::Completed => "Completed",
            DiscoveryState::Cancelled => "Cancelled",
        };
        write!(f, "{}", state_str)
    }
}

/// Options for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Also report readers already bonded to the host.
    pub include_bonded: bool,

    /// Requested search duration. The simulated backend ignores it.
    pub duration: Option<Duration>,
}

/// Emission delays of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTiming {
    pub found_after: Duration,
    pub complete_after: Duration,
}

/// One discovery session.
#[derive(Default)]
pub struct DiscoverySession {
    state: DiscoveryState,
    found: Vec<PeripheralDescriptor>,
    pending: Vec<TimerHandle>,
    listener: Option<Box<dyn SearchListener>>,
    options: SearchOptions,
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Readers found by the latest search.
    pub fn found(&self) -> &[PeripheralDescriptor] {
        &self.found
    }

    /// Options of the latest search.
    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Start a search that reports `devices`.
    ///
    /// Each device is reported after `timing.found_after`, then completion
    /// after `timing.complete_after`. With no devices only the completion is
    /// reported.
    pub fn search(
        &mut self,
        engine: &mut TimingEngine<ReaderEvent>,
        listener: Box<dyn SearchListener>,
        options: SearchOptions,
        devices: &[PeripheralDescriptor],
        timing: DiscoveryTiming,
    ) {
        if self.state.is_active() {
            debug!("Search already running, restarting");
            self.cancel(engine);
        }

        self.found.clear();
        self.listener = Some(listener);
        self.options = options;
        self.state = DiscoveryState::Searching;

        for device in devices {
            let handle = engine.schedule(
                timing.found_after,
                ReaderEvent::DeviceDiscovered(device.clone()),
            );
            self.pending.push(handle);
        }
        let handle = engine.schedule(timing.complete_after, ReaderEvent::DiscoveryComplete);
        self.pending.push(handle);

        debug!(
            "Searching for readers (include_bonded={}, {} scheduled)",
            options.include_bonded,
            self.pending.len()
        );
    }

    /// Cancel the running search. Idempotent.
    pub fn cancel(&mut self, engine: &mut TimingEngine<ReaderEvent>) {
        for handle in self.pending.drain(..) {
            engine.cancel(handle);
        }
        if self.state.is_active() {
            debug!("Search cancelled");
            self.state = DiscoveryState::Cancelled;
        }
        self.listener = None;
    }

    /// Apply a found reader. Ignored unless a search is running.
    pub fn on_device_discovered(&mut self, device: PeripheralDescriptor) {
        if !self.state.is_active() {
            trace!("Ignoring discovery of {} outside a search", device);
            return;
        }
        self.state = DiscoveryState::DeviceFound;
        if let Some(listener) = self.listener.as_mut() {
            listener.on_device_discovered(&device);
        }
        self.found.push(device);
    }

    /// Apply search completion. Ignored unless a search is running.
    pub fn on_discovery_complete(&mut self) {
        if !self.state.is_active() {
            trace!("Ignoring discovery completion outside a search");
            return;
        }
        self.state = DiscoveryState::Completed;
        self.pending.clear();
        debug!("Search complete, {} reader(s) found", self.found.len());
        if let Some(mut listener) = self.listener.take() {
            listener.on_discovery_complete();
        }
    }

    /// Confirm that `device` was found by the latest search.
    ///
    /// # Errors
    /// Returns the invalid selection error for a reader that was not found.
    pub fn select(&self, device: &PeripheralDescriptor) -> Result<PeripheralDescriptor, ErrorRecord> {
        self.found
            .iter()
            .find(|found| *found == device)
            .cloned()
            .ok_or_else(ErrorRecord::invalid_card_reader_selection)
    }

    /// Forget everything. Pending timers belong to the caller's engine and
    /// must be cleared there.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("state", &self.state)
            .field("found", &self.found)
            .field("pending", &self.pending.len())
            .finish()
    }
}
