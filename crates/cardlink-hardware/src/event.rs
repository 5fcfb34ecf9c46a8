//! Events applied to a reader session.
//!
//! Every state change of a session happens in response to one
//! [`ReaderEvent`]. Events come from the session's own timing engine
//! (simulated latencies, timeouts) or from a transport delivering real
//! peripheral activity through [`crate::driver::pump`].

use cardlink_core::{PeripheralDescriptor, TransactionId};

use crate::negotiation::HandshakeStep;
use crate::response::{AttributeBag, CalibrationResult};

/// Why a transport lost or never established its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectFailure {
    /// The peripheral could not be reached.
    Unreachable,
    /// An established link dropped.
    Lost,
}

/// A single input to a reader session.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// The reader finished connecting.
    Connected,

    /// The optional connect timeout elapsed.
    ConnectTimeout,

    /// The transport failed.
    ConnectFailed(ConnectFailure),

    /// An internal reader reset finished.
    ResetComplete,

    /// A release finished.
    ReleaseComplete,

    /// Discovery found a reader.
    DeviceDiscovered(PeripheralDescriptor),

    /// Discovery finished.
    DiscoveryComplete,

    /// The reader answered a card read.
    CardRead(AttributeBag),

    /// Authorization of the current transaction finished.
    AuthorizationComplete,

    /// The reader answered a battery query.
    BatteryResponse(AttributeBag),

    /// Calibration finished.
    CalibrationComplete(CalibrationResult),

    /// The host did not answer a handshake step in time.
    HandshakeTimeout {
        transaction_id: TransactionId,
        step: HandshakeStep,
    },
}

impl ReaderEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReaderEvent::Connected => "connected",
            ReaderEvent::ConnectTimeout => "connect_timeout",
            ReaderEvent::ConnectFailed(_) => "connect_failed",
            ReaderEvent::ResetComplete => "reset_complete",
            ReaderEvent::ReleaseComplete => "release_complete",
            ReaderEvent::DeviceDiscovered(_) => "device_discovered",
            ReaderEvent::DiscoveryComplete => "discovery_complete",
            ReaderEvent::CardRead(_) => "card_read",
            ReaderEvent::AuthorizationComplete => "authorization_complete",
            ReaderEvent::BatteryResponse(_) => "battery_response",
            ReaderEvent::CalibrationComplete(_) => "calibration_complete",
            ReaderEvent::HandshakeTimeout { .. } => "handshake_timeout",
        }
    }
}
