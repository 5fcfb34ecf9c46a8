//! Core constants for the card-reader interaction protocol.
//!
//! This module defines the timing, monetary and error-code constants shared by
//! every component of the cardlink workspace. Latencies describe the simulated
//! peripheral; a real transport replaces them with actual hardware events but
//! keeps the same ordering.
//!
//! # Timeline
//!
//! The simulated peripheral produces events on one logical clock:
//!
//! ```text
//! initialize ──200ms──► connected
//! search ─────500ms──► device found ──500ms──► discovery complete
//! release ───1000ms──► release done ─► disconnected
//! ```
//!
//! # Usage
//!
//! ```
//! use cardlink_core::constants::*;
//! use std::time::Duration;
//!
//! let connect = Duration::from_millis(READER_CONNECTION_TIME_MS);
//! let found = Duration::from_millis(READER_DISCOVERED_TIME_MS);
//! assert!(connect < found);
//! assert!(found < Duration::from_millis(DISCOVERY_COMPLETE_TIME_MS));
//! ```

// ============================================================================
// Peripheral Latencies
// ============================================================================

/// Time between `initialize` and the connected notification, in milliseconds.
///
/// Also used for the internal reader reset and for battery queries.
pub const READER_CONNECTION_TIME_MS: u64 = 200;

/// Time between the start of a search and the device-found event, in milliseconds.
pub const READER_DISCOVERED_TIME_MS: u64 = 500;

/// Time between the start of a search and the discovery-complete event, in milliseconds.
///
/// Always longer than [`READER_DISCOVERED_TIME_MS`] so found precedes complete.
pub const DISCOVERY_COMPLETE_TIME_MS: u64 = 1000;

/// Time between `release` and the disconnect notification, in milliseconds.
pub const READER_RELEASE_TIME_MS: u64 = 1000;

/// Time the simulated reader waits before a card is presented, in milliseconds.
pub const CARD_PRESENT_TIME_MS: u64 = 300;

/// Time the simulated authorization takes, in milliseconds.
pub const AUTHORIZATION_TIME_MS: u64 = 500;

// ============================================================================
// Monetary Values
// ============================================================================

/// Number of decimal places kept for transaction amounts.
pub const AMOUNT_DECIMAL_PLACES: u32 = 2;

/// Minor units per major currency unit (10^[`AMOUNT_DECIMAL_PLACES`]).
pub const AMOUNT_SCALE: i64 = 100;

// ============================================================================
// Battery
// ============================================================================

/// Lowest battery percentage a reader can report.
pub const MIN_BATTERY_LEVEL: u8 = 0;

/// Highest battery percentage a reader can report.
pub const MAX_BATTERY_LEVEL: u8 = 100;

// ============================================================================
// Error Codes
// ============================================================================

/// Numeric code used when a failure carries no better code.
///
/// External API payloads without an `error_code` field map to this value.
pub const UNKNOWN_ERROR_CODE: i64 = 10000;

/// Maximum number of transitions retained in a state machine history.
///
/// A full negotiation is about eight transitions, so this keeps a handful of
/// transactions for debugging without unbounded growth.
pub const MAX_HISTORY_SIZE: usize = 64;
