//! Card reader interaction protocol.
//!
//! This crate implements the conversation between a host application and a
//! card reading peripheral: discovery, the connection lifecycle, and the
//! handshake every transaction walks before it is authorized. A simulated
//! reader reproduces the latencies and failure modes of real hardware on a
//! deterministic logical clock.
//!
//! # Components
//!
//! - [`timing`]: delayed, cancellable events on one logical clock
//! - [`discovery`]: searching for readers
//! - [`connection`]: initialize, reset and release
//! - [`negotiation`]: the per-transaction handshake
//! - [`response`]: decoding of reader attribute bags
//! - [`session`]: owns one of each and dispatches events to them
//! - [`driver`]: Tokio glue pacing a session against real time
//!
//! # Transaction Flow
//!
//! ```text
//! start_transaction
//!   ├─► on_reader_reset_requested      (configured reader only)
//!   ├─► on_transaction_info_requested
//!   ├─► WaitingForCard ─► SwipeDetected / CardDipped
//!   ├─► on_payer_email_requested
//!   └─► Authorizing ─► on_success | on_error
//! ```
//!
//! The host implements [`CardReaderHandler`] and answers each request with the
//! ticket it was handed:
//!
//! ```no_run
//! use cardlink_core::CurrencyCode;
//! use cardlink_hardware::negotiation::TransactionInfoCallback;
//! use cardlink_hardware::traits::CardReaderHandler;
//! use cardlink_hardware::{ReaderSession, Result};
//!
//! fn answer<H: CardReaderHandler>(
//!     session: &mut ReaderSession<H>,
//!     ticket: &TransactionInfoCallback,
//! ) -> Result<()> {
//!     session.use_transaction_info(ticket, 21.61, CurrencyCode::Usd, 1234)
//! }
//! ```
//!
//! # Error Handling
//!
//! Failures the host must hear about arrive as
//! [`ErrorRecord`](cardlink_core::ErrorRecord)s through
//! [`CardReaderHandler::on_error`]. Calls that break the protocol contract,
//! such as an answer for the wrong step, also return a [`ReaderError`] to the
//! caller.
//!
//! # Thread Safety
//!
//! A session is `Send` when its handler is, so it can move into a Tokio task.
//! It is not shared: one task owns it and applies events one at a time.

pub mod connection;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod event;
pub mod mock;
pub mod negotiation;
pub mod response;
pub mod session;
pub mod timing;
pub mod traits;

// Re-export commonly used types for convenience
pub use error::{ReaderError, Result};
pub use event::{ConnectFailure, ReaderEvent};
pub use negotiation::{EmailCallback, HandshakeStep, ResetCallback, TransactionInfoCallback};
pub use session::{ReaderSession, ReleaseCallback};
pub use traits::{CardReaderHandler, SearchListener};

// Re-export simulated backend types
pub use mock::{MockConfig, SessionConfig, SimulatedBackend};
