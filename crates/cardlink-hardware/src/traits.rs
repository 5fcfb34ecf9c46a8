//! Host-facing callback traits.
//!
//! A host drives a card reader session by implementing [`CardReaderHandler`].
//! The session calls the handler whenever the reader changes status, needs an
//! answer from the host, or resolves a transaction.
//!
//! # Answering requests
//!
//! Requests such as [`CardReaderHandler::on_transaction_info_requested`] hand
//! the host a ticket. The host keeps the ticket and answers through the
//! session once the callback has returned:
//!
//! ```no_run
//! use cardlink_core::{CardReaderStatus, CurrencyCode, ErrorRecord, PaymentInfo};
//! use cardlink_hardware::negotiation::{EmailCallback, ResetCallback, TransactionInfoCallback};
//! use cardlink_hardware::traits::CardReaderHandler;
//!
//! #[derive(Default)]
//! struct Register {
//!     info_ticket: Option<TransactionInfoCallback>,
//! }
//!
//! impl CardReaderHandler for Register {
//!     fn on_success(&mut self, info: PaymentInfo) {
//!         println!("approved: {}", info.payment_description);
//!     }
//!     fn on_error(&mut self, error: ErrorRecord) {
//!         println!("failed: {error}");
//!     }
//!     fn on_status_change(&mut self, status: CardReaderStatus) {
//!         println!("status: {status}");
//!     }
//!     fn on_reader_reset_requested(&mut self, _callback: ResetCallback) {}
//!     fn on_transaction_info_requested(&mut self, callback: TransactionInfoCallback) {
//!         self.info_ticket = Some(callback);
//!     }
//!     fn on_payer_email_requested(&mut self, _callback: EmailCallback) {}
//! }
//! ```
//!
//! # Thread Safety
//!
//! Both traits require `Send` so a session can move into a Tokio task.

use cardlink_core::{CardReaderStatus, ErrorRecord, PaymentInfo, PeripheralDescriptor};

use crate::negotiation::{EmailCallback, ResetCallback, TransactionInfoCallback};

/// Callbacks a host provides to a reader session.
///
/// Every started transaction ends in exactly one call to either
/// [`on_success`](Self::on_success) or [`on_error`](Self::on_error).
pub trait CardReaderHandler: Send {
    /// The transaction was authorized.
    fn on_success(&mut self, info: PaymentInfo);

    /// The transaction, or a reader operation outside a transaction, failed.
    fn on_error(&mut self, error: ErrorRecord);

    /// The reader changed status.
    fn on_status_change(&mut self, status: CardReaderStatus);

    /// The reader holds configuration from a previous transaction.
    ///
    /// Answer with [`crate::ReaderSession::reset_card_reader`].
    fn on_reader_reset_requested(&mut self, callback: ResetCallback);

    /// The reader needs the amount, currency and merchant account.
    ///
    /// Answer with [`crate::ReaderSession::use_transaction_info`].
    fn on_transaction_info_requested(&mut self, callback: TransactionInfoCallback);

    /// The reader asks for an optional payer email before authorization.
    ///
    /// Answer with [`crate::ReaderSession::insert_payer_email`].
    fn on_payer_email_requested(&mut self, callback: EmailCallback);

    /// Result of a battery query.
    fn on_battery_level(&mut self, _level: Result<u8, ErrorRecord>) {}

    /// Result of a calibration.
    fn on_calibration_complete(&mut self, _result: Result<(), ErrorRecord>) {}
}

/// Receives discovery results.
pub trait SearchListener: Send {
    fn on_device_discovered(&mut self, device: &PeripheralDescriptor);

    /// Discovery finished. Not called after the search is cancelled.
    fn on_discovery_complete(&mut self);
}
