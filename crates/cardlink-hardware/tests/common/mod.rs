//! Common test utilities for integration tests.
//!
//! The [`Recorder`] handler stores every host callback in order so tests can
//! assert on complete sequences. It is cheap to clone: the session owns one
//! clone and the test keeps another.
//!
//! # Usage
//!
//! ```ignore
//! use crate::common;
//!
//! let (mut session, recorder) = common::connected_session(MockConfig::default());
//! session.start_transaction().unwrap();
//! let ticket = recorder.last_info_ticket().unwrap();
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cardlink_core::{CardReaderStatus, CurrencyCode, ErrorRecord, PaymentInfo, PeripheralDescriptor};
use cardlink_hardware::{
    CardReaderHandler, EmailCallback, MockConfig, ReaderSession, ReleaseCallback, ResetCallback,
    SearchListener, SessionConfig, TransactionInfoCallback,
};

/// One callback received by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Success(PaymentInfo),
    Error(ErrorRecord),
    Status(CardReaderStatus),
    ResetRequested(ResetCallback),
    InfoRequested(TransactionInfoCallback),
    EmailRequested(EmailCallback),
    Battery(Result<u8, ErrorRecord>),
    Calibration(Result<(), ErrorRecord>),
    Released,
    DeviceDiscovered(PeripheralDescriptor),
    DiscoveryComplete,
}

/// Handler recording every callback.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl Recorder {
    pub fn push(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn statuses(&self) -> Vec<CardReaderStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<PaymentInfo> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Success(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    /// Number of `on_success` plus `on_error` calls.
    pub fn resolutions(&self) -> usize {
        self.successes().len() + self.errors().len()
    }

    pub fn last_reset_ticket(&self) -> Option<ResetCallback> {
        self.events().into_iter().rev().find_map(|event| match event {
            HostEvent::ResetRequested(ticket) => Some(ticket),
            _ => None,
        })
    }

    pub fn last_info_ticket(&self) -> Option<TransactionInfoCallback> {
        self.events().into_iter().rev().find_map(|event| match event {
            HostEvent::InfoRequested(ticket) => Some(ticket),
            _ => None,
        })
    }

    pub fn last_email_ticket(&self) -> Option<EmailCallback> {
        self.events().into_iter().rev().find_map(|event| match event {
            HostEvent::EmailRequested(ticket) => Some(ticket),
            _ => None,
        })
    }

    /// Release callback that records [`HostEvent::Released`].
    pub fn release_callback(&self) -> ReleaseCallback {
        let recorder = self.clone();
        Box::new(move || recorder.push(HostEvent::Released))
    }

    /// Search listener recording into this recorder.
    pub fn listener(&self) -> Box<dyn SearchListener> {
        Box::new(RecordingListener(self.clone()))
    }
}

impl CardReaderHandler for Recorder {
    fn on_success(&mut self, info: PaymentInfo) {
        self.push(HostEvent::Success(info));
    }

    fn on_error(&mut self, error: ErrorRecord) {
        self.push(HostEvent::Error(error));
    }

    fn on_status_change(&mut self, status: CardReaderStatus) {
        self.push(HostEvent::Status(status));
    }

    fn on_reader_reset_requested(&mut self, callback: ResetCallback) {
        self.push(HostEvent::ResetRequested(callback));
    }

    fn on_transaction_info_requested(&mut self, callback: TransactionInfoCallback) {
        self.push(HostEvent::InfoRequested(callback));
    }

    fn on_payer_email_requested(&mut self, callback: EmailCallback) {
        self.push(HostEvent::EmailRequested(callback));
    }

    fn on_battery_level(&mut self, level: Result<u8, ErrorRecord>) {
        self.push(HostEvent::Battery(level));
    }

    fn on_calibration_complete(&mut self, result: Result<(), ErrorRecord>) {
        self.push(HostEvent::Calibration(result));
    }
}

struct RecordingListener(Recorder);

impl SearchListener for RecordingListener {
    fn on_device_discovered(&mut self, device: &PeripheralDescriptor) {
        self.0.push(HostEvent::DeviceDiscovered(device.clone()));
    }

    fn on_discovery_complete(&mut self) {
        self.0.push(HostEvent::DiscoveryComplete);
    }
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Initialized session; not yet connected.
pub fn session_with(config: SessionConfig, mock: MockConfig) -> (ReaderSession<Recorder>, Recorder) {
    let recorder = Recorder::default();
    let mut session = ReaderSession::new(recorder.clone(), config);
    session.initialize(mock).unwrap();
    (session, recorder)
}

/// Connected session with recorded events cleared.
pub fn connected_session(mock: MockConfig) -> (ReaderSession<Recorder>, Recorder) {
    connected_session_with(SessionConfig::default(), mock)
}

pub fn connected_session_with(
    config: SessionConfig,
    mock: MockConfig,
) -> (ReaderSession<Recorder>, Recorder) {
    let (mut session, recorder) = session_with(config, mock);
    session.advance(ms(200));
    assert!(session.is_ready(), "session should connect after 200ms");
    recorder.clear();
    (session, recorder)
}

/// Walk a started transaction from the info request to its resolution.
///
/// Expects the info request to be the latest request.
pub fn finish_transaction(
    session: &mut ReaderSession<Recorder>,
    recorder: &Recorder,
    amount: f64,
    email: Option<&str>,
) {
    let ticket = recorder.last_info_ticket().expect("info requested");
    session
        .use_transaction_info(&ticket, amount, CurrencyCode::Usd, 1234)
        .unwrap();
    session.advance(ms(300));
    if let Some(ticket) = recorder.last_email_ticket() {
        if ticket.transaction_id() == session.negotiation().unwrap().id() {
            session
                .insert_payer_email(&ticket, email.map(str::to_owned))
                .unwrap();
            session.advance(ms(500));
        }
    }
}

/// Start a transaction on an unconfigured reader and run it to resolution.
pub fn run_transaction(
    session: &mut ReaderSession<Recorder>,
    recorder: &Recorder,
    amount: f64,
    email: Option<&str>,
) {
    session.start_transaction().unwrap();
    finish_transaction(session, recorder, amount, email);
}
