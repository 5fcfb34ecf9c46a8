//! Reader session: one connection to one card reader.
//!
//! A [`ReaderSession`] owns a [`TimingEngine`] and one instance of every
//! protocol component. Every state change runs as one event popped from the
//! engine (or delivered by a transport), so no two transitions ever overlap.
//! Sessions share nothing; [`ReaderSession::initialize`] resets all nested
//! state.
//!
//! # Examples
//!
//! ```no_run
//! use cardlink_hardware::mock::{MockConfig, SessionConfig};
//! use cardlink_hardware::ReaderSession;
//! # use cardlink_hardware::traits::CardReaderHandler;
//! # fn run<H: CardReaderHandler>(handler: H) -> cardlink_hardware::Result<()> {
//! use std::time::Duration;
//!
//! let mut session = ReaderSession::new(handler, SessionConfig::default());
//! session.initialize(MockConfig::default())?;
//! session.advance(Duration::from_millis(200));
//! assert!(session.is_ready());
//!
//! session.start_transaction()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use cardlink_core::{
    CardReaderStatus, CurrencyCode, ErrorRecord, PeripheralDescriptor, TransactionId,
};
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionLifecycle, ConnectionState};
use crate::discovery::{DiscoverySession, SearchOptions};
use crate::error::{ReaderError, Result};
use crate::event::ReaderEvent;
use crate::mock::{MockConfig, SessionConfig, SimulatedBackend};
use crate::negotiation::{
    EmailCallback, HandshakeStep, NextAction, ResetCallback, TransactionInfoCallback,
    TransactionNegotiation,
};
use crate::response::{decode_battery, decode_calibration, decode_card_read};
use crate::timing::{TimerHandle, TimingEngine};
use crate::traits::{CardReaderHandler, SearchListener};

/// Runs once the reader has been released.
pub type ReleaseCallback = Box<dyn FnOnce() + Send>;

/// A connection to one card reader.
pub struct ReaderSession<H: CardReaderHandler> {
    handler: H,
    config: SessionConfig,
    backend: SimulatedBackend,
    engine: TimingEngine<ReaderEvent>,
    connection: ConnectionLifecycle,
    discovery: DiscoverySession,
    negotiation: Option<TransactionNegotiation>,
    selected: Option<PeripheralDescriptor>,
    on_release: Vec<ReleaseCallback>,
}

impl<H: CardReaderHandler> ReaderSession<H> {
    pub fn new(handler: H, config: SessionConfig) -> Self {
        Self {
            handler,
            config,
            backend: SimulatedBackend::default(),
            engine: TimingEngine::new(),
            connection: ConnectionLifecycle::new(),
            discovery: DiscoverySession::new(),
            negotiation: None,
            selected: None,
            on_release: Vec::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current logical time.
    pub fn now(&self) -> Duration {
        self.engine.now()
    }

    /// Due time of the next pending event.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.engine.next_deadline()
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.engine.pending()
    }

    pub fn status(&self) -> ConnectionState {
        self.connection.status()
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn connection(&self) -> &ConnectionLifecycle {
        &self.connection
    }

    pub fn discovery(&self) -> &DiscoverySession {
        &self.discovery
    }

    /// The latest transaction, resolved or not.
    pub fn negotiation(&self) -> Option<&TransactionNegotiation> {
        self.negotiation.as_ref()
    }

    /// Reader chosen with [`select_reader`](Self::select_reader).
    pub fn selected_reader(&self) -> Option<&PeripheralDescriptor> {
        self.selected.as_ref()
    }

    /// Connect to the reader with the given simulated behavior.
    ///
    /// Drops every pending event, the discovery session and the release
    /// callback. An unresolved transaction is failed with the not-connected
    /// error first.
    pub fn initialize(&mut self, mock: MockConfig) -> Result<()> {
        self.abort_negotiation(ErrorRecord::card_reader_not_connected());
        self.engine.clear();
        self.discovery.reset();
        self.negotiation = None;
        self.selected = None;
        self.on_release.clear();

        let options = self.config.connect_options(&mock);
        self.connection.initialize(&mut self.engine, &options)?;
        self.connection.set_configured(mock.previously_configured);
        info!(
            "Initializing reader (configured={}, suppress_connect={})",
            mock.previously_configured, options.suppress_connect
        );
        self.backend = SimulatedBackend::new(mock);
        Ok(())
    }

    /// Release the reader.
    ///
    /// After the release latency `on_done` runs, then the host is told the
    /// reader is no longer connected. An unresolved transaction is failed with
    /// the not-connected error. A disconnected reader can be released again.
    /// Releasing while a release is running joins it: every callback runs, in
    /// call order, before the single disconnect notification.
    ///
    /// # Errors
    /// Returns [`ReaderError::InvalidTransition`] if the reader was never
    /// initialized.
    pub fn release(&mut self, on_done: Option<ReleaseCallback>) -> Result<()> {
        self.connection
            .release(&mut self.engine, self.config.latencies.release())?;
        self.discovery.cancel(&mut self.engine);
        self.abort_negotiation(ErrorRecord::card_reader_not_connected());
        self.on_release.extend(on_done);
        Ok(())
    }

    /// Search for readers. A running search is restarted.
    pub fn search(&mut self, listener: Box<dyn SearchListener>, options: SearchOptions) {
        let devices = self.backend.devices();
        self.discovery.search(
            &mut self.engine,
            listener,
            options,
            &devices,
            self.config.latencies.discovery(),
        );
    }

    /// Stop the running search. Idempotent.
    pub fn cancel_search(&mut self) {
        self.discovery.cancel(&mut self.engine);
    }

    /// Choose a reader found by the latest search.
    ///
    /// # Errors
    /// Returns the invalid selection error for a reader that was not found.
    pub fn select_reader(&mut self, device: &PeripheralDescriptor) -> Result<()> {
        let device = self.discovery.select(device)?;
        info!("Selected reader {}", device);
        self.selected = Some(device);
        Ok(())
    }

    /// Start a transaction.
    ///
    /// # Errors
    /// Returns [`ReaderError::NegotiationInProgress`] while another
    /// transaction is unresolved and [`ReaderError::NotConnected`] unless the
    /// reader is connected and ready. Neither is reported to the handler.
    pub fn start_transaction(&mut self) -> Result<TransactionId> {
        if let Some(negotiation) = &self.negotiation
            && !negotiation.is_resolved()
        {
            return Err(ReaderError::NegotiationInProgress {
                transaction_id: negotiation.id(),
            });
        }
        if !self.connection.is_ready() {
            return Err(ReaderError::NotConnected);
        }

        self.handler.on_status_change(CardReaderStatus::CheckingReader);
        let (negotiation, action) = TransactionNegotiation::start(self.connection.is_configured());
        let id = negotiation.id();
        info!("Starting transaction {}", id);
        self.negotiation = Some(negotiation);
        self.apply(action);
        Ok(id)
    }

    /// Answer a reset request.
    pub fn reset_card_reader(&mut self, ticket: &ResetCallback, should_reset: bool) -> Result<()> {
        self.answer(ticket.transaction_id(), |negotiation, at| {
            negotiation.answer_reset(ticket, should_reset, at)
        })
    }

    /// Answer a transaction info request.
    ///
    /// Invalid values are not a protocol violation: the call succeeds and the
    /// transaction fails through the handler.
    pub fn use_transaction_info(
        &mut self,
        ticket: &TransactionInfoCallback,
        amount: f64,
        currency: CurrencyCode,
        account_id: i64,
    ) -> Result<()> {
        let supported = self.config.supported_currencies.clone();
        self.answer(ticket.transaction_id(), |negotiation, at| {
            negotiation.answer_transaction_info(ticket, amount, currency, account_id, &supported, at)
        })
    }

    /// Answer a payer email request.
    pub fn insert_payer_email(&mut self, ticket: &EmailCallback, email: Option<String>) -> Result<()> {
        self.answer(ticket.transaction_id(), |negotiation, at| {
            negotiation.answer_email(ticket, email, at)
        })
    }

    /// Query the battery level. The result arrives through
    /// [`CardReaderHandler::on_battery_level`].
    pub fn get_battery_level(&mut self) {
        if !self.connection.is_ready() {
            self.handler
                .on_battery_level(Err(ErrorRecord::card_reader_not_connected()));
            return;
        }
        debug!("Querying battery level");
        self.engine.schedule(
            self.config.latencies.connection(),
            ReaderEvent::BatteryResponse(self.backend.battery_response()),
        );
    }

    /// Calibrate the reader. The result arrives through
    /// [`CardReaderHandler::on_calibration_complete`].
    pub fn start_calibration(&mut self) {
        if !self.connection.is_ready() {
            self.handler
                .on_calibration_complete(Err(ErrorRecord::card_reader_not_connected()));
            return;
        }
        self.handler.on_status_change(CardReaderStatus::Calibrating);
        self.engine.schedule(
            Duration::ZERO,
            ReaderEvent::CalibrationComplete(self.backend.calibrate()),
        );
    }

    /// Advance the logical clock by `by`, applying every event that falls due.
    ///
    /// Events scheduled while applying an event fire in the same call if they
    /// fall due before the new time. Returns the number of events applied.
    pub fn advance(&mut self, by: Duration) -> usize {
        let until = self.engine.now() + by;
        let mut applied = 0;
        while let Some(event) = self.engine.pop_due(until) {
            self.deliver(event);
            applied += 1;
        }
        self.engine.advance_clock_to(until);
        applied
    }

    /// Apply one event.
    pub fn deliver(&mut self, event: ReaderEvent) {
        let name = event.name();
        trace!("Applying {} at {:?}", name, self.engine.now());
        if let Err(error) = self.dispatch(event) {
            warn!("Event {} rejected: {}", name, error);
        }
    }

    fn dispatch(&mut self, event: ReaderEvent) -> Result<()> {
        let at = self.engine.now();
        match event {
            ReaderEvent::Connected => {
                if self.connection.on_connected(at)? {
                    self.handler.on_status_change(CardReaderStatus::Connected);
                }
            }
            ReaderEvent::ConnectTimeout => {
                if let Some(error) = self.connection.on_connect_timeout(at)? {
                    self.handler.on_error(error);
                    self.handler.on_status_change(CardReaderStatus::NotConnected);
                }
            }
            ReaderEvent::ConnectFailed(failure) => {
                if let Some(error) = self.connection.on_connect_failed(&mut self.engine, failure)? {
                    if !self.abort_negotiation(error.clone()) {
                        self.handler.on_error(error);
                    }
                    self.handler.on_status_change(CardReaderStatus::NotConnected);
                }
            }
            ReaderEvent::ResetComplete => {
                if self.connection.on_reset_complete(at)? {
                    let action = match self.negotiation.as_mut() {
                        Some(negotiation) if negotiation.step() == HandshakeStep::ResettingReader => {
                            Some(negotiation.reset_finished(at)?)
                        }
                        _ => None,
                    };
                    if let Some(action) = action {
                        self.apply(action);
                    }
                }
            }
            ReaderEvent::ReleaseComplete => {
                if self.connection.on_release_complete(at)? {
                    for on_done in self.on_release.drain(..) {
                        on_done();
                    }
                    self.handler.on_status_change(CardReaderStatus::NotConnected);
                }
            }
            ReaderEvent::DeviceDiscovered(device) => self.discovery.on_device_discovered(device),
            ReaderEvent::DiscoveryComplete => self.discovery.on_discovery_complete(),
            ReaderEvent::CardRead(bag) => {
                let Some(negotiation) = self.negotiation.as_mut() else {
                    trace!("Ignoring card read outside a transaction");
                    return Ok(());
                };
                let read = decode_card_read(&bag);
                if let Ok(card) = &read {
                    self.handler
                        .on_status_change(card.entry_mode.presented_status());
                }
                let action = negotiation.card_read(read, at)?;
                self.apply(action);
            }
            ReaderEvent::AuthorizationComplete => {
                let Some(negotiation) = self.negotiation.as_mut() else {
                    trace!("Ignoring authorization outside a transaction");
                    return Ok(());
                };
                let decision = match (negotiation.info(), negotiation.card()) {
                    (Some(info), Some(card)) => {
                        self.backend.authorize(info, card, negotiation.email())
                    }
                    _ => Err(ErrorRecord::card_reader_unknown()),
                };
                let action = negotiation.authorized(decision, at)?;
                self.apply(action);
            }
            ReaderEvent::BatteryResponse(bag) => {
                if self.connection.status() != ConnectionState::Connected {
                    trace!("Ignoring battery response while {}", self.connection.status());
                    return Ok(());
                }
                self.handler.on_battery_level(decode_battery(&bag));
            }
            ReaderEvent::CalibrationComplete(result) => {
                self.handler.on_calibration_complete(decode_calibration(result));
            }
            ReaderEvent::HandshakeTimeout {
                transaction_id,
                step,
            } => {
                let current = self
                    .negotiation
                    .as_ref()
                    .is_some_and(|n| n.id() == transaction_id && n.step() == step);
                if current {
                    warn!("Transaction {} timed out at {}", transaction_id, step);
                    self.abort_negotiation(ErrorRecord::card_reader_timeout());
                }
            }
        }
        Ok(())
    }

    fn answer<F>(&mut self, transaction_id: TransactionId, answer: F) -> Result<()>
    where
        F: FnOnce(&mut TransactionNegotiation, Duration) -> Result<NextAction>,
    {
        let at = self.engine.now();
        let Some(negotiation) = self.negotiation.as_mut() else {
            warn!("Answer for transaction {} with none active", transaction_id);
            return Err(ReaderError::StaleCallback { transaction_id });
        };

        match answer(negotiation, at) {
            Ok(action) => {
                self.apply(action);
                Ok(())
            }
            Err(error @ ReaderError::StaleCallback { .. }) => Err(error),
            Err(error) => {
                self.abort_negotiation(error.to_record());
                Err(error)
            }
        }
    }

    /// Carry out what the negotiation asked for.
    fn apply(&mut self, action: NextAction) {
        self.clear_step_timer();
        match action {
            NextAction::RequestReset(ticket) => {
                self.arm_handshake_timeout();
                self.handler.on_reader_reset_requested(ticket);
            }
            NextAction::ResetReader => {
                self.handler
                    .on_status_change(CardReaderStatus::ConfiguringReader);
                let delay = self.config.latencies.connection();
                if let Err(error) = self.connection.begin_reset(&mut self.engine, delay) {
                    self.abort_negotiation(error.to_record());
                }
            }
            NextAction::RequestTransactionInfo(ticket) => {
                self.arm_handshake_timeout();
                self.handler.on_transaction_info_requested(ticket);
            }
            NextAction::AwaitCard => {
                self.connection.set_configured(true);
                self.handler.on_status_change(CardReaderStatus::WaitingForCard);
                let handle = self.engine.schedule(
                    self.config.latencies.card_present(),
                    ReaderEvent::CardRead(self.backend.card_response()),
                );
                self.set_step_timer(handle);
            }
            NextAction::RequestEmail(ticket) => {
                self.arm_handshake_timeout();
                self.handler.on_payer_email_requested(ticket);
            }
            NextAction::Authorize => {
                self.handler.on_status_change(CardReaderStatus::Authorizing);
                let handle = self.engine.schedule(
                    self.config.latencies.authorization(),
                    ReaderEvent::AuthorizationComplete,
                );
                self.set_step_timer(handle);
            }
            NextAction::Succeed(info) => {
                info!("Transaction approved: {}", info.payment_description);
                self.handler.on_success(*info);
            }
            NextAction::Fail(error) => {
                info!("Transaction failed: {}", error.description());
                self.handler.on_error(error);
            }
        }
    }

    /// Fail the current transaction if it is unresolved.
    ///
    /// Returns `true` if the handler was notified.
    fn abort_negotiation(&mut self, error: ErrorRecord) -> bool {
        let at = self.engine.now();
        let Some(negotiation) = self.negotiation.as_mut() else {
            return false;
        };
        match negotiation.fail(error, at) {
            Some(error) => {
                self.clear_step_timer();
                self.handler.on_error(error);
                true
            }
            None => false,
        }
    }

    fn arm_handshake_timeout(&mut self) {
        let Some(timeout) = self.config.handshake_timeout() else {
            return;
        };
        let Some(negotiation) = self.negotiation.as_ref() else {
            return;
        };
        let event = ReaderEvent::HandshakeTimeout {
            transaction_id: negotiation.id(),
            step: negotiation.step(),
        };
        let handle = self.engine.schedule(timeout, event);
        self.set_step_timer(handle);
    }

    fn set_step_timer(&mut self, handle: TimerHandle) {
        match self.negotiation.as_mut() {
            Some(negotiation) => {
                if let Some(previous) = negotiation.replace_timer(Some(handle)) {
                    self.engine.cancel(previous);
                }
            }
            None => {
                self.engine.cancel(handle);
            }
        }
    }

    fn clear_step_timer(&mut self) {
        if let Some(handle) = self.negotiation.as_mut().and_then(|n| n.take_timer()) {
            self.engine.cancel(handle);
        }
    }
}

impl<H: CardReaderHandler> std::fmt::Debug for ReaderSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSession")
            .field("now", &self.engine.now())
            .field("connection", &self.connection.status())
            .field("discovery", &self.discovery.state())
            .field("negotiation", &self.negotiation.as_ref().map(|n| n.step()))
            .field("pending_events", &self.engine.pending())
            .finish()
    }
}
