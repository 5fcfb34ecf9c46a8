//! Host side of the demo: forwards reader callbacks to the main loop.

use cardlink_core::{CardReaderStatus, ErrorRecord, PaymentInfo, PeripheralDescriptor};
use cardlink_hardware::{
    CardReaderHandler, EmailCallback, ResetCallback, SearchListener, TransactionInfoCallback,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// A callback received from the reader session.
#[derive(Debug)]
pub enum HostEvent {
    Status(CardReaderStatus),
    ResetRequested(ResetCallback),
    InfoRequested(TransactionInfoCallback),
    EmailRequested(EmailCallback),
    Battery(Result<u8, ErrorRecord>),
    Success(PaymentInfo),
    Error(ErrorRecord),
}

/// Handler sending every callback over a channel.
pub struct ChannelHandler {
    tx: UnboundedSender<HostEvent>,
}

impl ChannelHandler {
    pub fn new(tx: UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    // A closed channel means the main loop is gone; nothing is left to notify.
    fn send(&self, event: HostEvent) {
        let _ = self.tx.send(event);
    }
}

impl CardReaderHandler for ChannelHandler {
    fn on_success(&mut self, info: PaymentInfo) {
        self.send(HostEvent::Success(info));
    }

    fn on_error(&mut self, error: ErrorRecord) {
        self.send(HostEvent::Error(error));
    }

    fn on_status_change(&mut self, status: CardReaderStatus) {
        self.send(HostEvent::Status(status));
    }

    fn on_reader_reset_requested(&mut self, callback: ResetCallback) {
        self.send(HostEvent::ResetRequested(callback));
    }

    fn on_transaction_info_requested(&mut self, callback: TransactionInfoCallback) {
        self.send(HostEvent::InfoRequested(callback));
    }

    fn on_payer_email_requested(&mut self, callback: EmailCallback) {
        self.send(HostEvent::EmailRequested(callback));
    }

    fn on_battery_level(&mut self, level: Result<u8, ErrorRecord>) {
        self.send(HostEvent::Battery(level));
    }
}

/// Logs discovery results.
pub struct LoggingListener;

impl SearchListener for LoggingListener {
    fn on_device_discovered(&mut self, device: &PeripheralDescriptor) {
        info!("Found reader {}", device);
    }

    fn on_discovery_complete(&mut self) {
        info!("Discovery complete");
    }
}
