//! Integration tests for end-to-end reader sessions.
//!
//! Every test drives a [`ReaderSession`] on its logical clock and asserts on
//! the exact sequence of host callbacks:
//! 1. Connection lifecycle: initialize, timeouts, release
//! 2. Transaction handshake: reset, info, card, email, resolution
//! 3. Protocol violations: out-of-order, repeated and stale answers
//! 4. Out-of-band queries: battery, calibration, discovery

mod common;

use cardlink_core::{CardReaderStatus, CurrencyCode, EntryMode, ErrorCode, ErrorRecord};
use cardlink_hardware::connection::ConnectionState;
use cardlink_hardware::discovery::{DiscoveryState, SearchOptions};
use cardlink_hardware::mock::Latencies;
use cardlink_hardware::{
    ConnectFailure, HandshakeStep, MockConfig, ReaderError, ReaderEvent, ReaderSession,
    SessionConfig, SimulatedBackend,
};
use common::{HostEvent, Recorder, connected_session, connected_session_with, ms, session_with};
use rstest::rstest;

// ============================================================================
// Test Data Constants
// ============================================================================

mod test_data {
    /// Amount the simulated issuer approves
    pub const APPROVED: f64 = 21.61;

    /// Amount the simulated issuer declines
    pub const DECLINED: f64 = 20.61;

    /// Merchant account
    pub const ACCOUNT_ID: i64 = 1234;

    /// Payer email
    pub const EMAIL: &str = "payer@example.com";
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

#[test]
fn test_initialize_connects_after_latency() {
    let (mut session, recorder) = session_with(SessionConfig::default(), MockConfig::default());

    session.advance(ms(199));
    assert!(!session.is_ready());
    assert!(recorder.events().is_empty());

    session.advance(ms(1));
    assert!(session.is_ready());
    assert_eq!(recorder.statuses(), vec![CardReaderStatus::Connected]);
}

#[test]
fn test_initialize_with_timeout_flag_never_connects() {
    let mock = MockConfig::default().with_card_read_timeout(true);
    let (mut session, recorder) = session_with(SessionConfig::default(), mock);

    session.advance(ms(60_000));

    assert_eq!(session.status(), ConnectionState::Initializing);
    assert!(!session.is_ready());
    assert!(recorder.events().is_empty());
}

#[test]
fn test_connect_timeout_reports_error() {
    let config = SessionConfig::default().with_connect_timeout(ms(5_000));
    let mock = MockConfig::default().with_card_read_timeout(true);
    let (mut session, recorder) = session_with(config, mock);

    session.advance(ms(4_999));
    assert!(recorder.events().is_empty());

    session.advance(ms(1));
    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::Error(ErrorRecord::card_reader_timeout()),
            HostEvent::Status(CardReaderStatus::NotConnected),
        ]
    );
    assert_eq!(session.status(), ConnectionState::Disconnected);
}

#[test]
fn test_connect_timeout_ignored_once_connected() {
    let config = SessionConfig::default().with_connect_timeout(ms(5_000));
    let (mut session, recorder) = connected_session_with(config, MockConfig::default());

    session.advance(ms(10_000));

    assert!(session.is_ready());
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_release_runs_callback_before_disconnect() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.release(Some(recorder.release_callback())).unwrap();
    assert_eq!(session.status(), ConnectionState::Releasing);

    session.advance(ms(999));
    assert!(recorder.events().is_empty());

    session.advance(ms(1));
    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::Released,
            HostEvent::Status(CardReaderStatus::NotConnected),
        ]
    );
    assert_eq!(session.status(), ConnectionState::Disconnected);
}

#[test]
fn test_release_without_callback() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.release(None).unwrap();
    session.advance(ms(1_000));

    assert_eq!(recorder.statuses(), vec![CardReaderStatus::NotConnected]);
}

#[test]
fn test_release_while_releasing_runs_every_callback() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.release(Some(recorder.release_callback())).unwrap();
    session.advance(ms(500));

    session.release(Some(recorder.release_callback())).unwrap();
    session.advance(ms(500));

    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::Released,
            HostEvent::Released,
            HostEvent::Status(CardReaderStatus::NotConnected),
        ]
    );
    session.advance(ms(5_000));
    assert_eq!(recorder.statuses(), vec![CardReaderStatus::NotConnected]);
}

#[test]
fn test_release_after_connect_timeout() {
    let config = SessionConfig::default().with_connect_timeout(ms(500));
    let mock = MockConfig::default().with_card_read_timeout(true);
    let (mut session, recorder) = session_with(config, mock);
    session.advance(ms(600));
    assert_eq!(session.status(), ConnectionState::Disconnected);
    recorder.clear();

    session.release(Some(recorder.release_callback())).unwrap();
    session.advance(ms(1_000));

    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::Released,
            HostEvent::Status(CardReaderStatus::NotConnected),
        ]
    );
    assert_eq!(session.status(), ConnectionState::Disconnected);
}

#[test]
fn test_release_requires_initialize() {
    let mut session = ReaderSession::new(Recorder::default(), SessionConfig::default());

    let error = session.release(None).unwrap_err();
    assert!(matches!(error, ReaderError::InvalidTransition { .. }));
}

#[test]
fn test_release_fails_open_transaction() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();

    session.release(Some(recorder.release_callback())).unwrap();
    assert_eq!(
        recorder.errors(),
        vec![ErrorRecord::card_reader_not_connected()]
    );

    session.advance(ms(5_000));
    assert_eq!(recorder.resolutions(), 1);
    assert!(recorder.events().contains(&HostEvent::Released));
}

#[test]
fn test_reinitialize_resets_nested_state() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();

    session.initialize(MockConfig::default()).unwrap();

    assert!(session.negotiation().is_none());
    assert_eq!(session.discovery().state(), DiscoveryState::Idle);
    assert_eq!(session.status(), ConnectionState::Initializing);
    assert_eq!(recorder.errors(), vec![ErrorRecord::card_reader_not_connected()]);

    // Only the new connection event is pending
    assert_eq!(session.pending_events(), 1);
    session.advance(ms(2_000));
    assert!(session.is_ready());
    assert!(!recorder.events().contains(&HostEvent::DiscoveryComplete));

    let error = session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap_err();
    assert!(matches!(error, ReaderError::StaleCallback { .. }));
}

#[test]
fn test_transport_failure_fails_transaction_once() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();

    session.deliver(ReaderEvent::ConnectFailed(ConnectFailure::Unreachable));

    assert_eq!(
        recorder.errors(),
        vec![ErrorRecord::card_reader_unable_to_connect()]
    );
    assert_eq!(session.status(), ConnectionState::Disconnected);
    assert_eq!(
        recorder.statuses().last(),
        Some(&CardReaderStatus::NotConnected)
    );
}

#[test]
fn test_lost_link_without_transaction() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.deliver(ReaderEvent::ConnectFailed(ConnectFailure::Lost));

    assert_eq!(recorder.errors(), vec![ErrorRecord::card_reader_not_connected()]);
}

// ============================================================================
// Transaction Handshake
// ============================================================================

#[test]
fn test_complete_swipe_transaction() {
    use test_data::*;
    let (mut session, recorder) = connected_session(MockConfig::default());

    let id = session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();
    assert_eq!(ticket.transaction_id(), id);

    session
        .use_transaction_info(&ticket, APPROVED, CurrencyCode::Usd, ACCOUNT_ID)
        .unwrap();
    session.advance(ms(300));
    let email = recorder.last_email_ticket().unwrap();
    session
        .insert_payer_email(&email, Some(EMAIL.to_owned()))
        .unwrap();
    session.advance(ms(500));

    assert_eq!(
        recorder.statuses(),
        vec![
            CardReaderStatus::CheckingReader,
            CardReaderStatus::WaitingForCard,
            CardReaderStatus::SwipeDetected,
            CardReaderStatus::Authorizing,
        ]
    );
    let successes = recorder.successes();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].amount.cents(), 2161);
    assert_eq!(successes[0].currency, CurrencyCode::Usd);
    assert_eq!(successes[0].email.as_deref(), Some(EMAIL));
    assert_eq!(successes[0].entry_mode, EntryMode::Swipe);
    assert_eq!(successes[0].payment_description, "Visa xxxx1111");
    assert!(recorder.errors().is_empty());
    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::Resolved
    );
}

#[test]
fn test_dip_transaction_reports_card_dipped() {
    let mock = MockConfig::default().with_entry_mode(EntryMode::Dip);
    let (mut session, recorder) = connected_session(mock);

    common::run_transaction(&mut session, &recorder, test_data::APPROVED, None);

    assert!(recorder.statuses().contains(&CardReaderStatus::CardDipped));
    assert_eq!(recorder.successes()[0].entry_mode, EntryMode::Dip);
    assert_eq!(recorder.successes()[0].email, None);
}

#[test]
fn test_nothing_happens_before_card_latency() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();
    session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap();

    session.advance(ms(299));

    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::AwaitingCard
    );
    assert!(recorder.last_email_ticket().is_none());
}

#[rstest]
#[case(20.61)]
#[case(120.61)]
#[case(23.61)]
#[case(123.61)]
fn test_declined_amounts(#[case] amount: f64) {
    let (mut session, recorder) = connected_session(MockConfig::default());

    common::run_transaction(&mut session, &recorder, amount, None);

    assert_eq!(recorder.errors(), vec![ErrorRecord::card_declined_by_issuer()]);
    assert!(recorder.successes().is_empty());
}

#[rstest]
#[case(21.61, 2161)]
#[case(121.61, 12161)]
#[case(22.61, 2261)]
#[case(122.61, 12261)]
fn test_approved_amounts(#[case] amount: f64, #[case] cents: i64) {
    let (mut session, recorder) = connected_session(MockConfig::default());

    common::run_transaction(&mut session, &recorder, amount, None);

    assert_eq!(recorder.successes()[0].amount.cents(), cents);
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_amount_rounded_to_cents() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    common::run_transaction(&mut session, &recorder, 10.999, None);

    assert_eq!(recorder.successes()[0].amount.cents(), 1100);
}

#[rstest]
#[case(0.0, CurrencyCode::Usd, 1234, ErrorCode::InvalidTransactionAmount)]
#[case(-5.0, CurrencyCode::Usd, 1234, ErrorCode::InvalidTransactionAmount)]
#[case(10.0, CurrencyCode::Gbp, 1234, ErrorCode::InvalidTransactionCurrencyCode)]
#[case(10.0, CurrencyCode::Usd, 0, ErrorCode::InvalidTransactionAccountId)]
#[case(10.0, CurrencyCode::Usd, -1, ErrorCode::InvalidTransactionAccountId)]
fn test_invalid_transaction_info(
    #[case] amount: f64,
    #[case] currency: CurrencyCode,
    #[case] account_id: i64,
    #[case] code: ErrorCode,
) {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();

    session
        .use_transaction_info(&ticket, amount, currency, account_id)
        .unwrap();

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_code(), Some(code));
    assert!(!recorder.statuses().contains(&CardReaderStatus::WaitingForCard));

    session.advance(ms(5_000));
    assert_eq!(recorder.resolutions(), 1);
}

#[test]
fn test_configured_currencies_accepted() {
    let config = SessionConfig::default()
        .with_supported_currencies(vec![CurrencyCode::Usd, CurrencyCode::Cad]);
    let (mut session, recorder) = connected_session_with(config, MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();

    session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Cad, 1)
        .unwrap();
    session.advance(ms(300));
    let email = recorder.last_email_ticket().unwrap();
    session.insert_payer_email(&email, None).unwrap();
    session.advance(ms(500));

    assert_eq!(recorder.successes()[0].currency, CurrencyCode::Cad);
}

#[test]
fn test_card_read_failure() {
    let mock = MockConfig::default().with_card_read_failure(true);
    let (mut session, recorder) = connected_session(mock);

    common::run_transaction(&mut session, &recorder, test_data::APPROVED, None);

    assert_eq!(recorder.errors(), vec![ErrorRecord::card_reader_general()]);
    assert!(recorder.last_email_ticket().is_none());
    assert!(!recorder.statuses().contains(&CardReaderStatus::SwipeDetected));
}

#[rstest]
#[case(MockConfig::default().with_card_tokenization_failure(true), ErrorCode::PaymentMethodCannotBeTokenized)]
#[case(MockConfig::default().with_emv_auth_failure(true), ErrorCode::EmvTransactionError)]
fn test_authorization_failures(#[case] mock: MockConfig, #[case] code: ErrorCode) {
    let (mut session, recorder) = connected_session(mock);

    common::run_transaction(&mut session, &recorder, test_data::APPROVED, None);

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_code(), Some(code));
    assert!(recorder.successes().is_empty());
}

#[test]
fn test_second_transaction_requests_reset() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    common::run_transaction(&mut session, &recorder, test_data::APPROVED, None);
    assert!(session.connection().is_configured());
    recorder.clear();

    session.start_transaction().unwrap();

    assert!(recorder.last_reset_ticket().is_some());
    assert!(recorder.last_info_ticket().is_none());
}

#[test]
fn test_previously_configured_reader_requests_reset() {
    let mock = MockConfig::default().with_previously_configured(true);
    let (mut session, recorder) = connected_session(mock);

    let id = session.start_transaction().unwrap();

    assert_eq!(recorder.last_reset_ticket().unwrap().transaction_id(), id);
}

#[test]
fn test_reset_accepted_reconfigures_reader() {
    let mock = MockConfig::default().with_previously_configured(true);
    let (mut session, recorder) = connected_session(mock);
    session.start_transaction().unwrap();
    let ticket = recorder.last_reset_ticket().unwrap();

    session.reset_card_reader(&ticket, true).unwrap();

    assert_eq!(
        recorder.statuses().last(),
        Some(&CardReaderStatus::ConfiguringReader)
    );
    assert!(!session.is_ready());
    assert!(!session.connection().is_configured());
    assert!(recorder.last_info_ticket().is_none());

    session.advance(ms(200));
    assert!(session.is_ready());
    assert!(recorder.last_info_ticket().is_some());

    common::finish_transaction(&mut session, &recorder, test_data::APPROVED, None);
    assert_eq!(recorder.successes().len(), 1);
}

#[test]
fn test_reset_declined_continues_immediately() {
    let mock = MockConfig::default().with_previously_configured(true);
    let (mut session, recorder) = connected_session(mock);
    session.start_transaction().unwrap();
    let ticket = recorder.last_reset_ticket().unwrap();

    session.reset_card_reader(&ticket, false).unwrap();

    assert!(recorder.last_info_ticket().is_some());
    assert!(session.is_ready());
    assert!(!recorder.statuses().contains(&CardReaderStatus::ConfiguringReader));
}

#[test]
fn test_start_transaction_requires_connection() {
    let (mut session, recorder) = session_with(SessionConfig::default(), MockConfig::default());

    let error = session.start_transaction().unwrap_err();

    assert_eq!(error, ReaderError::NotConnected);
    assert!(recorder.events().is_empty());
}

#[test]
fn test_second_transaction_while_open_rejected() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    let id = session.start_transaction().unwrap();

    let error = session.start_transaction().unwrap_err();

    assert_eq!(
        error,
        ReaderError::NegotiationInProgress { transaction_id: id }
    );
    assert!(recorder.errors().is_empty());
    assert_eq!(session.negotiation().unwrap().id(), id);
}

#[test]
fn test_new_transaction_after_resolution() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    common::run_transaction(&mut session, &recorder, test_data::DECLINED, None);
    let first = session.negotiation().unwrap().id();

    let second = session.start_transaction().unwrap();

    assert_ne!(first, second);
}

// ============================================================================
// Protocol Violations
// ============================================================================

#[test]
fn test_double_info_answer_rejected() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();
    session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap();

    let error = session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap_err();

    assert!(matches!(error, ReaderError::HandshakeOutOfOrder { .. }));
    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_code(), Some(ErrorCode::CardReaderStatusError));

    // The scheduled card read must not resurrect the transaction
    session.advance(ms(5_000));
    assert_eq!(recorder.resolutions(), 1);
    assert!(recorder.last_email_ticket().is_none());
}

#[test]
fn test_double_email_answer_rejected() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();
    session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap();
    session.advance(ms(300));
    let email = recorder.last_email_ticket().unwrap();
    session.insert_payer_email(&email, None).unwrap();

    assert!(session.insert_payer_email(&email, None).is_err());

    session.advance(ms(5_000));
    assert_eq!(recorder.resolutions(), 1);
    assert!(recorder.successes().is_empty());
}

#[test]
fn test_double_reset_answer_rejected() {
    let mock = MockConfig::default().with_previously_configured(true);
    let (mut session, recorder) = connected_session(mock);
    session.start_transaction().unwrap();
    let reset = recorder.last_reset_ticket().unwrap();

    session.reset_card_reader(&reset, false).unwrap();
    let error = session.reset_card_reader(&reset, false).unwrap_err();

    assert!(matches!(error, ReaderError::HandshakeOutOfOrder { .. }));
    assert_eq!(recorder.resolutions(), 1);
    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::Resolved
    );
}

#[test]
fn test_email_ticket_from_previous_transaction_rejected() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    common::run_transaction(&mut session, &recorder, test_data::APPROVED, None);
    let old_email = recorder.last_email_ticket().unwrap();
    recorder.clear();

    session.start_transaction().unwrap();
    let error = session.insert_payer_email(&old_email, None).unwrap_err();

    assert!(matches!(error, ReaderError::StaleCallback { .. }));
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_stale_ticket_leaves_current_transaction_alone() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let old_ticket = recorder.last_info_ticket().unwrap();
    session
        .use_transaction_info(&old_ticket, 0.0, CurrencyCode::Usd, 1)
        .unwrap();
    assert_eq!(recorder.resolutions(), 1);

    let id = session.start_transaction().unwrap();
    let new_ticket = recorder.last_info_ticket().unwrap();
    assert_eq!(new_ticket.transaction_id(), id);

    let error = session
        .use_transaction_info(&old_ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap_err();

    assert_eq!(
        error,
        ReaderError::StaleCallback {
            transaction_id: old_ticket.transaction_id()
        }
    );
    assert_eq!(recorder.resolutions(), 1);
    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::AwaitingTransactionInfo
    );

    session
        .use_transaction_info(&new_ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap();
    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::AwaitingCard
    );
}

#[test]
fn test_answer_without_transaction_is_stale() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();
    session.initialize(MockConfig::default()).unwrap();

    let error = session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap_err();

    assert!(matches!(error, ReaderError::StaleCallback { .. }));
}

// ============================================================================
// Handshake Timeout
// ============================================================================

#[test]
fn test_handshake_timeout_fails_unanswered_step() {
    let config = SessionConfig::default().with_handshake_timeout(ms(30_000));
    let (mut session, recorder) = connected_session_with(config, MockConfig::default());
    session.start_transaction().unwrap();
    let ticket = recorder.last_info_ticket().unwrap();

    session.advance(ms(29_999));
    assert!(recorder.errors().is_empty());

    session.advance(ms(1));
    assert_eq!(recorder.errors(), vec![ErrorRecord::card_reader_timeout()]);

    let error = session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap_err();
    assert!(error.is_protocol_violation());
    assert_eq!(recorder.resolutions(), 1);
}

#[test]
fn test_handshake_timeout_cancelled_by_answer() {
    let config = SessionConfig::default().with_handshake_timeout(ms(1_000));
    let (mut session, recorder) = connected_session_with(config, MockConfig::default());
    session.start_transaction().unwrap();

    session.advance(ms(900));
    let ticket = recorder.last_info_ticket().unwrap();
    session
        .use_transaction_info(&ticket, test_data::APPROVED, CurrencyCode::Usd, 1)
        .unwrap();
    session.advance(ms(300));
    let email = recorder.last_email_ticket().unwrap();

    // Email step gets a fresh timeout
    session.advance(ms(900));
    session.insert_payer_email(&email, None).unwrap();
    session.advance(ms(500));

    assert_eq!(recorder.successes().len(), 1);
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_no_timeout_by_default() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.start_transaction().unwrap();

    session.advance(ms(3_600_000));

    assert_eq!(recorder.resolutions(), 0);
    assert_eq!(
        session.negotiation().unwrap().step(),
        HandshakeStep::AwaitingTransactionInfo
    );
}

// ============================================================================
// Battery and Calibration
// ============================================================================

#[test]
fn test_battery_level() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.get_battery_level();
    assert!(recorder.events().is_empty());
    session.advance(ms(200));

    assert_eq!(recorder.events(), vec![HostEvent::Battery(Ok(100))]);
}

#[test]
fn test_battery_level_error() {
    let mock = MockConfig::default().with_battery_level_error(true);
    let (mut session, recorder) = connected_session(mock);

    session.get_battery_level();
    session.advance(ms(200));

    assert_eq!(
        recorder.events(),
        vec![HostEvent::Battery(Err(ErrorRecord::failed_to_get_battery_level()))]
    );
}

#[test]
fn test_battery_level_not_connected() {
    let (mut session, recorder) = session_with(SessionConfig::default(), MockConfig::default());

    session.get_battery_level();

    assert_eq!(
        recorder.events(),
        vec![HostEvent::Battery(Err(ErrorRecord::card_reader_not_connected()))]
    );
}

#[test]
fn test_malformed_battery_response() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.deliver(ReaderEvent::BatteryResponse(Default::default()));

    assert_eq!(
        recorder.events(),
        vec![HostEvent::Battery(Err(ErrorRecord::card_reader_unknown()))]
    );
}

#[test]
fn test_calibration() {
    let (mut session, recorder) = connected_session(MockConfig::default());

    session.start_calibration();
    session.advance(ms(0));

    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::Status(CardReaderStatus::Calibrating),
            HostEvent::Calibration(Ok(())),
        ]
    );
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discovery_found_then_complete() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());

    session.advance(ms(499));
    assert!(recorder.events().is_empty());

    session.advance(ms(1));
    assert_eq!(
        recorder.events(),
        vec![HostEvent::DeviceDiscovered(SimulatedBackend::descriptor())]
    );

    session.advance(ms(500));
    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::DeviceDiscovered(SimulatedBackend::descriptor()),
            HostEvent::DiscoveryComplete,
        ]
    );
    assert_eq!(session.discovery().state(), DiscoveryState::Completed);
}

#[test]
fn test_inverted_discovery_latencies_keep_order() {
    let latencies = Latencies {
        discovered_ms: 800,
        discovery_complete_ms: 300,
        ..Latencies::default()
    };
    let config = SessionConfig::default().with_latencies(latencies);
    let (mut session, recorder) = connected_session_with(config, MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());

    session.advance(ms(2_000));

    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::DeviceDiscovered(SimulatedBackend::descriptor()),
            HostEvent::DiscoveryComplete,
        ]
    );
    assert_eq!(session.discovery().found().len(), 1);
}

#[rstest]
#[case(0)]
#[case(250)]
#[case(499)]
fn test_cancel_before_found_emits_nothing(#[case] cancel_at: u64) {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());

    session.advance(ms(cancel_at));
    session.cancel_search();
    session.advance(ms(5_000));

    assert!(recorder.events().is_empty());
    assert_eq!(session.discovery().state(), DiscoveryState::Cancelled);
}

#[test]
fn test_cancel_after_found_suppresses_completion() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());

    session.advance(ms(700));
    session.cancel_search();
    session.cancel_search();
    session.advance(ms(5_000));

    assert_eq!(
        recorder.events(),
        vec![HostEvent::DeviceDiscovered(SimulatedBackend::descriptor())]
    );
}

#[test]
fn test_search_restart_reschedules() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    session.search(recorder.listener(), SearchOptions::default());
    session.advance(ms(400));

    session.search(recorder.listener(), SearchOptions::default());
    session.advance(ms(400));
    assert!(recorder.events().is_empty());

    session.advance(ms(600));
    assert_eq!(
        recorder.events(),
        vec![
            HostEvent::DeviceDiscovered(SimulatedBackend::descriptor()),
            HostEvent::DiscoveryComplete,
        ]
    );
}

#[test]
fn test_select_reader() {
    let (mut session, recorder) = connected_session(MockConfig::default());
    let unknown = cardlink_core::PeripheralDescriptor::new(
        cardlink_core::DeviceType::G4x,
        cardlink_core::CommunicationType::Bluetooth,
        "OTHER",
        "G4X001",
    );

    assert!(session.select_reader(&SimulatedBackend::descriptor()).is_err());

    session.search(recorder.listener(), SearchOptions::default());
    session.advance(ms(1_000));

    let error = session.select_reader(&unknown).unwrap_err();
    assert_eq!(
        error,
        ReaderError::Failure(ErrorRecord::invalid_card_reader_selection())
    );

    session.select_reader(&SimulatedBackend::descriptor()).unwrap();
    assert_eq!(
        session.selected_reader(),
        Some(&SimulatedBackend::descriptor())
    );
}
