//! Session and simulated backend configuration.
//!
//! Both structs deserialize from partial JSON: missing fields take their
//! defaults.
//!
//! ```
//! use cardlink_hardware::mock::MockConfig;
//!
//! let config: MockConfig = serde_json::from_str(r#"{"card_read_failure": true}"#).unwrap();
//! assert!(config.card_read_failure);
//! assert_eq!(config.battery_level, 100);
//! ```

use std::time::Duration;

use cardlink_core::{CurrencyCode, EntryMode, constants::*};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectOptions;
use crate::discovery::DiscoveryTiming;

/// Switches of the simulated peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// The reader never reports the connection.
    pub card_read_timeout: bool,

    /// Card reads fail with a swipe decode error.
    pub card_read_failure: bool,

    /// Authorization fails because the card cannot be tokenized.
    pub card_tokenization_failure: bool,

    /// Authorization fails with an EMV error.
    pub emv_auth_failure: bool,

    /// Battery queries fail.
    pub battery_level_error: bool,

    /// Battery level reported on success.
    pub battery_level: u8,

    /// How the simulated card is presented.
    pub entry_mode: EntryMode,

    /// The reader already holds configuration when the session starts.
    pub previously_configured: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            card_read_timeout: false,
            card_read_failure: false,
            card_tokenization_failure: false,
            emv_auth_failure: false,
            battery_level_error: false,
            battery_level: MAX_BATTERY_LEVEL,
            entry_mode: EntryMode::Swipe,
            previously_configured: false,
        }
    }
}

impl MockConfig {
    pub fn with_card_read_timeout(mut self, enabled: bool) -> Self {
        self.card_read_timeout = enabled;
        self
    }

    pub fn with_card_read_failure(mut self, enabled: bool) -> Self {
        self.card_read_failure = enabled;
        self
    }

    pub fn with_card_tokenization_failure(mut self, enabled: bool) -> Self {
        self.card_tokenization_failure = enabled;
        self
    }

    pub fn with_emv_auth_failure(mut self, enabled: bool) -> Self {
        self.emv_auth_failure = enabled;
        self
    }

    pub fn with_battery_level_error(mut self, enabled: bool) -> Self {
        self.battery_level_error = enabled;
        self
    }

    pub fn with_battery_level(mut self, level: u8) -> Self {
        self.battery_level = level;
        self
    }

    pub fn with_entry_mode(mut self, mode: EntryMode) -> Self {
        self.entry_mode = mode;
        self
    }

    pub fn with_previously_configured(mut self, configured: bool) -> Self {
        self.previously_configured = configured;
        self
    }
}

/// Peripheral latencies in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Latencies {
    pub connection_ms: u64,
    pub discovered_ms: u64,
    pub discovery_complete_ms: u64,
    pub release_ms: u64,
    pub card_present_ms: u64,
    pub authorization_ms: u64,
}

impl Default for Latencies {
    fn default() -> Self {
        Self {
            connection_ms: READER_CONNECTION_TIME_MS,
            discovered_ms: READER_DISCOVERED_TIME_MS,
            discovery_complete_ms: DISCOVERY_COMPLETE_TIME_MS,
            release_ms: READER_RELEASE_TIME_MS,
            card_present_ms: CARD_PRESENT_TIME_MS,
            authorization_ms: AUTHORIZATION_TIME_MS,
        }
    }
}

impl Latencies {
    pub fn connection(&self) -> Duration {
        Duration::from_millis(self.connection_ms)
    }

    pub fn release(&self) -> Duration {
        Duration::from_millis(self.release_ms)
    }

    pub fn card_present(&self) -> Duration {
        Duration::from_millis(self.card_present_ms)
    }

    pub fn authorization(&self) -> Duration {
        Duration::from_millis(self.authorization_ms)
    }

    /// Discovery schedule. Completion never comes before the found events.
    pub fn discovery(&self) -> DiscoveryTiming {
        DiscoveryTiming {
            found_after: Duration::from_millis(self.discovered_ms),
            complete_after: Duration::from_millis(self.discovery_complete_ms.max(self.discovered_ms)),
        }
    }
}

/// Settings of a reader session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub latencies: Latencies,

    /// Currencies accepted in transaction info.
    pub supported_currencies: Vec<CurrencyCode>,

    /// Fail a connection still initializing after this many milliseconds.
    pub connect_timeout_ms: Option<u64>,

    /// Fail a transaction whose host step is unanswered after this many milliseconds.
    pub handshake_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            latencies: Latencies::default(),
            supported_currencies: vec![CurrencyCode::Usd],
            connect_timeout_ms: None,
            handshake_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn with_latencies(mut self, latencies: Latencies) -> Self {
        self.latencies = latencies;
        self
    }

    pub fn with_supported_currencies(mut self, currencies: Vec<CurrencyCode>) -> Self {
        self.supported_currencies = currencies;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    /// Connection behavior for `mock`.
    pub fn connect_options(&self, mock: &MockConfig) -> ConnectOptions {
        ConnectOptions {
            connect_after: self.latencies.connection(),
            suppress_connect: mock.card_read_timeout,
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_defaults() {
        let config = MockConfig::default();

        assert!(!config.card_read_timeout);
        assert!(!config.card_read_failure);
        assert_eq!(config.battery_level, 100);
        assert_eq!(config.entry_mode, EntryMode::Swipe);
    }

    #[test]
    fn test_mock_builder() {
        let config = MockConfig::default()
            .with_emv_auth_failure(true)
            .with_entry_mode(EntryMode::Dip)
            .with_previously_configured(true);

        assert!(config.emv_auth_failure);
        assert_eq!(config.entry_mode, EntryMode::Dip);
        assert!(config.previously_configured);
    }

    #[test]
    fn test_partial_json_loads() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"supported_currencies": ["USD", "CAD"], "latencies": {"connection_ms": 50}}"#,
        )
        .unwrap();

        assert_eq!(
            config.supported_currencies,
            vec![CurrencyCode::Usd, CurrencyCode::Cad]
        );
        assert_eq!(config.latencies.connection_ms, 50);
        assert_eq!(config.latencies.release_ms, READER_RELEASE_TIME_MS);
        assert_eq!(config.connect_timeout_ms, None);
    }

    #[test]
    fn test_inverted_discovery_latencies_clamped() {
        let latencies = Latencies {
            discovered_ms: 800,
            discovery_complete_ms: 300,
            ..Latencies::default()
        };

        let timing = latencies.discovery();

        assert_eq!(timing.found_after, Duration::from_millis(800));
        assert_eq!(timing.complete_after, Duration::from_millis(800));
    }

    #[test]
    fn test_timeouts_off_by_default() {
        let config = SessionConfig::default();

        assert_eq!(config.handshake_timeout(), None);
        assert_eq!(
            config.connect_options(&MockConfig::default()).connect_timeout,
            None
        );
    }

    #[test]
    fn test_connect_options_follow_mock() {
        let config = SessionConfig::default().with_connect_timeout(Duration::from_secs(5));
        let options = config.connect_options(&MockConfig::default().with_card_read_timeout(true));

        assert!(options.suppress_connect);
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.connect_after, Duration::from_millis(200));
    }
}
