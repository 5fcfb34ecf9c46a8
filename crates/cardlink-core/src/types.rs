use crate::{
    Result,
    constants::{AMOUNT_DECIMAL_PLACES, AMOUNT_SCALE},
    error::ErrorRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Transaction amount in minor units (cents).
///
/// Amounts are fixed-point with two decimal places. Values supplied by the host
/// as floating point are rounded half away from zero.
///
/// # Examples
///
/// ```
/// use cardlink_core::Amount;
///
/// let amount = Amount::from_major(20.61).unwrap();
/// assert_eq!(amount.cents(), 2061);
/// assert_eq!(amount.to_string(), "20.61");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Create an amount from a major-unit value.
    ///
    /// # Errors
    /// Returns the invalid-amount error if the value is not finite or does not
    /// round to a positive number of cents.
    pub fn from_major(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(ErrorRecord::invalid_transaction_amount());
        }
        let cents = (value * AMOUNT_SCALE as f64).round();
        if cents < 1.0 || cents > i64::MAX as f64 {
            return Err(ErrorRecord::invalid_transaction_amount());
        }
        Ok(Amount(cents as i64))
    }

    /// Create an amount from minor units.
    ///
    /// # Errors
    /// Returns the invalid-amount error if `cents` is not positive.
    pub fn from_cents(cents: i64) -> Result<Self> {
        if cents <= 0 {
            return Err(ErrorRecord::invalid_transaction_amount());
        }
        Ok(Amount(cents))
    }

    /// Amount in minor units.
    #[must_use]
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Amount in major units.
    #[must_use]
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / AMOUNT_SCALE as f64
    }
}

impl TryFrom<i64> for Amount {
    type Error = ErrorRecord;

    fn try_from(cents: i64) -> Result<Self> {
        Amount::from_cents(cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / AMOUNT_SCALE,
            self.0 % AMOUNT_SCALE,
            width = AMOUNT_DECIMAL_PLACES as usize
        )
    }
}

/// Supported transaction currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    Usd,
    Cad,
    Gbp,
    Eur,
}

impl CurrencyCode {
    /// ISO 4217 alphabetic code.
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyCode::Usd => "USD",
            CurrencyCode::Cad => "CAD",
            CurrencyCode::Gbp => "GBP",
            CurrencyCode::Eur => "EUR",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = ErrorRecord;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(CurrencyCode::Usd),
            "CAD" => Ok(CurrencyCode::Cad),
            "GBP" => Ok(CurrencyCode::Gbp),
            "EUR" => Ok(CurrencyCode::Eur),
            _ => Err(ErrorRecord::invalid_transaction_currency_code()),
        }
    }
}

/// Merchant account identifier (positive integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64")]
pub struct AccountId(i64);

impl AccountId {
    /// Create an account id.
    ///
    /// # Errors
    /// Returns the invalid-account error if `id` is not positive.
    pub fn new(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(ErrorRecord::invalid_transaction_account_id());
        }
        Ok(AccountId(id))
    }

    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for AccountId {
    type Error = ErrorRecord;

    fn try_from(id: i64) -> Result<Self> {
        AccountId::new(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one negotiation; tags every handshake ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported card reader models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Rp350x,
    G4x,
    Rp450c,
    Moby3000,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DeviceType::Rp350x => "RP350x",
            DeviceType::G4x => "G4x",
            DeviceType::Rp450c => "RP450c",
            DeviceType::Moby3000 => "Moby3000",
        };
        write!(f, "{name}")
    }
}

/// Physical link between host and reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    AudioJack,
    Bluetooth,
    Usb,
    Simulated,
}

impl fmt::Display for CommunicationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CommunicationType::AudioJack => "audio jack",
            CommunicationType::Bluetooth => "bluetooth",
            CommunicationType::Usb => "usb",
            CommunicationType::Simulated => "simulated",
        };
        write!(f, "{name}")
    }
}

/// A reader found during discovery.
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralDescriptor {
    device_type: DeviceType,
    communication_type: CommunicationType,
    name: String,
    identifier: String,
}

impl PeripheralDescriptor {
    pub fn new(
        device_type: DeviceType,
        communication_type: CommunicationType,
        name: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            device_type,
            communication_type,
            name: name.into(),
            identifier: identifier.into(),
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn communication_type(&self) -> CommunicationType {
        self.communication_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for PeripheralDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}) via {} [{}]",
            self.name, self.device_type, self.communication_type, self.identifier
        )
    }
}

/// Advisory reader status pushed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardReaderStatus {
    NotConnected,
    Connected,
    CheckingReader,
    ConfiguringReader,
    WaitingForCard,
    SwipeDetected,
    CardDipped,
    Authorizing,
    Calibrating,
    Stopped,
}

impl fmt::Display for CardReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CardReaderStatus::NotConnected => "not connected",
            CardReaderStatus::Connected => "connected",
            CardReaderStatus::CheckingReader => "checking reader",
            CardReaderStatus::ConfiguringReader => "configuring reader",
            CardReaderStatus::WaitingForCard => "waiting for card",
            CardReaderStatus::SwipeDetected => "swipe detected",
            CardReaderStatus::CardDipped => "card dipped",
            CardReaderStatus::Authorizing => "authorizing",
            CardReaderStatus::Calibrating => "calibrating",
            CardReaderStatus::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// How the card was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    #[default]
    Swipe,
    Dip,
}

impl EntryMode {
    /// Status pushed when a card is presented this way.
    pub fn presented_status(&self) -> CardReaderStatus {
        match self {
            EntryMode::Swipe => CardReaderStatus::SwipeDetected,
            EntryMode::Dip => CardReaderStatus::CardDipped,
        }
    }
}

/// Payload of a successful transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub entry_mode: EntryMode,
    /// Masked card number, e.g. `"Visa xxxx1111"`.
    pub payment_description: String,
    pub first_name: String,
    pub last_name: String,
    /// Payer email supplied during negotiation, if any.
    pub email: Option<String>,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub captured_at: DateTime<Utc>,
    /// Opaque attributes produced by the reader.
    pub raw: BTreeMap<String, String>,
}
