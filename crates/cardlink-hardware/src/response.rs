//! Decoding of reader responses.
//!
//! Readers answer commands with a keyed attribute bag ([`AttributeBag`]).
//! The decoders here turn a bag into a typed value or a catalogued
//! [`ErrorRecord`]. A bag with missing keys or values of the wrong type decodes
//! to the unknown card reader error; decoding never panics.
//!
//! # Examples
//!
//! ```
//! use cardlink_hardware::response::{AttributeBag, AttributeValue, Parameter, decode_battery};
//!
//! let bag = AttributeBag::from([
//!     (Parameter::Command, AttributeValue::text("BatteryInfo")),
//!     (Parameter::ResponseCode, AttributeValue::text("Success")),
//!     (Parameter::BatteryLevel, AttributeValue::Int(140)),
//! ]);
//!
//! assert_eq!(decode_battery(&bag).unwrap(), 100);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use cardlink_core::{
    EntryMode, ErrorRecord,
    constants::{MAX_BATTERY_LEVEL, MIN_BATTERY_LEVEL},
};
use serde::{Deserialize, Serialize};

/// Keys of a reader response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parameter {
    Command,
    ResponseCode,
    ErrorCode,
    ErrorMessage,
    BatteryLevel,
    EntryMode,
    MaskedPan,
    CardBrand,
    FirstName,
    LastName,
    ExpirationDate,
    ApplicationIdentifier,
}

impl Parameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Command => "Command",
            Parameter::ResponseCode => "ResponseCode",
            Parameter::ErrorCode => "ErrorCode",
            Parameter::ErrorMessage => "ErrorMessage",
            Parameter::BatteryLevel => "BatteryLevel",
            Parameter::EntryMode => "EntryMode",
            Parameter::MaskedPan => "MaskedPAN",
            Parameter::CardBrand => "CardBrand",
            Parameter::FirstName => "FirstName",
            Parameter::LastName => "LastName",
            Parameter::ExpirationDate => "ExpirationDate",
            Parameter::ApplicationIdentifier => "ApplicationIdentifier",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single response value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Text(String),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::Text(value.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(value) => Some(*value),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            AttributeValue::Int(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(value) => write!(f, "{value}"),
            AttributeValue::Text(value) => write!(f, "{value}"),
        }
    }
}

/// A reader response.
pub type AttributeBag = BTreeMap<Parameter, AttributeValue>;

/// Commands the reader answers.
pub mod commands {
    pub const BATTERY_INFO: &str = "BatteryInfo";
    pub const CARD_READ: &str = "ReadCard";
}

/// Reader error codes with a dedicated mapping.
pub mod reader_codes {
    pub const SWIPE_DECODE_FAILURE: &str = "G4X_DECODE_SWIPE_FAIL";
    pub const CARD_NOT_SUPPORTED: &str = "CardNotSupported";
    pub const INVALID_CARD_DATA: &str = "InvalidCardData";
    pub const EMV_ERROR: &str = "EMVError";
    pub const TIMEOUT: &str = "TimeoutExpired";
    pub const UNKNOWN: &str = "UnknownError";
}

/// Outcome of a reader response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Success,
    Error,
}

impl ResponseCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Success => "Success",
            ResponseCode::Error => "Error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Success" => Some(ResponseCode::Success),
            "Error" => Some(ResponseCode::Error),
            _ => None,
        }
    }
}

/// Outcome of a reader calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationResult {
    Succeeded,
    Failed,
}

/// Card data decoded from a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRead {
    pub entry_mode: EntryMode,
    pub masked_pan: String,
    pub card_brand: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Every attribute of the response, keyed by parameter name.
    pub raw: BTreeMap<String, String>,
}

impl CardRead {
    /// Human-readable description such as `"Visa xxxx1111"`.
    pub fn payment_description(&self) -> String {
        let last_four: String = {
            let digits: Vec<char> = self.masked_pan.chars().collect();
            digits[digits.len().saturating_sub(4)..].iter().collect()
        };
        match &self.card_brand {
            Some(brand) => format!("{brand} xxxx{last_four}"),
            None => format!("xxxx{last_four}"),
        }
    }
}

/// Read the response code of a bag.
pub fn response_code(bag: &AttributeBag) -> Result<ResponseCode, ErrorRecord> {
    bag.get(&Parameter::ResponseCode)
        .and_then(AttributeValue::as_text)
        .and_then(ResponseCode::parse)
        .ok_or_else(ErrorRecord::card_reader_unknown)
}

/// Map a reader error bag to a catalogued record.
///
/// A swipe decode failure maps to the general card reader error; anything
/// else maps to the unknown card reader error.
pub fn error_from_reader_response(bag: &AttributeBag) -> ErrorRecord {
    match bag.get(&Parameter::ErrorCode).and_then(AttributeValue::as_text) {
        Some(reader_codes::SWIPE_DECODE_FAILURE) => ErrorRecord::card_reader_general(),
        _ => ErrorRecord::card_reader_unknown(),
    }
}

/// Decode a battery response into a percentage clamped to 0-100.
pub fn decode_battery(bag: &AttributeBag) -> Result<u8, ErrorRecord> {
    match response_code(bag)? {
        ResponseCode::Error => Err(ErrorRecord::failed_to_get_battery_level()),
        ResponseCode::Success => {
            let level = bag
                .get(&Parameter::BatteryLevel)
                .and_then(AttributeValue::as_int)
                .ok_or_else(ErrorRecord::card_reader_unknown)?;
            let clamped = level.clamp(MIN_BATTERY_LEVEL as i64, MAX_BATTERY_LEVEL as i64);
            Ok(clamped as u8)
        }
    }
}

/// Decode a calibration outcome.
pub fn decode_calibration(result: CalibrationResult) -> Result<(), ErrorRecord> {
    match result {
        CalibrationResult::Succeeded => Ok(()),
        CalibrationResult::Failed => Err(ErrorRecord::card_reader_status(
            "Card reader calibration failed",
        )),
    }
}

/// Decode a card read response.
pub fn decode_card_read(bag: &AttributeBag) -> Result<CardRead, ErrorRecord> {
    if response_code(bag)? == ResponseCode::Error {
        return Err(card_read_error(bag));
    }

    let text = |parameter: Parameter| -> Result<String, ErrorRecord> {
        bag.get(&parameter)
            .and_then(AttributeValue::as_text)
            .map(str::to_owned)
            .ok_or_else(ErrorRecord::card_reader_unknown)
    };

    let entry_mode = match text(Parameter::EntryMode)?.as_str() {
        "swipe" => EntryMode::Swipe,
        "dip" => EntryMode::Dip,
        _ => return Err(ErrorRecord::card_reader_unknown()),
    };
    let masked_pan = text(Parameter::MaskedPan)?;
    if masked_pan.chars().count() < 4 {
        return Err(ErrorRecord::invalid_card_data());
    }

    Ok(CardRead {
        entry_mode,
        masked_pan,
        card_brand: text(Parameter::CardBrand).ok(),
        first_name: text(Parameter::FirstName).unwrap_or_default(),
        last_name: text(Parameter::LastName).unwrap_or_default(),
        raw: bag
            .iter()
            .map(|(key, value)| (key.as_str().to_owned(), value.to_string()))
            .collect(),
    })
}

fn card_read_error(bag: &AttributeBag) -> ErrorRecord {
    let message = bag
        .get(&Parameter::ErrorMessage)
        .and_then(AttributeValue::as_text);
    match bag.get(&Parameter::ErrorCode).and_then(AttributeValue::as_text) {
        Some(reader_codes::CARD_NOT_SUPPORTED) => ErrorRecord::card_not_supported(),
        Some(reader_codes::INVALID_CARD_DATA) => ErrorRecord::invalid_card_data(),
        Some(reader_codes::TIMEOUT) => ErrorRecord::card_reader_timeout(),
        Some(reader_codes::EMV_ERROR) => {
            ErrorRecord::emv_transaction_error(message.unwrap_or("EMV transaction failed"))
        }
        _ => error_from_reader_response(bag),
    }
}
