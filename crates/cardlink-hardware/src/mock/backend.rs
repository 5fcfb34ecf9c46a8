//! Simulated card reader peripheral.
//!
//! The backend produces the responses a real reader would send: one fixed
//! discoverable device, battery and card read attribute bags, calibration
//! outcomes, and authorization decisions driven by amount bands.
//!
//! # Amount Bands
//!
//! | Amount | Result |
//! |---|---|
//! | 20.61, 120.61, 23.61, 123.61 | declined by issuer |
//! | anything else | approved |

use cardlink_core::{
    CommunicationType, DeviceType, EntryMode, ErrorRecord, PaymentInfo, PeripheralDescriptor,
};
use chrono::Utc;

use crate::negotiation::TransactionInfo;
use crate::response::{
    AttributeBag, AttributeValue, CalibrationResult, CardRead, Parameter, ResponseCode, commands,
    reader_codes,
};

use super::config::MockConfig;

/// Name of the simulated reader.
pub const MOCK_DEVICE_NAME: &str = "AUDIOJACK";

/// Identifier of the simulated reader.
pub const MOCK_DEVICE_IDENTIFIER: &str = "RP350MOCK";

/// Amounts, in cents, the simulated issuer declines.
pub const DECLINED_AMOUNTS: [i64; 4] = [2061, 12061, 2361, 12361];

/// Amounts, in cents, documented to authorize.
pub const APPROVED_AMOUNTS: [i64; 4] = [2161, 12161, 2261, 12261];

/// A simulated reader.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    config: MockConfig,
}

impl SimulatedBackend {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// The simulated reader always discovers the same device.
    pub fn descriptor() -> PeripheralDescriptor {
        PeripheralDescriptor::new(
            DeviceType::Rp350x,
            CommunicationType::AudioJack,
            MOCK_DEVICE_NAME,
            MOCK_DEVICE_IDENTIFIER,
        )
    }

    /// Readers reported by discovery.
    pub fn devices(&self) -> Vec<PeripheralDescriptor> {
        vec![Self::descriptor()]
    }

    /// Battery query response.
    pub fn battery_response(&self) -> AttributeBag {
        let mut bag = AttributeBag::from([(
            Parameter::Command,
            AttributeValue::text(commands::BATTERY_INFO),
        )]);
        if self.config.battery_level_error {
            bag.insert(
                Parameter::ResponseCode,
                AttributeValue::text(ResponseCode::Error.as_str()),
            );
            bag.insert(
                Parameter::ErrorCode,
                AttributeValue::text(reader_codes::UNKNOWN),
            );
        } else {
            bag.insert(
                Parameter::ResponseCode,
                AttributeValue::text(ResponseCode::Success.as_str()),
            );
            bag.insert(
                Parameter::BatteryLevel,
                AttributeValue::Int(self.config.battery_level as i64),
            );
        }
        bag
    }

    /// Card read response.
    pub fn card_response(&self) -> AttributeBag {
        let mut bag = AttributeBag::from([(
            Parameter::Command,
            AttributeValue::text(commands::CARD_READ),
        )]);
        if self.config.card_read_failure {
            bag.insert(
                Parameter::ResponseCode,
                AttributeValue::text(ResponseCode::Error.as_str()),
            );
            bag.insert(
                Parameter::ErrorCode,
                AttributeValue::text(reader_codes::SWIPE_DECODE_FAILURE),
            );
            return bag;
        }

        let entry_mode = match self.config.entry_mode {
            EntryMode::Swipe => "swipe",
            EntryMode::Dip => "dip",
        };
        bag.extend([
            (
                Parameter::ResponseCode,
                AttributeValue::text(ResponseCode::Success.as_str()),
            ),
            (Parameter::EntryMode, AttributeValue::text(entry_mode)),
            (Parameter::MaskedPan, AttributeValue::text("411111xxxxxx1111")),
            (Parameter::CardBrand, AttributeValue::text("Visa")),
            (Parameter::FirstName, AttributeValue::text("Test")),
            (Parameter::LastName, AttributeValue::text("Cardholder")),
            (Parameter::ExpirationDate, AttributeValue::text("1230")),
        ]);
        if self.config.entry_mode == EntryMode::Dip {
            bag.insert(
                Parameter::ApplicationIdentifier,
                AttributeValue::text("A0000000031010"),
            );
        }
        bag
    }

    /// Calibration outcome. The simulated reader always calibrates.
    pub fn calibrate(&self) -> CalibrationResult {
        CalibrationResult::Succeeded
    }

    /// Decide a transaction.
    pub fn authorize(
        &self,
        info: &TransactionInfo,
        card: &CardRead,
        email: Option<&str>,
    ) -> Result<PaymentInfo, ErrorRecord> {
        if self.config.card_tokenization_failure {
            return Err(ErrorRecord::payment_method_cannot_be_tokenized());
        }
        if self.config.emv_auth_failure {
            return Err(ErrorRecord::emv_transaction_error(
                "The card did not approve the transaction",
            ));
        }
        if is_declined_amount(info.amount.cents()) {
            return Err(ErrorRecord::card_declined_by_issuer());
        }

        Ok(PaymentInfo {
            entry_mode: card.entry_mode,
            payment_description: card.payment_description(),
            first_name: card.first_name.clone(),
            last_name: card.last_name.clone(),
            email: email.map(str::to_owned),
            amount: info.amount,
            currency: info.currency,
            captured_at: Utc::now(),
            raw: card.raw.clone(),
        })
    }
}

/// Whether the simulated issuer declines `cents`.
pub fn is_declined_amount(cents: i64) -> bool {
    DECLINED_AMOUNTS.contains(&cents)
}
