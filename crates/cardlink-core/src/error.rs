//! Canonical error model for every failure path.
//!
//! All failures, whether raised by the card reader, by the protocol core or by
//! the remote API, surface as one immutable [`ErrorRecord`]. A record carries a
//! domain, a category, a numeric code, a human-readable description and an
//! optional wrapped cause.
//!
//! # Equality
//!
//! Two records are equal when their [`CanonicalProjection`]s are equal. The
//! projection keeps the record's own fields and the immediate cause, but drops
//! the cause's own cause. Comparing records that wrap each other or that sit
//! on long cause chains therefore always terminates.
//!
//! ```
//! use cardlink_core::ErrorRecord;
//!
//! let a = ErrorRecord::card_reader_timeout().with_cause(ErrorRecord::card_reader_unknown());
//! let b = ErrorRecord::card_reader_timeout().with_cause(ErrorRecord::card_reader_unknown());
//! assert_eq!(a, b);
//! ```
//!
//! # External payloads
//!
//! API failures arrive as JSON objects with optional fields. Parsing never
//! fails; absent or null fields fall back to documented defaults:
//!
//! ```
//! use cardlink_core::{ErrorCategory, ErrorDomain, ErrorRecord, ExternalFailure};
//! use cardlink_core::constants::UNKNOWN_ERROR_CODE;
//!
//! let payload = serde_json::json!({});
//! let error = ErrorRecord::from_api_payload(&payload, ExternalFailure::new("http", "502"));
//! assert_eq!(error.code(), UNKNOWN_ERROR_CODE);
//! assert_eq!(error.domain(), ErrorDomain::Api);
//! assert_eq!(error.category(), ErrorCategory::ApiError);
//! assert_eq!(error.description(), "");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::UNKNOWN_ERROR_CODE;

/// Result type alias for operations that fail with an [`ErrorRecord`].
pub type Result<T> = std::result::Result<T, ErrorRecord>;

/// Origin of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorDomain {
    /// Failure reported by the remote payment API.
    #[serde(rename = "com.wepay.api", alias = "api")]
    Api,

    /// Failure raised locally by the card-reader stack.
    #[serde(rename = "com.wepay.sdk", alias = "sdk")]
    Sdk,
}

impl ErrorDomain {
    /// Wire representation of the domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorDomain::Api => "com.wepay.api",
            ErrorDomain::Sdk => "com.wepay.sdk",
        }
    }

    /// Parse a wire domain, ignoring ASCII case. The short forms `api` and
    /// `sdk` are accepted as aliases.
    ///
    /// Returns `None` for anything outside the closed set.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "com.wepay.api" | "api" => Some(ErrorDomain::Api),
            "com.wepay.sdk" | "sdk" => Some(ErrorDomain::Sdk),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The card reader or the card itself failed.
    CardReaderError,

    /// The remote API rejected or failed the request.
    ApiError,

    /// The local stack rejected the request.
    SdkError,
}

impl ErrorCategory {
    /// Wire representation of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::CardReaderError => "card_reader_error",
            ErrorCategory::ApiError => "api_error",
            ErrorCategory::SdkError => "sdk_error",
        }
    }

    /// Parse a wire category, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "card_reader_error" => Some(ErrorCategory::CardReaderError),
            "api_error" => Some(ErrorCategory::ApiError),
            "sdk_error" => Some(ErrorCategory::SdkError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Catalogued numeric error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
#[non_exhaustive]
pub enum ErrorCode {
    UnknownError = 10000,
    CardReaderGeneralError = 10001,
    CardReaderInitializationError = 10002,
    CardReaderTimeOutError = 10003,
    CardReaderStatusError = 10004,
    InvalidSignatureImageError = 10005,
    NameNotFoundError = 10006,
    InvalidCardData = 10007,
    CardNotSupported = 10008,
    EmvTransactionError = 10009,
    InvalidApplicationId = 10010,
    DeclinedByCard = 10011,
    CardBlocked = 10012,
    IssuerUnreachable = 10013,
    NoDataReturnedError = 10014,
    CardDeclinedByIssuer = 10015,
    InvalidTransactionAmount = 10016,
    InvalidTransactionCurrencyCode = 10017,
    InvalidTransactionAccountId = 10018,
    TransactionInfoNotProvided = 10019,
    PaymentMethodCannotBeTokenized = 10020,
    FailedToGetBatteryLevel = 10021,
    CardReaderNotConnectedError = 10022,
    InvalidCardReaderSelection = 10023,
    CardReaderBatteryTooLow = 10024,
    CardReaderUnableToConnect = 10025,
}

impl ErrorCode {
    const ALL: [ErrorCode; 26] = [
        ErrorCode::UnknownError,
        ErrorCode::CardReaderGeneralError,
        ErrorCode::CardReaderInitializationError,
        ErrorCode::CardReaderTimeOutError,
        ErrorCode::CardReaderStatusError,
        ErrorCode::InvalidSignatureImageError,
        ErrorCode::NameNotFoundError,
        ErrorCode::InvalidCardData,
        ErrorCode::CardNotSupported,
        ErrorCode::EmvTransactionError,
        ErrorCode::InvalidApplicationId,
        ErrorCode::DeclinedByCard,
        ErrorCode::CardBlocked,
        ErrorCode::IssuerUnreachable,
        ErrorCode::NoDataReturnedError,
        ErrorCode::CardDeclinedByIssuer,
        ErrorCode::InvalidTransactionAmount,
        ErrorCode::InvalidTransactionCurrencyCode,
        ErrorCode::InvalidTransactionAccountId,
        ErrorCode::TransactionInfoNotProvided,
        ErrorCode::PaymentMethodCannotBeTokenized,
        ErrorCode::FailedToGetBatteryLevel,
        ErrorCode::CardReaderNotConnectedError,
        ErrorCode::InvalidCardReaderSelection,
        ErrorCode::CardReaderBatteryTooLow,
        ErrorCode::CardReaderUnableToConnect,
    ];

    /// Numeric value of the code.
    #[inline]
    #[must_use]
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Look up a catalogued code by its numeric value.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// A failure that did not originate in this stack (transport, I/O, parser).
///
/// Only the kind and message take part in [`ErrorRecord`] equality; the
/// nested `cause` is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExternalFailure {
    /// Short classifier such as `"http"` or `"io"`.
    pub kind: String,

    /// Human-readable message.
    pub message: String,

    /// Underlying failure, if any.
    #[source]
    pub cause: Option<Box<ExternalFailure>>,
}

impl ExternalFailure {
    /// Create an external failure without a nested cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a nested cause.
    pub fn with_cause(mut self, cause: ExternalFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Capture any std error, including its source chain.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let mut failure = Self::new(std::any::type_name::<E>(), error.to_string());
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(err) = source {
            chain.push(Self::new("source", err.to_string()));
            source = err.source();
        }
        if let Some(nested) = chain
            .into_iter()
            .rev()
            .reduce(|inner, outer| outer.with_cause(inner))
        {
            failure = failure.with_cause(nested);
        }
        failure
    }
}

/// Cause wrapped by an [`ErrorRecord`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorCause {
    /// Another catalogued record.
    #[error(transparent)]
    Record(Box<ErrorRecord>),

    /// An opaque external failure.
    #[error(transparent)]
    External(ExternalFailure),
}

impl From<ErrorRecord> for ErrorCause {
    fn from(record: ErrorRecord) -> Self {
        ErrorCause::Record(Box::new(record))
    }
}

impl From<ExternalFailure> for ErrorCause {
    fn from(failure: ExternalFailure) -> Self {
        ErrorCause::External(failure)
    }
}

/// Immutable description of a failure.
///
/// Construct records through the named catalogue constructors
/// ([`ErrorRecord::card_reader_timeout`], ...), through [`ErrorRecord::new`]
/// or by parsing an API payload with [`ErrorRecord::from_api_payload`].
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    code: i64,
    domain: ErrorDomain,
    category: ErrorCategory,
    description: String,
    cause: Option<ErrorCause>,
}

impl ErrorRecord {
    /// Create a record without a cause.
    pub fn new(
        code: i64,
        domain: ErrorDomain,
        category: ErrorCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            code,
            domain,
            category,
            description: description.into(),
            cause: None,
        }
    }

    /// Create a record with an optional wrapped cause.
    pub fn make(
        code: i64,
        domain: ErrorDomain,
        category: ErrorCategory,
        description: impl Into<String>,
        cause: Option<ErrorCause>,
    ) -> Self {
        Self {
            cause,
            ..Self::new(code, domain, category, description)
        }
    }

    /// Return a copy of this record wrapping `cause`.
    pub fn with_cause(mut self, cause: impl Into<ErrorCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Parse an external API failure payload.
    ///
    /// Never fails. Missing or null fields default as follows:
    /// - `error_code` -> [`UNKNOWN_ERROR_CODE`]
    /// - `error_domain` -> [`ErrorDomain::Api`]
    /// - `error` (category) -> [`ErrorCategory::ApiError`]
    /// - `error_description` -> empty string
    ///
    /// Numeric strings are accepted for `error_code`, and unrecognized domain
    /// or category strings fall back to the defaults. `transport_cause`
    /// becomes the wrapped cause.
    pub fn from_api_payload(payload: &Value, transport_cause: ExternalFailure) -> Self {
        let field = |name: &str| payload.get(name).filter(|v| !v.is_null());

        let code = field("error_code")
            .and_then(lenient_i64)
            .unwrap_or(UNKNOWN_ERROR_CODE);
        let domain = field("error_domain")
            .and_then(Value::as_str)
            .and_then(ErrorDomain::parse)
            .unwrap_or(ErrorDomain::Api);
        let category = field("error")
            .and_then(Value::as_str)
            .and_then(ErrorCategory::parse)
            .unwrap_or(ErrorCategory::ApiError);
        let description = field("error_description")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        Self::make(
            code,
            domain,
            category,
            description,
            Some(ErrorCause::External(transport_cause)),
        )
    }

    /// Parse an API response body. Malformed JSON yields the all-defaults record.
    pub fn from_api_response(body: &str, transport_cause: ExternalFailure) -> Self {
        let payload = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        Self::from_api_payload(&payload, transport_cause)
    }

    /// Numeric error code.
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Catalogued code, if the numeric code is one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    /// Error domain.
    pub fn domain(&self) -> ErrorDomain {
        self.domain
    }

    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Wrapped cause, if any.
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// Depth-truncated field set used for equality, hashing and display.
    pub fn projection(&self) -> CanonicalProjection<'_> {
        CanonicalProjection {
            error_domain: self.domain.as_str(),
            error_category: self.category.as_str(),
            error_code: self.code,
            error_description: &self.description,
            inner_exception: self.cause.as_ref().map(CauseProjection::of),
        }
    }

    fn sdk(code: ErrorCode, category: ErrorCategory, description: impl Into<String>) -> Self {
        Self::new(code.code(), ErrorDomain::Sdk, category, description)
    }

    fn card_reader(code: ErrorCode, description: impl Into<String>) -> Self {
        Self::sdk(code, ErrorCategory::CardReaderError, description)
    }

    // ------------------------------------------------------------------
    // Catalogue
    // ------------------------------------------------------------------

    pub fn card_reader_initialization() -> Self {
        Self::card_reader(
            ErrorCode::CardReaderInitializationError,
            "Failed to initialize card reader",
        )
    }

    pub fn card_reader_timeout() -> Self {
        Self::card_reader(ErrorCode::CardReaderTimeOutError, "Card reader timed out.")
    }

    /// Generic card reader failure carrying a caller-supplied message.
    pub fn card_reader_error_with_message(message: impl Into<String>) -> Self {
        Self::card_reader(ErrorCode::CardReaderStatusError, message)
    }

    pub fn invalid_card_data() -> Self {
        Self::card_reader(ErrorCode::InvalidCardData, "Invalid card data")
    }

    pub fn card_not_supported() -> Self {
        Self::card_reader(ErrorCode::CardNotSupported, "This card is not supported")
    }

    pub fn emv_transaction_error(message: impl Into<String>) -> Self {
        Self::card_reader(ErrorCode::EmvTransactionError, message)
    }

    pub fn invalid_application_id() -> Self {
        Self::card_reader(
            ErrorCode::InvalidApplicationId,
            "Invalid application ID selected",
        )
    }

    pub fn declined_by_card() -> Self {
        Self::card_reader(
            ErrorCode::DeclinedByCard,
            "The transaction was declined by the card",
        )
    }

    pub fn card_blocked() -> Self {
        Self::card_reader(ErrorCode::CardBlocked, "This card has been blocked")
    }

    pub fn issuer_unreachable() -> Self {
        Self::card_reader(
            ErrorCode::IssuerUnreachable,
            "The issuing bank could not be reached",
        )
    }

    /// The API answered without the data the request needed.
    pub fn no_data_returned() -> Self {
        Self::new(
            ErrorCode::NoDataReturnedError.code(),
            ErrorDomain::Api,
            ErrorCategory::ApiError,
            "No data returned by the API.",
        )
    }

    pub fn card_declined_by_issuer() -> Self {
        Self::sdk(
            ErrorCode::CardDeclinedByIssuer,
            ErrorCategory::SdkError,
            "The transaction was declined by the issuer bank.",
        )
    }

    pub fn invalid_transaction_amount() -> Self {
        Self::sdk(
            ErrorCode::InvalidTransactionAmount,
            ErrorCategory::SdkError,
            "The provided transaction amount is invalid.",
        )
    }

    pub fn invalid_transaction_currency_code() -> Self {
        Self::sdk(
            ErrorCode::InvalidTransactionCurrencyCode,
            ErrorCategory::SdkError,
            "The provided currency code is invalid.",
        )
    }

    pub fn invalid_transaction_account_id() -> Self {
        Self::sdk(
            ErrorCode::InvalidTransactionAccountId,
            ErrorCategory::SdkError,
            "The provided account ID is invalid.",
        )
    }

    pub fn transaction_info_not_provided() -> Self {
        Self::sdk(
            ErrorCode::TransactionInfoNotProvided,
            ErrorCategory::SdkError,
            "Transaction info was not provided.",
        )
    }

    /// The API refused to tokenize the card that was read.
    pub fn payment_method_cannot_be_tokenized() -> Self {
        Self::new(
            ErrorCode::PaymentMethodCannotBeTokenized.code(),
            ErrorDomain::Api,
            ErrorCategory::ApiError,
            "This payment method cannot be tokenized.",
        )
    }

    pub fn failed_to_get_battery_level() -> Self {
        Self::card_reader(
            ErrorCode::FailedToGetBatteryLevel,
            "Battery level could not be determined.",
        )
    }

    pub fn card_reader_not_connected() -> Self {
        Self::card_reader(
            ErrorCode::CardReaderNotConnectedError,
            "Card reader is not connected.",
        )
    }

    /// Swipe decode failure.
    pub fn card_reader_general() -> Self {
        Self::card_reader(
            ErrorCode::CardReaderGeneralError,
            "Swipe failed due to: (a) uneven swipe speed, (b) fast swipe, (c) slow swipe, or (d) damaged card.",
        )
    }

    pub fn card_reader_general_with_message(message: impl Into<String>) -> Self {
        Self::card_reader(ErrorCode::CardReaderGeneralError, message)
    }

    pub fn card_reader_unknown() -> Self {
        Self::card_reader(ErrorCode::UnknownError, "There was an unexpected error.")
    }

    /// Status failure, including protocol violations by the host.
    pub fn card_reader_status(message: impl Into<String>) -> Self {
        Self::card_reader(ErrorCode::CardReaderStatusError, message)
    }

    pub fn invalid_signature_image(cause: ExternalFailure) -> Self {
        Self::card_reader(
            ErrorCode::InvalidSignatureImageError,
            "Invalid signature image provided.",
        )
        .with_cause(cause)
    }

    pub fn name_not_found() -> Self {
        Self::card_reader(ErrorCode::NameNotFoundError, "Name not found.")
    }

    pub fn invalid_card_reader_selection() -> Self {
        Self::card_reader(
            ErrorCode::InvalidCardReaderSelection,
            "Card reader selection is invalid.",
        )
    }

    pub fn card_reader_battery_too_low() -> Self {
        Self::card_reader(
            ErrorCode::CardReaderBatteryTooLow,
            "The card reader battery does not have enough charge. Please charge before using.",
        )
    }

    pub fn card_reader_unable_to_connect() -> Self {
        Self::card_reader(
            ErrorCode::CardReaderUnableToConnect,
            "Please make sure you're using a supported card reader and that it is fully charged.",
        )
    }
}

impl PartialEq for ErrorRecord {
    fn eq(&self, other: &Self) -> bool {
        self.projection() == other.projection()
    }
}

impl Eq for ErrorRecord {}

impl Hash for ErrorRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.projection().hash(state);
    }
}

/// Renders the canonical projection as a JSON object with a fixed field order.
impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.projection()).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Depth-truncated view of an [`ErrorRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProjection<'a> {
    pub error_domain: &'a str,
    pub error_category: &'a str,
    pub error_code: i64,
    pub error_description: &'a str,
    pub inner_exception: Option<CauseProjection<'a>>,
}

/// Projection of a wrapped cause, without that cause's own cause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum CauseProjection<'a> {
    Record {
        error_domain: &'a str,
        error_category: &'a str,
        error_code: i64,
        error_description: &'a str,
    },
    External {
        kind: &'a str,
        message: &'a str,
    },
}

impl<'a> CauseProjection<'a> {
    fn of(cause: &'a ErrorCause) -> Self {
        match cause {
            ErrorCause::Record(record) => CauseProjection::Record {
                error_domain: record.domain.as_str(),
                error_category: record.category.as_str(),
                error_code: record.code,
                error_description: &record.description,
            },
            ErrorCause::External(failure) => CauseProjection::External {
                kind: &failure.kind,
                message: &failure.message,
            },
        }
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
