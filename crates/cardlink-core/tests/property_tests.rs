//! Property-based tests for the error model and monetary values.
//!
//! These tests use proptest to generate random inputs and verify that the
//! equality, hashing and rounding invariants hold across the input space.

use cardlink_core::{
    Amount, ErrorCategory, ErrorDomain, ErrorRecord, ExternalFailure, constants::UNKNOWN_ERROR_CODE,
};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of(record: &ErrorRecord) -> u64 {
    let mut hasher = DefaultHasher::new();
    record.hash(&mut hasher);
    hasher.finish()
}

/// Strategy for generating error domains.
fn any_domain() -> impl Strategy<Value = ErrorDomain> {
    prop_oneof![Just(ErrorDomain::Api), Just(ErrorDomain::Sdk)]
}

/// Strategy for generating error categories.
fn any_category() -> impl Strategy<Value = ErrorCategory> {
    prop_oneof![
        Just(ErrorCategory::CardReaderError),
        Just(ErrorCategory::ApiError),
        Just(ErrorCategory::SdkError),
    ]
}

/// Strategy for generating cause-free records.
fn any_record() -> impl Strategy<Value = ErrorRecord> {
    (any::<i64>(), any_domain(), any_category(), ".{0,40}").prop_map(
        |(code, domain, category, description)| {
            ErrorRecord::new(code, domain, category, description)
        },
    )
}

proptest! {
    /// Property: Structurally identical records are equal and hash alike.
    #[test]
    fn prop_equal_records_hash_equal(record in any_record()) {
        let copy = ErrorRecord::new(
            record.code(),
            record.domain(),
            record.category(),
            record.description(),
        );

        prop_assert_eq!(&record, &copy);
        prop_assert_eq!(hash_of(&record), hash_of(&copy));
        prop_assert_eq!(record.to_string(), copy.to_string());
    }

    /// Property: The cause of a cause never affects equality.
    #[test]
    fn prop_cause_of_cause_ignored(
        outer in any_record(),
        inner in any_record(),
        deep_a in any_record(),
        deep_b in any_record(),
    ) {
        let a = outer.clone().with_cause(inner.clone().with_cause(deep_a));
        let b = outer.with_cause(inner.with_cause(deep_b));

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash_of(&a), hash_of(&b));
    }

    /// Property: Deeply nested chains still compare and print.
    #[test]
    fn prop_deep_chain_terminates(depth in 1usize..200) {
        let mut record = ErrorRecord::card_reader_unknown();
        for _ in 0..depth {
            record = ErrorRecord::card_reader_timeout().with_cause(record);
        }

        prop_assert_eq!(&record, &record.clone());
        prop_assert!(!record.to_string().is_empty());
    }

    /// Property: Payloads with any integer code keep the code and default the rest.
    #[test]
    fn prop_payload_code_preserved(code in any::<i64>()) {
        let payload = serde_json::json!({ "error_code": code });
        let error = ErrorRecord::from_api_payload(&payload, ExternalFailure::new("http", "x"));

        prop_assert_eq!(error.code(), code);
        prop_assert_eq!(error.domain(), ErrorDomain::Api);
        prop_assert_eq!(error.category(), ErrorCategory::ApiError);
    }

    /// Property: Arbitrary response bodies never panic.
    #[test]
    fn prop_response_body_never_panics(body in ".{0,80}") {
        let error = ErrorRecord::from_api_response(&body, ExternalFailure::new("http", "x"));
        prop_assert!(error.cause().is_some());
    }

    /// Property: Whole-cent amounts survive the major-unit conversion.
    #[test]
    fn prop_amount_whole_cents_exact(cents in 1i64..10_000_000) {
        let major = cents as f64 / 100.0;
        let amount = Amount::from_major(major).unwrap();

        prop_assert_eq!(amount.cents(), cents);
    }

    /// Property: Rounding never moves an amount by more than half a cent.
    #[test]
    fn prop_amount_rounding_bounded(value in 0.01f64..1_000_000.0) {
        let amount = Amount::from_major(value).unwrap();
        let diff = (amount.as_major() - value).abs();

        prop_assert!(diff <= 0.005 + 1e-9, "diff {} for {}", diff, value);
    }

    /// Property: Non-positive amounts are always rejected.
    #[test]
    fn prop_amount_non_positive_rejected(value in -1_000_000.0f64..=0.0) {
        prop_assert!(Amount::from_major(value).is_err());
    }
}

#[test]
fn test_empty_payload_uses_unknown_code() {
    let error = ErrorRecord::from_api_payload(
        &serde_json::Value::Null,
        ExternalFailure::new("http", "timeout"),
    );
    assert_eq!(error.code(), UNKNOWN_ERROR_CODE);
}
