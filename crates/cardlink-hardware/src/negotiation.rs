//! Transaction handshake between the host and the reader.
//!
//! Every transaction walks a fixed sequence of steps. Steps marked *host*
//! wait for exactly one answer from the host, delivered with the ticket the
//! host received in the matching request:
//!
//! ```text
//! AwaitingReset (host, only when the reader is configured)
//!     │ reset? ──► ResettingReader
//!     ▼                 │
//! AwaitingTransactionInfo (host) ◄─┘
//!     ▼
//! AwaitingCard
//!     ▼
//! AwaitingEmail (host)
//!     ▼
//! Authorizing ──► Resolved
//! ```
//!
//! Any step may jump to `Resolved` on failure. A [`TransactionNegotiation`]
//! only tracks state; it returns a [`NextAction`] telling the session what to
//! do next and never calls the host itself.
//!
//! # Protocol Violations
//!
//! An answer with a ticket from another transaction is rejected with
//! [`ReaderError::StaleCallback`]. An answer for a step other than the current
//! one, including a second answer to the same step, is rejected with
//! [`ReaderError::HandshakeOutOfOrder`]; the session then fails the
//! transaction if it is still unresolved.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use cardlink_core::{
    AccountId, Amount, CurrencyCode, ErrorRecord, PaymentInfo, TransactionId,
    constants::MAX_HISTORY_SIZE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReaderError, Result};
use crate::response::CardRead;
use crate::timing::TimerHandle;

/// Position of a transaction in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStep {
    /// Waiting for the host to decide whether to reset the reader.
    AwaitingReset,

    /// The reader is being re-armed.
    ResettingReader,

    /// Waiting for amount, currency and account from the host.
    AwaitingTransactionInfo,

    /// Waiting for a card to be presented.
    AwaitingCard,

    /// Waiting for the optional payer email from the host.
    AwaitingEmail,

    /// Waiting for authorization.
    Authorizing,

    /// Success or failure was reported.
    Resolved,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step_str = match self {
            HandshakeStep::AwaitingReset => "AwaitingReset",
            HandshakeStep::ResettingReader => "ResettingReader",
            HandshakeStep::AwaitingTransactionInfo => "AwaitingTransactionInfo",
            HandshakeStep::AwaitingCard => "AwaitingCard",
            HandshakeStep::AwaitingEmail => "AwaitingEmail",
            HandshakeStep::Authorizing => "Authorizing",
            HandshakeStep::Resolved => "Resolved",
        };
        write!(f, "{}", step_str)
    }
}

impl HandshakeStep {
    /// Check if transition to target step is valid from this step.
    pub fn can_transition_to(&self, target: &HandshakeStep) -> bool {
        matches!(
            (self, target),
            (HandshakeStep::AwaitingReset, HandshakeStep::ResettingReader | HandshakeStep::AwaitingTransactionInfo)
            | (HandshakeStep::ResettingReader, HandshakeStep::AwaitingTransactionInfo)
            | (HandshakeStep::AwaitingTransactionInfo, HandshakeStep::AwaitingCard)
            | (HandshakeStep::AwaitingCard, HandshakeStep::AwaitingEmail)
            | (HandshakeStep::AwaitingEmail, HandshakeStep::Authorizing)
        ) || (*self != HandshakeStep::Resolved && *target == HandshakeStep::Resolved)
    }

    /// Whether this step waits for an answer from the host.
    pub fn awaits_host(&self) -> bool {
        matches!(
            self,
            HandshakeStep::AwaitingReset
                | HandshakeStep::AwaitingTransactionInfo
                | HandshakeStep::AwaitingEmail
        )
    }
}

/// Ticket for answering a reset request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResetCallback {
    transaction_id: TransactionId,
}

/// Ticket for answering a transaction info request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionInfoCallback {
    transaction_id: TransactionId,
}

/// Ticket for answering a payer email request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailCallback {
    transaction_id: TransactionId,
}

impl ResetCallback {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

impl TransactionInfoCallback {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

impl EmailCallback {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

/// Validated transaction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub account_id: AccountId,
}

impl TransactionInfo {
    /// Validate raw host input.
    ///
    /// # Errors
    /// Returns the invalid amount, currency or account error, checked in
    /// that order.
    pub fn validate(
        amount: f64,
        currency: CurrencyCode,
        account_id: i64,
        supported: &[CurrencyCode],
    ) -> std::result::Result<Self, ErrorRecord> {
        let amount = Amount::from_major(amount)?;
        if !supported.contains(&currency) {
            return Err(ErrorRecord::invalid_transaction_currency_code());
        }
        let account_id = AccountId::new(account_id)?;
        Ok(Self {
            amount,
            currency,
            account_id,
        })
    }
}

/// What the session must do after a negotiation step.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Ask the host whether to reset the reader.
    RequestReset(ResetCallback),
    /// Re-arm the reader.
    ResetReader,
    /// Ask the host for transaction info.
    RequestTransactionInfo(TransactionInfoCallback),
    /// Wait for a card.
    AwaitCard,
    /// Ask the host for the payer email.
    RequestEmail(EmailCallback),
    /// Authorize the transaction.
    Authorize,
    /// Report success.
    Succeed(Box<PaymentInfo>),
    /// Report failure.
    Fail(ErrorRecord),
}

/// A recorded handshake transition, stamped with logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeTransition {
    pub from: HandshakeStep,
    pub to: HandshakeStep,
    pub at: Duration,
}

/// State of one transaction.
#[derive(Debug)]
pub struct TransactionNegotiation {
    id: TransactionId,
    step: HandshakeStep,
    info: Option<TransactionInfo>,
    email: Option<String>,
    card: Option<CardRead>,
    outcome: Option<std::result::Result<(), ErrorRecord>>,
    history: VecDeque<HandshakeTransition>,
    timer: Option<TimerHandle>,
}

impl TransactionNegotiation {
    /// Start a transaction.
    ///
    /// The reset request is only issued when `reset_required` is set.
    pub fn start(reset_required: bool) -> (Self, NextAction) {
        let id = TransactionId::new();
        let step = if reset_required {
            HandshakeStep::AwaitingReset
        } else {
            HandshakeStep::AwaitingTransactionInfo
        };
        let negotiation = Self {
            id,
            step,
            info: None,
            email: None,
            card: None,
            outcome: None,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            timer: None,
        };
        let action = if reset_required {
            NextAction::RequestReset(ResetCallback { transaction_id: id })
        } else {
            NextAction::RequestTransactionInfo(TransactionInfoCallback { transaction_id: id })
        };
        debug!("Transaction {} started at {}", id, step);
        (negotiation, action)
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    pub fn is_resolved(&self) -> bool {
        self.step == HandshakeStep::Resolved
    }

    pub fn info(&self) -> Option<&TransactionInfo> {
        self.info.as_ref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn card(&self) -> Option<&CardRead> {
        self.card.as_ref()
    }

    /// `Some(Ok(()))` after success, `Some(Err(_))` after failure.
    pub fn outcome(&self) -> Option<&std::result::Result<(), ErrorRecord>> {
        self.outcome.as_ref()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<HandshakeTransition> {
        &self.history
    }

    /// Attach the timer of the current step, returning the previous one.
    pub fn replace_timer(&mut self, handle: Option<TimerHandle>) -> Option<TimerHandle> {
        std::mem::replace(&mut self.timer, handle)
    }

    /// Take the timer of the current step.
    pub fn take_timer(&mut self) -> Option<TimerHandle> {
        self.timer.take()
    }

    /// Apply the host's reset decision.
    pub fn answer_reset(
        &mut self,
        ticket: &ResetCallback,
        should_reset: bool,
        at: Duration,
    ) -> Result<NextAction> {
        self.check(ticket.transaction_id, HandshakeStep::AwaitingReset)?;
        if should_reset {
            self.advance(HandshakeStep::ResettingReader, at)?;
            Ok(NextAction::ResetReader)
        } else {
            self.advance(HandshakeStep::AwaitingTransactionInfo, at)?;
            Ok(self.request_info())
        }
    }

    /// Apply the end of a reader reset.
    pub fn reset_finished(&mut self, at: Duration) -> Result<NextAction> {
        self.expect(HandshakeStep::ResettingReader, HandshakeStep::AwaitingTransactionInfo)?;
        self.advance(HandshakeStep::AwaitingTransactionInfo, at)?;
        Ok(self.request_info())
    }

    /// Apply the host's transaction info.
    ///
    /// Invalid values resolve the transaction with the matching error.
    pub fn answer_transaction_info(
        &mut self,
        ticket: &TransactionInfoCallback,
        amount: f64,
        currency: CurrencyCode,
        account_id: i64,
        supported: &[CurrencyCode],
        at: Duration,
    ) -> Result<NextAction> {
        self.check(ticket.transaction_id, HandshakeStep::AwaitingTransactionInfo)?;
        match TransactionInfo::validate(amount, currency, account_id, supported) {
            Ok(info) => {
                self.info = Some(info);
                self.advance(HandshakeStep::AwaitingCard, at)?;
                Ok(NextAction::AwaitCard)
            }
            Err(error) => self.resolve_failure(error, at),
        }
    }

    /// Apply the decoded card read.
    pub fn card_read(
        &mut self,
        read: std::result::Result<CardRead, ErrorRecord>,
        at: Duration,
    ) -> Result<NextAction> {
        self.expect(HandshakeStep::AwaitingCard, HandshakeStep::AwaitingEmail)?;
        match read {
            Ok(card) => {
                self.card = Some(card);
                self.advance(HandshakeStep::AwaitingEmail, at)?;
                Ok(NextAction::RequestEmail(EmailCallback {
                    transaction_id: self.id,
                }))
            }
            Err(error) => self.resolve_failure(error, at),
        }
    }

    /// Apply the host's payer email.
    pub fn answer_email(
        &mut self,
        ticket: &EmailCallback,
        email: Option<String>,
        at: Duration,
    ) -> Result<NextAction> {
        self.check(ticket.transaction_id, HandshakeStep::AwaitingEmail)?;
        self.email = email;
        self.advance(HandshakeStep::Authorizing, at)?;
        Ok(NextAction::Authorize)
    }

    /// Apply the authorization decision.
    pub fn authorized(
        &mut self,
        decision: std::result::Result<PaymentInfo, ErrorRecord>,
        at: Duration,
    ) -> Result<NextAction> {
        self.expect(HandshakeStep::Authorizing, HandshakeStep::Resolved)?;
        match decision {
            Ok(info) => {
                self.advance(HandshakeStep::Resolved, at)?;
                self.outcome = Some(Ok(()));
                debug!("Transaction {} approved", self.id);
                Ok(NextAction::Succeed(Box::new(info)))
            }
            Err(error) => self.resolve_failure(error, at),
        }
    }

    /// Fail the transaction if it is unresolved.
    ///
    /// Returns the error to report, or `None` if it was already resolved.
    pub fn fail(&mut self, error: ErrorRecord, at: Duration) -> Option<ErrorRecord> {
        if self.is_resolved() {
            return None;
        }
        match self.resolve_failure(error, at) {
            Ok(NextAction::Fail(error)) => Some(error),
            _ => None,
        }
    }

    fn resolve_failure(&mut self, error: ErrorRecord, at: Duration) -> Result<NextAction> {
        self.advance(HandshakeStep::Resolved, at)?;
        debug!("Transaction {} failed: {}", self.id, error.description());
        self.outcome = Some(Err(error.clone()));
        Ok(NextAction::Fail(error))
    }

    fn request_info(&self) -> NextAction {
        NextAction::RequestTransactionInfo(TransactionInfoCallback {
            transaction_id: self.id,
        })
    }

    fn check(&self, ticket: TransactionId, expected: HandshakeStep) -> Result<()> {
        if ticket != self.id {
            warn!("Stale ticket for transaction {}", ticket);
            return Err(ReaderError::StaleCallback {
                transaction_id: ticket,
            });
        }
        if self.step != expected {
            warn!(
                "Answer for {} while transaction {} is at {}",
                expected, self.id, self.step
            );
            return Err(ReaderError::out_of_order(self.step, expected));
        }
        Ok(())
    }

    fn expect(&self, current: HandshakeStep, next: HandshakeStep) -> Result<()> {
        if self.step != current {
            return Err(ReaderError::out_of_order(self.step, next));
        }
        Ok(())
    }

    fn advance(&mut self, to: HandshakeStep, at: Duration) -> Result<()> {
        if !self.step.can_transition_to(&to) {
            return Err(ReaderError::out_of_order(self.step, to));
        }
        self.history.push_back(HandshakeTransition {
            from: self.step,
            to,
            at,
        });
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.step = to;
        Ok(())
    }
}
