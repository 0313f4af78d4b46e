use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingStatus, ParseDateError, ParseTimeError, ParticipantClass};

/// Caller-facing classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any state was touched.
    Validation,
    NotFound,
    /// The request is well-formed but current state forbids it.
    Conflict,
    /// Lock contention outlasted the retry budget.
    Concurrency,
    /// Storage failure. Nothing from the failed operation is visible.
    Fatal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no price for {class} at {duration} minutes")]
    UnpricedDuration { class: ParticipantClass, duration: u32 },
    #[error("slot not found: {0}")]
    SlotNotFound(Ulid),
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("no schedule override for {0}")]
    OverrideNotFound(NaiveDate),
    #[error("not enough spots: {available} available, {requested} requested")]
    InsufficientCapacity { available: u32, requested: u32 },
    #[error("slot {0} is blocked")]
    SlotBlocked(Ulid),
    #[error("slot {0} is already blocked")]
    SlotAlreadyBlocked(Ulid),
    #[error("slot {0} is not blocked")]
    SlotNotBlocked(Ulid),
    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Ulid),
    #[error("booking {0} is already completed")]
    AlreadyCompleted(Ulid),
    #[error("booking {0} belongs to another user")]
    NotOwner(Ulid),
    #[error("contended: {0}")]
    Contended(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::UnpricedDuration { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::SlotNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::OverrideNotFound(_) => ErrorKind::NotFound,
            EngineError::InsufficientCapacity { .. }
            | EngineError::SlotBlocked(_)
            | EngineError::SlotAlreadyBlocked(_)
            | EngineError::SlotNotBlocked(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::AlreadyCompleted(_)
            | EngineError::NotOwner(_) => ErrorKind::Conflict,
            EngineError::Contended(_) => ErrorKind::Concurrency,
            EngineError::WalError(_) => ErrorKind::Fatal,
        }
    }

    /// Short label for the rejection counter.
    pub fn reason_label(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::UnpricedDuration { .. } => "unpriced_duration",
            EngineError::SlotNotFound(_) => "slot_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::OverrideNotFound(_) => "override_not_found",
            EngineError::InsufficientCapacity { .. } => "insufficient_capacity",
            EngineError::SlotBlocked(_) => "slot_blocked",
            EngineError::SlotAlreadyBlocked(_) => "slot_already_blocked",
            EngineError::SlotNotBlocked(_) => "slot_not_blocked",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::AlreadyCompleted(_) => "already_completed",
            EngineError::NotOwner(_) => "not_owner",
            EngineError::Contended(_) => "contended",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl From<ParseDateError> for EngineError {
    fn from(e: ParseDateError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<ParseTimeError> for EngineError {
    fn from(e: ParseTimeError) -> Self {
        EngineError::Validation(e.to_string())
    }
}
