//! Error types for the wager engine
//!
//! Every failure of a transition surfaces as one of these; the transition
//! that produced it leaves no partial state behind.

use crate::common::types::{Address, Amount, Asset, BetId, RequestId};
use thiserror::Error;

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum WagerError {
    #[error("Bet error: {0}")]
    Bet(#[from] BetError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Randomness oracle error: {0}")]
    Oracle(String),
}

impl WagerError {
    /// The bet-level condition behind this error, if any
    pub fn bet_error(&self) -> Option<&BetError> {
        match self {
            WagerError::Bet(e) => Some(e),
            _ => None,
        }
    }
}

/// Lifecycle and policy conditions raised by bet transitions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BetError {
    #[error("bet {0} is not in a state that allows this operation")]
    NotPendingBet(BetId),

    #[error("bet {0} does not fulfil the conditions for this operation yet")]
    NotFulfilled(BetId),

    #[error("asset {0} is not enabled for betting")]
    ForbiddenAsset(Asset),

    #[error("{0} is not allowed to perform this operation")]
    AccessDenied(Address),

    #[error("a non-zero address is required")]
    InvalidAddress,

    #[error("wrong bet amount: expected {expected}, got {actual}")]
    WrongBetAmount { expected: Amount, actual: Amount },

    #[error("{address} is not an eligible opponent of bet {bet_id}")]
    InvalidOpponent { bet_id: BetId, address: Address },

    #[error("bet {bet_id} has {seats} seats, at least {required} required")]
    WrongSeatsNumber { bet_id: BetId, seats: usize, required: usize },

    #[error("bet {bet_id} cannot take {requested} more seats ({current} of {max} taken)")]
    TooManySeats { bet_id: BetId, current: usize, requested: usize, max: usize },

    #[error("{count} item prizes exceed the limit of {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("seat count must be at least one")]
    InvalidSeatCount,

    #[error("betting is paused")]
    Paused,

    #[error("re-entrant call rejected")]
    Reentrancy,

    #[error("bet {0} does not exist")]
    UnknownBet(BetId),

    #[error("no bet is waiting on randomness request {0}")]
    UnknownRequest(RequestId),

    #[error("item {item_id} is not part of lot {lot_index} of bet {bet_id}")]
    UnknownItem { bet_id: BetId, lot_index: usize, item_id: u64 },

    #[error("bet id capacity exhausted")]
    BetIdsExhausted,
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Failures reported by the asset transfer substrate
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{holder} holds {available} of {asset}, {needed} needed")]
    InsufficientBalance { holder: Address, asset: Asset, needed: Amount, available: Amount },

    #[error("item {item_id} of collection {collection} is not owned by {holder}")]
    ItemNotOwned { collection: Address, item_id: u64, holder: Address },

    #[error("transfer to {0} rejected")]
    Rejected(Address),
}

// External error conversions
impl From<rocksdb::Error> for WagerError {
    fn from(e: rocksdb::Error) -> Self {
        WagerError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for WagerError {
    fn from(e: serde_json::Error) -> Self {
        WagerError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<std::io::Error> for WagerError {
    fn from(e: std::io::Error) -> Self {
        WagerError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::de::Error> for WagerError {
    fn from(e: toml::de::Error) -> Self {
        WagerError::Configuration(ConfigurationError::LoadFailed(format!(
            "Failed to parse TOML: {}",
            e
        )))
    }
}

// Convenience type alias for Results
pub type WagerResult<T> = Result<T, WagerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err: WagerError = BetError::NotPendingBet(7).into();
        assert!(err.to_string().contains("Bet error"));
        assert!(err.to_string().contains("bet 7"));
    }

    #[test]
    fn test_wrong_amount_details() {
        let err = BetError::WrongBetAmount { expected: 100, actual: 99 };
        assert!(err.to_string().contains("expected 100"));
        assert!(err.to_string().contains("got 99"));
    }

    #[test]
    fn test_bet_error_accessor() {
        let err: WagerError = BetError::Paused.into();
        assert_eq!(err.bet_error(), Some(&BetError::Paused));

        let err: WagerError = TransferError::Rejected(Address::ZERO).into();
        assert!(err.bet_error().is_none());
    }

    #[test]
    fn test_error_source() {
        let err: WagerError = ConfigurationError::ValidationFailed("x".to_string()).into();
        assert!(err.source().is_some());
    }
}
