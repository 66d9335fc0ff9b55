use thiserror::Error;

use crate::api::ExchangeError;

/// Top-level bot error
#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Data quality: {0}")]
    DataQuality(String),

    #[error("Insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Open not confirmed for {symbol}: {reason}")]
    OpenNotConfirmed { symbol: String, reason: String },

    #[error("Close not confirmed for {symbol}: {reason}")]
    CloseNotConfirmed { symbol: String, reason: String },

    #[error("No order book price available for {0}")]
    NoBookPrice(String),

    #[error("Bot is already running")]
    AlreadyRunning,

    #[error("Bot is not running")]
    NotRunning,
}

impl BotError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, BotError::Exchange(e) if e.is_authentication())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
