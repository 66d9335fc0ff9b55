use thiserror::Error;

/// Binance rejects orders priced outside the PERCENT_PRICE band with this code
pub const PERCENT_PRICE_CODE: i64 = -4131;
/// Returned when setting a margin type the symbol already uses
pub const NO_NEED_TO_CHANGE_MARGIN_CODE: i64 = -4046;

/// Failure of a single exchange call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timestamp outside recv window: {0}")]
    Timestamp(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Price band violation ({code}): {message}")]
    PriceBand { code: i64, message: String },

    #[error("Insufficient margin: {0}")]
    InsufficientMargin(String),

    #[error("Exchange rejected request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ExchangeError {
    /// Classify an API error payload `{ "code": .., "msg": .. }`
    pub fn from_api(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            PERCENT_PRICE_CODE => ExchangeError::PriceBand { code, message },
            -1021 => ExchangeError::Timestamp(message),
            -1003 => ExchangeError::RateLimited(message),
            -2014 | -2015 | -1022 => ExchangeError::Authentication(message),
            -2018 | -2019 => ExchangeError::InsufficientMargin(message),
            _ => ExchangeError::Rejected { code, message },
        }
    }

    /// Throttling and connectivity problems worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::RateLimited(_) | ExchangeError::Timestamp(_)
        )
    }

    pub fn is_price_band(&self) -> bool {
        matches!(self, ExchangeError::PriceBand { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ExchangeError::Authentication(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExchangeError::Decode(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Decode(err.to_string())
    }
}
