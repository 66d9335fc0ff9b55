// Core modules
pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{BinanceFuturesClient, Exchange, ExchangeError, ExchangeResult};
pub use bot::{AccountSummary, Bot, BotStatus, PollOutcome, Session, SessionReport};
pub use config::{ParamsSource, Settings, TradingConfig};
pub use models::*;

// Error handling
pub use error::{BotError, Result};
