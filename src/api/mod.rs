pub mod binance;
pub mod error;
pub mod exchange;

pub use binance::{BinanceFuturesClient, SymbolRules, BINANCE_FUTURES_API};
pub use error::ExchangeError;
pub use exchange::{Exchange, ExchangeResult};

#[cfg(test)]
pub(crate) mod mock;
