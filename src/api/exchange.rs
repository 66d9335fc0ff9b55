use async_trait::async_trait;
use std::collections::HashSet;

use super::ExchangeError;
use crate::models::{
    Balance, Candle, MarginMode, Order, OrderBookTop, OrderSide, Position, Timeframe,
};

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Perpetual futures exchange used by the trading engine
///
/// Every call may fail transiently; retry policy is the caller's concern.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Most recent `limit` candles, oldest first. The last one is still forming.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Last traded price
    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<f64>;

    /// Positions for the given symbols, including flat ones
    async fn fetch_positions(&self, symbols: &[String]) -> ExchangeResult<Vec<Position>>;

    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<Balance>;

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order>;

    /// Immediate-or-cancel limit order; any unfilled remainder expires
    async fn create_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order>;

    async fn fetch_order_book_top(&self, symbol: &str) -> ExchangeResult<OrderBookTop>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    /// Idempotent: setting the mode a symbol already uses succeeds
    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()>;

    /// Exchange server time in milliseconds
    async fn fetch_time(&self) -> ExchangeResult<i64>;

    /// Align signed request timestamps with the server clock, returns the offset in ms
    async fn sync_time(&self) -> ExchangeResult<i64>;

    /// Load trading rules and return the set of tradable symbols
    async fn load_markets(&self) -> ExchangeResult<HashSet<String>>;

    fn name(&self) -> &str;
}
