use std::sync::Arc;

use super::retry::RetryPolicy;
use crate::api::{Exchange, ExchangeError};
use crate::error::BotError;
use crate::models::{normalize_symbol, MarginMode, Order, OrderSide, Position, Side};
use crate::Result;

/// Limit fallback prices sit this far through the top of book
pub const LIMIT_FALLBACK_SLIPPAGE: f64 = 0.001;

/// Places open and close orders and confirms them against exchange state
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    close_policy: RetryPolicy,
    confirm_policy: RetryPolicy,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            exchange,
            close_policy: RetryPolicy::close_order(),
            confirm_policy: RetryPolicy::open_confirmation(),
        }
    }

    pub fn with_policies(mut self, close_policy: RetryPolicy, confirm_policy: RetryPolicy) -> Self {
        self.close_policy = close_policy;
        self.confirm_policy = confirm_policy;
        self
    }

    /// Cross margin and the configured leverage; safe to repeat
    pub async fn prepare_symbol(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.exchange.set_margin_mode(symbol, MarginMode::Cross).await?;
        self.exchange.set_leverage(symbol, leverage).await?;
        tracing::debug!("{} set to cross margin at {}x", symbol, leverage);
        Ok(())
    }

    /// Live non-flat position for `symbol`, if any
    pub async fn find_position(&self, symbol: &str) -> Result<Option<Position>> {
        let wanted = normalize_symbol(symbol);
        let positions = self.exchange.fetch_positions(&[symbol.to_string()]).await?;
        Ok(positions
            .into_iter()
            .find(|p| normalize_symbol(&p.symbol) == wanted && p.is_open()))
    }

    /// Single-shot market buy, confirmed by re-reading positions
    ///
    /// The exchange-reported position wins over the order response, and is
    /// adopted even when the order call itself errored. A `FILLED` response
    /// is trusted when no position can be read back.
    pub async fn place_open(&self, symbol: &str, quantity: f64, reference_price: f64) -> Result<Position> {
        let order = self
            .exchange
            .create_market_order(symbol, OrderSide::Buy, quantity, false)
            .await;

        match &order {
            Ok(order) => tracing::info!(
                "Market buy sent for {}: qty {} status {:?}",
                symbol,
                quantity,
                order.status
            ),
            Err(e) => tracing::warn!(
                "Market buy for {} failed: {}. Checking exchange for a position",
                symbol,
                e
            ),
        }

        let confirmed = self
            .confirm_policy
            .run("Open confirmation", |_| true, move |_| async move {
                match self.find_position(symbol).await? {
                    Some(position) => Ok(position),
                    None => Err(BotError::OpenNotConfirmed {
                        symbol: symbol.to_string(),
                        reason: "no position reported".to_string(),
                    }),
                }
            })
            .await;

        match (confirmed, order) {
            (Ok(position), _) => {
                tracing::info!(
                    "✓ Position confirmed for {}: {} @ {}",
                    symbol,
                    position.contracts,
                    position.entry_price
                );
                Ok(position)
            }
            (Err(confirm_err), Ok(order)) if order.status.is_filled() => {
                tracing::warn!(
                    "Position not readable for {} ({}), trusting filled order {}",
                    symbol,
                    confirm_err,
                    order.id
                );
                Ok(Position {
                    symbol: normalize_symbol(symbol),
                    side: Side::Long,
                    contracts: if order.executed_qty > 0.0 { order.executed_qty } else { quantity },
                    entry_price: order.avg_price.unwrap_or(reference_price),
                })
            }
            (Err(_), Ok(order)) => Err(BotError::OpenNotConfirmed {
                symbol: symbol.to_string(),
                reason: format!("order {} ended {:?}", order.id, order.status),
            }),
            (Err(_), Err(order_err)) => Err(order_err.into()),
        }
    }

    /// Reduce-only close of `amount` contracts with a limit fallback
    ///
    /// Up to the policy's attempts of market orders, retrying only price-band
    /// rejections. When every attempt hit the band, one immediate-or-cancel
    /// limit order is placed just through the top of book, so nothing is left
    /// resting. Only a `FILLED` order counts as closed.
    pub async fn place_close(&self, symbol: &str, side: Side, amount: f64, leverage: u32) -> Result<Order> {
        self.prepare_symbol(symbol, leverage).await?;
        let order_side = side.closing_order();

        let market = self
            .close_policy
            .run("Market close", ExchangeError::is_price_band, move |_| {
                self.exchange.create_market_order(symbol, order_side, amount, true)
            })
            .await;

        let order = match market {
            Ok(order) => order,
            Err(e) if e.is_price_band() => {
                tracing::warn!(
                    "Market close for {} kept hitting the price band, falling back to limit",
                    symbol
                );
                self.place_limit_fallback(symbol, order_side, amount).await?
            }
            Err(e) => {
                tracing::error!("Market close for {} aborted: {}", symbol, e);
                return Err(e.into());
            }
        };

        if !order.status.is_filled() {
            return Err(BotError::CloseNotConfirmed {
                symbol: symbol.to_string(),
                reason: format!("order {} is {:?}", order.id, order.status),
            });
        }

        tracing::info!(
            "✓ Closed {} {} of {} (order {})",
            order_side.as_str(),
            amount,
            symbol,
            order.id
        );
        Ok(order)
    }

    async fn place_limit_fallback(&self, symbol: &str, side: OrderSide, amount: f64) -> Result<Order> {
        let book = self.exchange.fetch_order_book_top(symbol).await?;
        let price = match side {
            OrderSide::Sell => book.best_bid.map(|bid| bid * (1.0 - LIMIT_FALLBACK_SLIPPAGE)),
            OrderSide::Buy => book.best_ask.map(|ask| ask * (1.0 + LIMIT_FALLBACK_SLIPPAGE)),
        }
        .ok_or_else(|| BotError::NoBookPrice(symbol.to_string()))?;

        tracing::info!("Placing limit {} for {} at {}", side.as_str(), symbol, price);
        Ok(self
            .exchange
            .create_limit_order(symbol, side, amount, price, true)
            .await?)
    }

    /// Close every non-flat position on `symbols`
    ///
    /// Individual failures are logged and skipped; the filled orders are returned.
    pub async fn close_all(&self, symbols: &[String], leverage: u32) -> Result<Vec<Order>> {
        let positions = self.exchange.fetch_positions(symbols).await?;
        let mut closed = Vec::new();

        for position in positions.into_iter().filter(Position::is_open) {
            tracing::info!(
                "Closing {:?} position on {}: {} contracts",
                position.side,
                position.symbol,
                position.contracts
            );
            match self
                .place_close(&position.symbol, position.side, position.contracts, leverage)
                .await
            {
                Ok(order) => closed.push(order),
                Err(e) => tracing::error!("Failed to close {}: {}", position.symbol, e),
            }
        }

        Ok(closed)
    }
}
