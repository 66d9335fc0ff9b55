// Scripted in-memory exchange for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{Exchange, ExchangeError, ExchangeResult};
use crate::models::{
    normalize_symbol, Balance, Candle, MarginMode, Order, OrderBookTop, OrderSide, OrderStatus,
    OrderType, Position, Side, Timeframe,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub reduce_only: bool,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub candles: HashMap<String, Vec<Candle>>,
    pub prices: HashMap<String, f64>,
    pub positions: HashMap<String, Position>,
    pub balance: Balance,
    pub book: OrderBookTop,
    pub markets: HashSet<String>,
    /// Outcomes for upcoming market orders; an empty queue fills
    pub market_results: VecDeque<ExchangeResult<OrderStatus>>,
    /// Outcomes for upcoming limit orders; an empty queue fills
    pub limit_results: VecDeque<ExchangeResult<OrderStatus>>,
    pub candle_errors: VecDeque<ExchangeError>,
    pub balance_errors: VecDeque<ExchangeError>,
    pub position_errors: VecDeque<ExchangeError>,
    /// Filled orders open or reduce positions
    pub fills_move_positions: bool,
    pub orders: Vec<PlacedOrder>,
    pub leverage_calls: Vec<(String, u32)>,
    pub margin_calls: Vec<(String, MarginMode)>,
    pub candle_fetches: u32,
    pub time_syncs: u32,
}

#[derive(Debug, Default)]
pub struct MockExchange {
    pub state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        let exchange = Self::default();
        exchange.with(|s| s.fills_move_positions = true);
        exchange
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_position(&self, symbol: &str, contracts: f64, entry_price: f64) {
        self.with(|s| {
            s.positions.insert(
                symbol.to_string(),
                Position {
                    symbol: symbol.to_string(),
                    side: Side::Long,
                    contracts,
                    entry_price,
                },
            )
        });
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.with(|s| s.orders.clone())
    }

    fn place(&self, placed: PlacedOrder, scripted: Option<ExchangeResult<OrderStatus>>) -> ExchangeResult<Order> {
        let mut state = self.state.lock().unwrap();
        state.orders.push(placed.clone());
        let status = scripted.unwrap_or(Ok(OrderStatus::Filled))?;

        let fill_price = placed
            .price
            .or_else(|| state.prices.get(&placed.symbol).copied())
            .unwrap_or(0.0);

        if status.is_filled() && state.fills_move_positions {
            if placed.reduce_only {
                state.positions.remove(&placed.symbol);
            } else {
                state.positions.insert(
                    placed.symbol.clone(),
                    Position {
                        symbol: placed.symbol.clone(),
                        side: Side::Long,
                        contracts: placed.quantity,
                        entry_price: fill_price,
                    },
                );
            }
        }

        Ok(Order {
            id: state.orders.len().to_string(),
            client_order_id: format!("mock-{}", state.orders.len()),
            symbol: placed.symbol,
            side: placed.side,
            order_type: placed.order_type,
            status,
            executed_qty: if status.is_filled() { placed.quantity } else { 0.0 },
            avg_price: status.is_filled().then_some(fill_price),
        })
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        self.with(|s| {
            s.candle_fetches += 1;
            if let Some(err) = s.candle_errors.pop_front() {
                return Err(err);
            }
            let candles = s.candles.get(&normalize_symbol(symbol)).cloned().unwrap_or_default();
            let skip = candles.len().saturating_sub(limit);
            Ok(candles.into_iter().skip(skip).collect())
        })
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<f64> {
        self.with(|s| {
            s.prices
                .get(&normalize_symbol(symbol))
                .copied()
                .ok_or_else(|| ExchangeError::Rejected {
                    code: -1121,
                    message: format!("Invalid symbol {}", symbol),
                })
        })
    }

    async fn fetch_positions(&self, symbols: &[String]) -> ExchangeResult<Vec<Position>> {
        self.with(|s| {
            if let Some(err) = s.position_errors.pop_front() {
                return Err(err);
            }
            let wanted: HashSet<String> = symbols.iter().map(|sym| normalize_symbol(sym)).collect();
            Ok(s.positions
                .values()
                .filter(|p| wanted.contains(&p.symbol))
                .cloned()
                .collect())
        })
    }

    async fn fetch_balance(&self, _asset: &str) -> ExchangeResult<Balance> {
        self.with(|s| match s.balance_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(s.balance),
        })
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order> {
        let scripted = self.with(|s| s.market_results.pop_front());
        self.place(
            PlacedOrder {
                symbol: normalize_symbol(symbol),
                side,
                order_type: OrderType::Market,
                quantity,
                price: None,
                reduce_only,
            },
            scripted,
        )
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        reduce_only: bool,
    ) -> ExchangeResult<Order> {
        let scripted = self.with(|s| s.limit_results.pop_front());
        self.place(
            PlacedOrder {
                symbol: normalize_symbol(symbol),
                side,
                order_type: OrderType::Limit,
                quantity,
                price: Some(price),
                reduce_only,
            },
            scripted,
        )
    }

    async fn fetch_order_book_top(&self, _symbol: &str) -> ExchangeResult<OrderBookTop> {
        Ok(self.with(|s| s.book))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.with(|s| s.leverage_calls.push((normalize_symbol(symbol), leverage)));
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()> {
        self.with(|s| s.margin_calls.push((normalize_symbol(symbol), mode)));
        Ok(())
    }

    async fn fetch_time(&self) -> ExchangeResult<i64> {
        Ok(0)
    }

    async fn sync_time(&self) -> ExchangeResult<i64> {
        self.with(|s| s.time_syncs += 1);
        Ok(0)
    }

    async fn load_markets(&self) -> ExchangeResult<HashSet<String>> {
        Ok(self.with(|s| s.markets.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
