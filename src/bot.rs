// Trading orchestrator
// Drives one cooperative flow: wait for a candle close, scan the selected
// symbols for an entry, and once a trade is open poll it until it exits.
// At most one trade is active at a time.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{Exchange, ExchangeError};
use crate::config::{EngineSettings, ParamsSource, TradingConfig};
use crate::error::BotError;
use crate::execution::{
    evaluate_exit, realized_pnl, round2, ActiveTrade, ExitReason, ExitThresholds, OrderExecutor,
    RetryPolicy, TradeLedger, TradePhase, TradeRecord, TradeStats,
};
use crate::indicators::attach_emas;
use crate::models::{normalize_symbol, Balance, Candle, Order, OrderSide, Side, Timeframe};
use crate::notify::{messages, Notifier};
use crate::risk::size_position;
use crate::strategy::{EntrySignalDetector, ExitSignalDetector, ExitState};
use crate::Result;

/// Mutable state of one trading session
#[derive(Debug, Default)]
pub struct Session {
    pub running: bool,
    pub entry: EntrySignalDetector,
    pub exit_state: ExitState,
    pub active_trade: Option<ActiveTrade>,
    /// Exit that fired but whose close was not confirmed; retried every poll
    pub pending_exit: Option<ExitReason>,
    /// Consecutive polls without an exchange-reported position
    pub missing_polls: u32,
    pub ledger: TradeLedger,
    /// Total quote balance captured at start
    pub start_balance: f64,
    pub valid_symbols: HashSet<String>,
    pub timeframe: Option<Timeframe>,
}

impl Session {
    /// Clear everything but the ledger and the start balance, which stay
    /// readable after a stop
    fn reset(&mut self) {
        self.running = false;
        self.entry.clear_all();
        self.exit_state.reset();
        self.active_trade = None;
        self.pending_exit = None;
        self.missing_polls = 0;
        self.valid_symbols.clear();
        self.timeframe = None;
    }

    fn clear_trade(&mut self) {
        self.active_trade = None;
        self.pending_exit = None;
        self.exit_state.reset();
        self.missing_polls = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionReport {
    pub start_balance: f64,
    pub end_balance: f64,
    pub net_pl_usdt: f64,
    pub net_pl_pct: f64,
    pub trades: usize,
    pub leverage: u32,
}

impl SessionReport {
    pub fn new(start_balance: f64, end_balance: f64, trades: usize, leverage: u32) -> Self {
        let net_pl_usdt = end_balance - start_balance;
        let net_pl_pct = if start_balance > 0.0 {
            net_pl_usdt / start_balance * 100.0
        } else {
            -100.0
        };
        Self {
            start_balance,
            end_balance,
            net_pl_usdt,
            net_pl_pct,
            trades,
            leverage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountSummary {
    pub balance: f64,
    pub margin_used: f64,
    pub equity: f64,
    pub margin_used_pct: f64,
}

impl From<Balance> for AccountSummary {
    fn from(balance: Balance) -> Self {
        let equity = balance.total + balance.used;
        Self {
            balance: balance.total,
            margin_used: balance.used,
            equity,
            margin_used_pct: if equity > 0.0 {
                balance.used / equity * 100.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotStatus {
    pub running: bool,
    pub timeframe: Timeframe,
    pub active_trade: Option<(String, TradePhase)>,
}

/// Result of a single monitoring poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No trade to monitor
    Idle,
    /// Trade stays open
    Holding,
    Closed(TradeRecord),
    /// The exchange stopped reporting the position
    Vanished,
}

pub struct Bot {
    exchange: Arc<dyn Exchange>,
    executor: OrderExecutor,
    notifier: Arc<dyn Notifier>,
    params: Box<dyn ParamsSource>,
    engine: EngineSettings,
    market_data_policy: RetryPolicy,
    session: Session,
}

impl Bot {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        params: Box<dyn ParamsSource>,
        engine: EngineSettings,
    ) -> Self {
        Self {
            executor: OrderExecutor::new(exchange.clone()),
            exchange,
            notifier,
            params,
            engine,
            market_data_policy: RetryPolicy::market_data(),
            session: Session::default(),
        }
    }

    /// Override the retry policies for market data, close orders and open confirmation
    pub fn with_retry_policies(
        mut self,
        market_data: RetryPolicy,
        close: RetryPolicy,
        confirm: RetryPolicy,
    ) -> Self {
        self.market_data_policy = market_data;
        self.executor = OrderExecutor::new(self.exchange.clone()).with_policies(close, confirm);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.session.ledger
    }

    pub fn trade_stats(&self) -> TradeStats {
        self.session.ledger.stats()
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    pub fn status(&self) -> BotStatus {
        BotStatus {
            running: self.session.running,
            timeframe: self
                .session
                .timeframe
                .unwrap_or_else(|| self.params.snapshot().params.timeframe),
            active_trade: self
                .session
                .active_trade
                .as_ref()
                .map(|trade| (trade.symbol.clone(), trade.phase)),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.session.running {
            return Err(BotError::AlreadyRunning);
        }
        let config = self.params.snapshot();
        tracing::info!("🚀 Starting on {}", self.exchange.name());

        self.sync_time().await;

        self.session.valid_symbols = match self.exchange.load_markets().await {
            Ok(symbols) => symbols,
            Err(e) => {
                tracing::warn!("Failed to load markets ({}), trusting configured coins", e);
                config.selected_coins.iter().map(|s| normalize_symbol(s)).collect()
            }
        };
        let coins = self.tradable_coins(&config);
        if coins.is_empty() {
            tracing::warn!("None of the selected coins are tradable");
        }

        match self.executor.close_all(&coins, config.params.leverage).await {
            Ok(orders) => {
                for order in orders {
                    self.notify_closed_existing(&order);
                }
            }
            Err(e) => tracing::error!("Error clearing existing positions: {}", e),
        }

        let start_balance = match self.fetch_balance().await {
            Ok(balance) => balance.total,
            Err(e) if e.is_authentication() => {
                self.notifier
                    .send(messages::error_message("Failed to start bot", &e));
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Error fetching start balance: {}", e);
                0.0
            }
        };

        self.session.start_balance = start_balance;
        self.session.timeframe = Some(config.params.timeframe);
        self.session.running = true;

        tracing::info!(
            "✅ Bot started with {:.2} {} on {} coins",
            start_balance,
            self.engine.quote_asset,
            coins.len()
        );
        self.notifier.send(messages::start_message(
            start_balance,
            &config.params,
            &coins,
            Utc::now(),
        ));
        Ok(())
    }

    /// One decision cycle, run after each candle close
    pub async fn run_cycle(&mut self) -> Result<()> {
        if !self.session.running {
            return Err(BotError::NotRunning);
        }

        if self.session.active_trade.is_none() {
            self.scan_for_entry().await?;
        }
        if self.session.active_trade.is_some() {
            self.monitor_active_trade().await;
        }
        Ok(())
    }

    /// Walk the selected symbols in order until one opens a trade
    pub async fn scan_for_entry(&mut self) -> Result<()> {
        let config = self.params.snapshot();
        if self.session.timeframe != Some(config.params.timeframe) {
            tracing::info!(
                "Timeframe changed to {}, clearing entry state",
                config.params.timeframe
            );
            self.session.entry.clear_all();
            self.session.timeframe = Some(config.params.timeframe);
        }

        for symbol in self.tradable_coins(&config) {
            if self.session.active_trade.is_some() {
                break;
            }
            if let Err(e) = self.process_symbol(&symbol, &config).await {
                tracing::error!(symbol = %symbol, "Error processing symbol: {}", e);
                if e.is_authentication() {
                    self.notifier
                        .send(messages::error_message(&format!("Error on {}", symbol), &e));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn process_symbol(&mut self, symbol: &str, config: &TradingConfig) -> Result<()> {
        let params = &config.params;
        let candles = self.fetch_candles(symbol, params.timeframe).await?;
        if candles.is_empty() {
            tracing::warn!(symbol, "No candle data");
            return Ok(());
        }

        let rows = attach_emas(&candles, params.ema1, params.ema2, params.ema3);
        let has_active_trade = self.session.active_trade.is_some();
        match self.session.entry.evaluate(symbol, &rows, has_active_trade) {
            Some(signal) => self.enter_trade(symbol, signal.price, config).await,
            None => Ok(()),
        }
    }

    async fn enter_trade(&mut self, symbol: &str, entry_price: f64, config: &TradingConfig) -> Result<()> {
        let params = &config.params;
        let balance = self.fetch_balance().await?;

        let size = match size_position(balance.free, params.leverage, entry_price, self.engine.min_notional) {
            Ok(size) => size,
            Err(BotError::InsufficientFunds {
                required,
                available,
            }) => {
                tracing::warn!(symbol, required, available, "Insufficient margin, skipping entry");
                self.notifier.send(messages::insufficient_margin_message(
                    symbol, required, available,
                ));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.executor.prepare_symbol(symbol, params.leverage).await?;
        self.notifier.send(messages::entry_message(
            symbol,
            entry_price,
            &size,
            balance.free,
            params,
        ));

        let mut trade = ActiveTrade::opening(symbol, entry_price, size.quantity, params.leverage, Utc::now());
        self.session.active_trade = Some(trade.clone());

        match self.executor.place_open(symbol, size.quantity, entry_price).await {
            Ok(position) => {
                trade.reconcile(&position);
                trade.phase = TradePhase::Open;
                tracing::info!(
                    symbol,
                    "📈 Trade open: {} @ {} ({}x)",
                    trade.size,
                    trade.entry_price,
                    trade.leverage
                );
                self.session.active_trade = Some(trade);
                self.session.exit_state.reset();
                self.session.pending_exit = None;
                self.session.missing_polls = 0;
                Ok(())
            }
            Err(e) => {
                tracing::error!(symbol, "Failed to open long: {}", e);
                self.session.clear_trade();
                self.notifier.send(messages::error_message(
                    &format!("Failed to open long on {}", symbol),
                    &e,
                ));
                Err(e)
            }
        }
    }

    /// Poll the active trade every `poll_interval_secs` until it ends or the bot stops
    pub async fn monitor_active_trade(&mut self) {
        let interval = Duration::from_secs(self.engine.poll_interval_secs);
        while self.session.running && self.session.active_trade.is_some() {
            match self.poll_active_trade().await {
                Ok(PollOutcome::Holding) => {}
                Ok(_) => break,
                Err(e) => {
                    let symbol = self
                        .session
                        .active_trade
                        .as_ref()
                        .map(|t| t.symbol.clone())
                        .unwrap_or_default();
                    tracing::error!(symbol = %symbol, "Error monitoring trade: {}", e);
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// A single monitoring poll of the active trade
    pub async fn poll_active_trade(&mut self) -> Result<PollOutcome> {
        let Some(mut trade) = self.session.active_trade.clone() else {
            return Ok(PollOutcome::Idle);
        };
        let config = self.params.snapshot();
        let symbol = trade.symbol.clone();

        let price = self.exchange.fetch_ticker(&symbol).await?;
        let Some(position) = self.executor.find_position(&symbol).await? else {
            self.session.missing_polls += 1;
            let polls = self.session.missing_polls;
            if polls >= self.engine.missing_position_polls {
                tracing::warn!(symbol = %symbol, polls, "Position gone, clearing trade");
                self.session.clear_trade();
                self.notifier
                    .send(messages::position_vanished_message(&symbol, polls));
                return Ok(PollOutcome::Vanished);
            }
            tracing::debug!(symbol = %symbol, polls, "No position reported");
            return Ok(PollOutcome::Holding);
        };

        self.session.missing_polls = 0;
        trade.reconcile(&position);
        self.session.active_trade = Some(trade.clone());

        let params = &config.params;
        let candles = match self.fetch_candles(&symbol, params.timeframe).await {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(symbol = %symbol, "Candles unavailable for exit check: {}", e);
                Vec::new()
            }
        };
        let rows = attach_emas(&candles, params.ema1, params.ema2, params.ema3);

        let thresholds = ExitThresholds::from(params);
        let elapsed = trade.elapsed_minutes(Utc::now());
        tracing::debug!(
            symbol = %symbol,
            price,
            entry = trade.entry_price,
            elapsed_minutes = elapsed,
            "Polling trade"
        );

        // The detector resets once it fires, so an unconfirmed exit is
        // carried on the session until a close goes through
        let detector = ExitSignalDetector::new();
        let exit_state = &mut self.session.exit_state;
        let reason = evaluate_exit(trade.side, trade.entry_price, price, elapsed, &thresholds, || {
            detector.evaluate(&rows, exit_state)
        })
        .or(self.session.pending_exit);

        match reason {
            Some(reason) => self.close_active_trade(trade, price, reason).await,
            None => Ok(PollOutcome::Holding),
        }
    }

    async fn close_active_trade(
        &mut self,
        mut trade: ActiveTrade,
        price: f64,
        reason: ExitReason,
    ) -> Result<PollOutcome> {
        tracing::info!(symbol = %trade.symbol, price, "Exit triggered: {}", reason);
        trade.phase = TradePhase::Closing;
        self.session.active_trade = Some(trade.clone());

        if let Err(e) = self
            .executor
            .place_close(&trade.symbol, trade.side, trade.size, trade.leverage)
            .await
        {
            tracing::error!(symbol = %trade.symbol, "Close failed, trade stays open: {}", e);
            trade.phase = TradePhase::Open;
            self.session.active_trade = Some(trade);
            self.session.pending_exit = Some(reason);
            return Err(e);
        }

        let pnl = realized_pnl(trade.side, trade.entry_price, price, trade.size, trade.leverage);
        let record = TradeRecord {
            symbol: trade.symbol.clone(),
            entry_price: trade.entry_price,
            exit_price: price,
            pl_pct: round2(pnl.pct),
            pl_usdt: round2(pnl.usdt),
            reason,
            timestamp: Utc::now(),
        };
        self.session.ledger.record(record.clone());
        self.session.clear_trade();

        let balance = match self.fetch_balance().await {
            Ok(balance) => balance.total,
            Err(e) => {
                tracing::warn!("Balance unavailable after close: {}", e);
                0.0
            }
        };
        tracing::info!(
            symbol = %record.symbol,
            "🚨 Trade closed: {:.2}% ({:.2} USDT)",
            record.pl_pct,
            record.pl_usdt
        );
        self.notifier.send(messages::close_message(
            &record.symbol,
            trade.side,
            &record.reason,
            record.entry_price,
            record.exit_price,
            record.pl_pct,
            record.pl_usdt,
            balance,
            trade.leverage,
            record.timestamp,
        ));

        Ok(PollOutcome::Closed(record))
    }

    /// Flatten the book, report the session and reset
    pub async fn stop(&mut self) -> Result<SessionReport> {
        if !self.session.running {
            return Err(BotError::NotRunning);
        }
        let config = self.params.snapshot();
        tracing::info!("🛑 Stopping bot");
        self.sync_time().await;

        if let Some(trade) = self.session.active_trade.clone() {
            match self.executor.find_position(&trade.symbol).await {
                Ok(Some(position)) if position.side == Side::Long => {
                    match self
                        .executor
                        .place_close(&trade.symbol, Side::Long, position.contracts, trade.leverage)
                        .await
                    {
                        Ok(_) => self.notifier.send(messages::closed_on_stop_message(
                            &trade.symbol,
                            position.contracts,
                        )),
                        Err(e) => tracing::error!(symbol = %trade.symbol, "Error closing on stop: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(symbol = %trade.symbol, "Error reading position on stop: {}", e),
            }
        }

        let coins = self.tradable_coins(&config);
        match self.executor.close_all(&coins, config.params.leverage).await {
            Ok(orders) => {
                for order in orders {
                    self.notify_closed_existing(&order);
                }
            }
            Err(e) => tracing::error!("Error closing remaining positions: {}", e),
        }

        let end_balance = match self.fetch_balance().await {
            Ok(balance) => balance.total,
            Err(e) => {
                tracing::error!("Error fetching end balance: {}", e);
                0.0
            }
        };
        let report = SessionReport::new(
            self.session.start_balance,
            end_balance,
            self.session.ledger.len(),
            config.params.leverage,
        );

        self.notifier.send(messages::trade_stats_message(
            &self.session.ledger.stats(),
            self.session.start_balance,
        ));
        self.notifier.send(messages::stop_message(&report, Utc::now()));
        self.session.reset();
        tracing::info!(
            "Session ended: {:.2}% ({:.2} USDT) over {} trades",
            report.net_pl_pct,
            report.net_pl_usdt,
            report.trades
        );
        Ok(report)
    }

    /// Run decision cycles on candle closes until the bot stops
    pub async fn run_forever(&mut self) -> Result<()> {
        let buffer = Duration::from_secs(self.engine.candle_close_buffer_secs);
        while self.session.running {
            let timeframe = self.params.snapshot().params.timeframe;
            let wait = timeframe
                .until_next_close(Utc::now())
                .to_std()
                .unwrap_or_default()
                + buffer;
            tracing::info!(
                "Waiting {:.2}s for the next {} candle close",
                wait.as_secs_f64(),
                timeframe
            );
            tokio::time::sleep(wait).await;

            if let Err(e) = self.run_cycle().await {
                tracing::error!("Cycle failed: {}", e);
            }
            tracing::debug!("{}", messages::status_message(&self.status(), Utc::now()));
        }
        Ok(())
    }

    pub async fn account_summary(&self) -> Result<AccountSummary> {
        self.sync_time().await;
        let balance = self.fetch_balance().await?;
        Ok(AccountSummary::from(balance))
    }

    /// Flatten every selected coin without starting a session
    pub async fn close_all(&self) -> Result<Vec<Order>> {
        let config = self.params.snapshot();
        self.sync_time().await;
        let coins: Vec<String> = config.selected_coins.iter().map(|s| normalize_symbol(s)).collect();
        let orders = self.executor.close_all(&coins, config.params.leverage).await?;
        for order in &orders {
            self.notify_closed_existing(order);
        }
        Ok(orders)
    }

    /// Selected coins, normalized, limited to tradable markets when known
    fn tradable_coins(&self, config: &TradingConfig) -> Vec<String> {
        config
            .selected_coins
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|symbol| {
                let known = self.session.valid_symbols.is_empty()
                    || self.session.valid_symbols.contains(symbol);
                if !known {
                    tracing::warn!(symbol = %symbol, "Not a tradable market, skipping");
                }
                known
            })
            .collect()
    }

    fn notify_closed_existing(&self, order: &Order) {
        let side = match order.side {
            OrderSide::Sell => Side::Long,
            OrderSide::Buy => Side::Short,
        };
        self.notifier.send(messages::closed_existing_message(
            &order.symbol,
            side,
            order.executed_qty,
        ));
    }

    async fn sync_time(&self) {
        match self.exchange.sync_time().await {
            Ok(offset) => tracing::debug!("Clock offset {} ms", offset),
            Err(e) => tracing::warn!("Error syncing time: {}", e),
        }
    }

    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let exchange = &self.exchange;
        let limit = self.engine.candle_limit;
        let candles = self
            .market_data_policy
            .run(
                &format!("Fetch {} candles", symbol),
                ExchangeError::is_transient,
                |_| exchange.fetch_candles(symbol, timeframe, limit),
            )
            .await?;
        Ok(candles)
    }

    async fn fetch_balance(&self) -> Result<Balance> {
        let exchange = &self.exchange;
        let asset = self.engine.quote_asset.as_str();
        let balance = self
            .market_data_policy
            .run(
                "Fetch balance",
                |e: &ExchangeError| !e.is_authentication(),
                |_| exchange.fetch_balance(asset),
            )
            .await?;
        Ok(balance)
    }
}
