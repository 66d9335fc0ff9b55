use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;
use crate::models::{Position, Side};

/// Take-profit triggers this far below the exact target
pub const TAKE_PROFIT_TOLERANCE: f64 = 0.0001;

/// Why a trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    EmaCrossover,
    TimeBased { minutes: f64 },
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "Take-profit"),
            ExitReason::StopLoss => write!(f, "Stop-loss"),
            ExitReason::EmaCrossover => write!(f, "EMA Crossover Exit"),
            ExitReason::TimeBased { minutes } => write!(f, "⏳ Time-Based ({} min)", minutes),
        }
    }
}

/// Exit parameters, re-read from configuration on every poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitThresholds {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub exit_minutes: f64,
    pub use_exit_minutes: bool,
}

impl From<&StrategyParams> for ExitThresholds {
    fn from(params: &StrategyParams) -> Self {
        Self {
            take_profit_pct: params.tp,
            stop_loss_pct: params.sl,
            exit_minutes: params.exitmin,
            use_exit_minutes: params.use_exitmin,
        }
    }
}

/// First matching exit reason: take-profit, stop-loss, EMA crossover, time
///
/// `ema_exit` runs only when neither price target matched, so the exit
/// detector state does not advance on a poll that already exits.
pub fn evaluate_exit<F>(
    side: Side,
    entry_price: f64,
    price: f64,
    elapsed_minutes: f64,
    thresholds: &ExitThresholds,
    ema_exit: F,
) -> Option<ExitReason>
where
    F: FnOnce() -> bool,
{
    let (take_profit_hit, stop_loss_hit) = match side {
        Side::Long => {
            let take_profit = entry_price * (1.0 + thresholds.take_profit_pct / 100.0);
            let stop_loss = entry_price * (1.0 - thresholds.stop_loss_pct / 100.0);
            (price >= take_profit - TAKE_PROFIT_TOLERANCE, price <= stop_loss)
        }
        Side::Short => {
            let take_profit = entry_price * (1.0 - thresholds.take_profit_pct / 100.0);
            let stop_loss = entry_price * (1.0 + thresholds.stop_loss_pct / 100.0);
            (price <= take_profit + TAKE_PROFIT_TOLERANCE, price >= stop_loss)
        }
    };

    if take_profit_hit {
        Some(ExitReason::TakeProfit)
    } else if stop_loss_hit {
        Some(ExitReason::StopLoss)
    } else if ema_exit() {
        Some(ExitReason::EmaCrossover)
    } else if thresholds.use_exit_minutes && elapsed_minutes > thresholds.exit_minutes {
        Some(ExitReason::TimeBased {
            minutes: thresholds.exit_minutes,
        })
    } else {
        None
    }
}

/// Unrounded profit or loss of a closed trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizedPnl {
    pub pct: f64,
    pub usdt: f64,
}

pub fn realized_pnl(side: Side, entry_price: f64, exit_price: f64, size: f64, leverage: u32) -> RealizedPnl {
    let leverage = f64::from(leverage);
    let move_per_unit = match side {
        Side::Long => exit_price - entry_price,
        Side::Short => entry_price - exit_price,
    };
    RealizedPnl {
        pct: move_per_unit / entry_price * 100.0 * leverage,
        usdt: move_per_unit * size * leverage,
    }
}

/// Round to cents for reporting
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradePhase {
    Opening,
    Open,
    Closing,
}

/// The single trade the bot manages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrade {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: u32,
    pub open_time: DateTime<Utc>,
    pub phase: TradePhase,
}

impl ActiveTrade {
    pub fn opening(symbol: &str, entry_price: f64, size: f64, leverage: u32, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: Side::Long,
            entry_price,
            size,
            leverage,
            open_time: now,
            phase: TradePhase::Opening,
        }
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.open_time).num_milliseconds() as f64 / 60_000.0
    }

    /// Take entry price, size and side from the exchange
    pub fn reconcile(&mut self, position: &Position) {
        if (position.entry_price - self.entry_price).abs() > f64::EPSILON
            || (position.contracts - self.size).abs() > f64::EPSILON
        {
            tracing::debug!(
                "Reconciled {}: entry {} -> {}, size {} -> {}",
                self.symbol,
                self.entry_price,
                position.entry_price,
                self.size,
                position.contracts
            );
        }
        self.entry_price = position.entry_price;
        self.size = position.contracts;
        self.side = position.side;
    }
}
