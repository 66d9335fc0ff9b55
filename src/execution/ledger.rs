use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::trade::ExitReason;

/// Number of closed trades kept for reporting
pub const LEDGER_CAPACITY: usize = 10;

/// A closed trade; P/L values are rounded to 2 decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pl_pct: f64,
    pub pl_usdt: f64,
    pub reason: ExitReason,
    pub timestamp: DateTime<Utc>,
}

/// Statistics over the records currently in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub max_drawdown_pct: f64,
}

/// Most recent closed trades, oldest evicted first
#[derive(Debug, Clone, Default)]
pub struct TradeLedger {
    records: VecDeque<TradeRecord>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TradeRecord) {
        self.records.push_back(record);
        while self.records.len() > LEDGER_CAPACITY {
            self.records.pop_front();
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> TradeStats {
        let total_trades = self.records.len();
        if total_trades == 0 {
            return TradeStats::default();
        }

        let wins: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.pl_pct)
            .filter(|pct| *pct > 0.0)
            .collect();
        let loss_sum: f64 = self
            .records
            .iter()
            .map(|r| r.pl_pct)
            .filter(|pct| *pct < 0.0)
            .sum();

        let winning_trades = wins.len();
        let losing_trades = total_trades - winning_trades;
        let min_pct = self
            .records
            .iter()
            .map(|r| r.pl_pct)
            .fold(f64::INFINITY, f64::min);

        TradeStats {
            total_trades,
            winning_trades,
            win_rate: winning_trades as f64 / total_trades as f64 * 100.0,
            avg_win_pct: if winning_trades > 0 {
                wins.iter().sum::<f64>() / winning_trades as f64
            } else {
                0.0
            },
            // Break-even trades count toward the divisor but not the sum
            avg_loss_pct: if losing_trades > 0 {
                loss_sum / losing_trades as f64
            } else {
                0.0
            },
            max_drawdown_pct: min_pct.min(0.0),
        }
    }
}
