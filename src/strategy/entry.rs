use std::collections::HashMap;

use super::{crossed_above, signal_window};
use crate::models::IndicatorCandle;

/// Which fast average crossed EMA3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastEma {
    Ema1,
    Ema2,
}

impl FastEma {
    pub fn other(self) -> FastEma {
        match self {
            FastEma::Ema1 => FastEma::Ema2,
            FastEma::Ema2 => FastEma::Ema1,
        }
    }
}

impl std::fmt::Display for FastEma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FastEma::Ema1 => f.write_str("EMA1"),
            FastEma::Ema2 => f.write_str("EMA2"),
        }
    }
}

/// Progress of the entry pattern for one symbol
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntryState {
    pub first_cross: Option<FastEma>,
    pub second_cross: Option<FastEma>,
    pub stored_high: Option<f64>,
}

impl EntryState {
    pub fn is_empty(&self) -> bool {
        self.first_cross.is_none() && self.second_cross.is_none() && self.stored_high.is_none()
    }
}

/// Breakout confirmed, enter at `price`
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub symbol: String,
    pub price: f64,
    pub stored_high: f64,
}

/// Two-stage EMA crossover entry detector
///
/// Stage 1 records which fast average (EMA1 or EMA2) crossed above EMA3.
/// Stage 2 waits for the other one to cross and stores the candle high.
/// The signal fires once a closed candle finishes above that high.
///
/// When no trade is active, an evaluation that neither records progress nor
/// fires discards the symbol's partial pattern. The stages therefore have to
/// complete on consecutive closed candles. While a trade is active the
/// detector leaves every symbol untouched.
#[derive(Debug, Default)]
pub struct EntrySignalDetector {
    states: HashMap<String, EntryState>,
}

impl EntrySignalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        symbol: &str,
        candles: &[IndicatorCandle],
        has_active_trade: bool,
    ) -> Option<EntrySignal> {
        let window = match signal_window(candles) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(symbol, "No valid EMA data: {}", e);
                return None;
            }
        };

        if has_active_trade {
            return None;
        }

        let (prev, curr) = (window.prev, window.curr);
        let ema1_cross = crossed_above(prev.ema1, prev.ema3, curr.ema1, curr.ema3);
        let ema2_cross = crossed_above(prev.ema2, prev.ema3, curr.ema2, curr.ema3);
        let crossed = |fast: FastEma| match fast {
            FastEma::Ema1 => ema1_cross,
            FastEma::Ema2 => ema2_cross,
        };

        let state = self.states.entry(symbol.to_string()).or_default();

        // Stage 1
        if state.first_cross.is_none() && (ema1_cross || ema2_cross) {
            let first = if ema1_cross { FastEma::Ema1 } else { FastEma::Ema2 };
            state.first_cross = Some(first);
            tracing::info!(
                symbol,
                "First crossover by {} above EMA3 at {}",
                first,
                window.last_closed.timestamp
            );
            return None;
        }

        // Stage 2
        if let (Some(first), None) = (state.first_cross, state.second_cross) {
            let second = first.other();
            if crossed(second) {
                state.second_cross = Some(second);
                state.stored_high = Some(window.last_closed.high);
                tracing::info!(
                    symbol,
                    "Second crossover by {} above EMA3. Stored high: {}",
                    second,
                    window.last_closed.high
                );
                return None;
            }
        }

        // Confirmation
        if let (Some(_), Some(stored_high)) = (state.second_cross, state.stored_high) {
            if window.last_closed.close > stored_high {
                *state = EntryState::default();
                tracing::info!(
                    symbol,
                    close = window.last_closed.close,
                    stored_high,
                    "Close broke stored high, entry at {}",
                    window.forming.open
                );
                return Some(EntrySignal {
                    symbol: symbol.to_string(),
                    price: window.forming.open,
                    stored_high,
                });
            }
        }

        *state = EntryState::default();
        None
    }

    pub fn state(&self, symbol: &str) -> Option<&EntryState> {
        self.states.get(symbol)
    }

    /// Forget every symbol, e.g. after a timeframe change
    pub fn clear_all(&mut self) {
        self.states.clear();
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.states.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures::window;

    // EMA3 sits at 100; fast averages move around it
    const BELOW: f64 = 99.0;
    const ABOVE: f64 = 101.0;

    /// EMA1 crosses while EMA2 stays below
    fn ema1_crosses() -> Vec<IndicatorCandle> {
        window((BELOW, BELOW, 100.0), (ABOVE, BELOW, 100.0), 105.0, 98.0, 102.0, 102.5)
    }

    /// EMA2 crosses while EMA1 is already above
    fn ema2_crosses(high: f64) -> Vec<IndicatorCandle> {
        window((ABOVE, BELOW, 100.0), (ABOVE, ABOVE, 100.0), high, 99.0, 104.0, 104.5)
    }

    /// Both above, closed candle finishing at `close`
    fn holding(close: f64, next_open: f64) -> Vec<IndicatorCandle> {
        window((ABOVE, ABOVE, 100.0), (ABOVE, ABOVE, 100.0), close + 0.5, 100.0, close, next_open)
    }

    #[test]
    fn test_stage_one_records_first_cross() {
        let mut detector = EntrySignalDetector::new();
        assert!(detector.evaluate("BTCUSDT", &ema1_crosses(), false).is_none());

        let state = detector.state("BTCUSDT").unwrap();
        assert_eq!(state.first_cross, Some(FastEma::Ema1));
        assert_eq!(state.second_cross, None);
        assert_eq!(state.stored_high, None);
    }

    #[test]
    fn test_ema1_wins_tie() {
        let mut detector = EntrySignalDetector::new();
        let both = window((BELOW, BELOW, 100.0), (ABOVE, ABOVE, 100.0), 105.0, 98.0, 102.0, 102.0);
        detector.evaluate("ETHUSDT", &both, false);
        assert_eq!(
            detector.state("ETHUSDT").unwrap().first_cross,
            Some(FastEma::Ema1)
        );
    }

    #[test]
    fn test_stage_two_stores_high() {
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);
        assert!(detector.evaluate("BTCUSDT", &ema2_crosses(107.0), false).is_none());

        let state = detector.state("BTCUSDT").unwrap();
        assert_eq!(state.second_cross, Some(FastEma::Ema2));
        assert_eq!(state.stored_high, Some(107.0));
    }

    #[test]
    fn test_stage_two_requires_the_other_average() {
        let mut detector = EntrySignalDetector::new();
        let ema2_first = window((BELOW, BELOW, 100.0), (BELOW, ABOVE, 100.0), 105.0, 98.0, 102.0, 102.0);
        detector.evaluate("BTCUSDT", &ema2_first, false);
        assert_eq!(
            detector.state("BTCUSDT").unwrap().first_cross,
            Some(FastEma::Ema2)
        );

        let ema1_follows = window((BELOW, ABOVE, 100.0), (ABOVE, ABOVE, 100.0), 106.0, 99.0, 104.0, 104.0);
        detector.evaluate("BTCUSDT", &ema1_follows, false);
        let state = detector.state("BTCUSDT").unwrap();
        assert_eq!(state.second_cross, Some(FastEma::Ema1));
        assert_eq!(state.stored_high, Some(106.0));
    }

    #[test]
    fn test_breakout_fires_at_next_open_and_resets() {
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);
        detector.evaluate("BTCUSDT", &ema2_crosses(107.0), false);

        let signal = detector
            .evaluate("BTCUSDT", &holding(108.0, 108.25), false)
            .unwrap();
        assert_eq!(signal.price, 108.25);
        assert_eq!(signal.stored_high, 107.0);
        assert!(detector.state("BTCUSDT").unwrap().is_empty());

        // Completed pattern does not fire twice
        assert!(detector
            .evaluate("BTCUSDT", &holding(109.0, 109.0), false)
            .is_none());
    }

    #[test]
    fn test_idle_evaluation_discards_partial_pattern() {
        // Literal reset: without an active trade, a non-progress call clears the symbol
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);
        detector.evaluate("BTCUSDT", &ema2_crosses(107.0), false);

        assert!(detector
            .evaluate("BTCUSDT", &holding(106.0, 106.0), false)
            .is_none());
        assert!(detector.state("BTCUSDT").unwrap().is_empty());

        assert!(detector
            .evaluate("BTCUSDT", &holding(108.0, 108.0), false)
            .is_none());
    }

    #[test]
    fn test_active_trade_freezes_state() {
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);
        detector.evaluate("BTCUSDT", &ema2_crosses(107.0), false);
        let before = *detector.state("BTCUSDT").unwrap();

        for _ in 0..5 {
            assert!(detector
                .evaluate("BTCUSDT", &holding(106.0, 106.0), true)
                .is_none());
        }
        // Even a breakout does not fire while another trade is open
        assert!(detector
            .evaluate("BTCUSDT", &holding(110.0, 110.0), true)
            .is_none());
        assert_eq!(*detector.state("BTCUSDT").unwrap(), before);
    }

    #[test]
    fn test_bad_data_leaves_state_untouched() {
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);

        let mut broken = ema2_crosses(107.0);
        broken[1].ema = None;
        assert!(detector.evaluate("BTCUSDT", &broken, false).is_none());
        assert!(detector.evaluate("BTCUSDT", &broken[..2], false).is_none());

        assert_eq!(
            detector.state("BTCUSDT").unwrap().first_cross,
            Some(FastEma::Ema1)
        );
        assert_eq!(detector.state("BTCUSDT").unwrap().second_cross, None);
    }

    #[test]
    fn test_symbols_are_independent_and_clearable() {
        let mut detector = EntrySignalDetector::new();
        detector.evaluate("BTCUSDT", &ema1_crosses(), false);
        detector.evaluate("ETHUSDT", &holding(100.0, 100.0), false);

        assert_eq!(detector.tracked_symbols(), vec!["BTCUSDT", "ETHUSDT"]);
        assert!(!detector.state("BTCUSDT").unwrap().is_empty());
        assert!(detector.state("ETHUSDT").unwrap().is_empty());

        detector.clear_all();
        assert!(detector.tracked_symbols().is_empty());
        assert!(detector.state("BTCUSDT").is_none());
    }
}
