// Trading strategy module
// Two-stage EMA crossover entry and exit detection
pub mod entry;
pub mod exit;

pub use entry::{EntrySignal, EntrySignalDetector, EntryState, FastEma};
pub use exit::{ExitSignalDetector, ExitState};

use crate::error::BotError;
use crate::models::{Candle, EmaTriple, IndicatorCandle};
use crate::Result;

/// Candles needed for a decision: two closed ones plus the forming one
pub const MIN_SIGNAL_CANDLES: usize = 3;

/// The slice of a candle series that drives a decision
///
/// `prev` is `[-3]`, `curr` is `[-2]` (the last closed candle) and
/// `forming` is `[-1]`, which only supplies the next tradable open.
#[derive(Debug, Clone, Copy)]
pub struct SignalWindow<'a> {
    pub prev: EmaTriple,
    pub curr: EmaTriple,
    pub last_closed: &'a Candle,
    pub forming: &'a Candle,
}

/// Extract the decision window, rejecting short series and missing averages
pub fn signal_window(candles: &[IndicatorCandle]) -> Result<SignalWindow<'_>> {
    let n = candles.len();
    if n < MIN_SIGNAL_CANDLES {
        return Err(BotError::DataQuality(format!(
            "Insufficient data: {} candles, need {}",
            n, MIN_SIGNAL_CANDLES
        )));
    }

    let prev = &candles[n - 3];
    let curr = &candles[n - 2];
    match (prev.ema, curr.ema) {
        (Some(prev_ema), Some(curr_ema)) => Ok(SignalWindow {
            prev: prev_ema,
            curr: curr_ema,
            last_closed: &curr.candle,
            forming: &candles[n - 1].candle,
        }),
        _ => Err(BotError::DataQuality(
            "EMA values missing on the last closed candles".to_string(),
        )),
    }
}

/// `fast` moved from at-or-below `slow` to strictly above it
pub fn crossed_above(prev_fast: f64, prev_slow: f64, curr_fast: f64, curr_slow: f64) -> bool {
    prev_fast <= prev_slow && curr_fast > curr_slow
}

/// `fast` moved from at-or-above `slow` to strictly below it
pub fn crossed_below(prev_fast: f64, prev_slow: f64, curr_fast: f64, curr_slow: f64) -> bool {
    prev_fast >= prev_slow && curr_fast < curr_slow
}


#[cfg(test)]
mod tests {
    use super::fixtures::row;
    use super::*;

    #[test]
    fn test_crossover_helpers() {
        assert!(crossed_above(9.0, 10.0, 11.0, 10.0));
        assert!(crossed_above(10.0, 10.0, 10.5, 10.0));
        assert!(!crossed_above(11.0, 10.0, 12.0, 10.0));
        assert!(!crossed_above(9.0, 10.0, 10.0, 10.0));

        assert!(crossed_below(11.0, 10.0, 9.0, 10.0));
        assert!(crossed_below(10.0, 10.0, 9.5, 10.0));
        assert!(!crossed_below(9.0, 10.0, 8.0, 10.0));
    }

    #[test]
    fn test_signal_window_requires_three_candles() {
        let rows = vec![row(0, 1.0, 1.0, 1.0, 1.0, (1.0, 1.0, 1.0)); 2];
        let err = signal_window(&rows).unwrap_err();
        assert!(err.to_string().contains("Insufficient data"));
    }

    #[test]
    fn test_signal_window_requires_emas() {
        let mut rows = vec![row(0, 1.0, 1.0, 1.0, 1.0, (1.0, 1.0, 1.0)); 3];
        rows[0].ema = None;
        assert!(matches!(signal_window(&rows), Err(BotError::DataQuality(_))));

        // Only the forming candle lacks averages, which is fine
        let mut rows = vec![row(0, 1.0, 1.0, 1.0, 1.0, (1.0, 1.0, 1.0)); 3];
        rows[2].ema = None;
        assert!(signal_window(&rows).is_ok());
    }

    #[test]
    fn test_signal_window_positions() {
        let rows = vec![
            row(0, 1.0, 1.0, 1.0, 1.0, (1.0, 1.0, 1.0)),
            row(1, 2.0, 2.0, 2.0, 2.0, (2.0, 2.0, 2.0)),
            row(2, 3.0, 3.0, 3.0, 3.0, (3.0, 3.0, 3.0)),
            row(3, 4.0, 4.0, 4.0, 4.0, (4.0, 4.0, 4.0)),
        ];
        let window = signal_window(&rows).unwrap();
        assert_eq!(window.prev.ema1, 2.0);
        assert_eq!(window.curr.ema1, 3.0);
        assert_eq!(window.last_closed.close, 3.0);
        assert_eq!(window.forming.open, 4.0);
    }
}
