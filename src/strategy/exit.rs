use super::{crossed_below, signal_window};
use crate::models::IndicatorCandle;

/// Progress of the exit pattern for the active trade
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitState {
    pub first_ema_crossed: bool,
    pub second_ema_crossed: bool,
    pub stored_low: Option<f64>,
}

impl ExitState {
    pub fn reset(&mut self) {
        *self = ExitState::default();
    }
}

/// Mirror of the entry detector for a long position
///
/// A fast average dropping below EMA3 arms the pattern. It completes when the
/// crossing one is below EMA3 while the other fast average is also below
/// (checked in the same evaluation), storing that candle's low. A later
/// close under the stored low signals the exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitSignalDetector;

impl ExitSignalDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, candles: &[IndicatorCandle], state: &mut ExitState) -> bool {
        let window = match signal_window(candles) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!("Exit check skipped: {}", e);
                return false;
            }
        };

        let (prev, curr) = (window.prev, window.curr);
        let ema1_below = crossed_below(prev.ema1, prev.ema3, curr.ema1, curr.ema3);
        let ema2_below = crossed_below(prev.ema2, prev.ema3, curr.ema2, curr.ema3);

        if !state.first_ema_crossed && (ema1_below || ema2_below) {
            state.first_ema_crossed = true;
            state.second_ema_crossed = false;
            state.stored_low = None;
            tracing::info!("First EMA crossed below EMA3");
        }

        if state.first_ema_crossed && !state.second_ema_crossed {
            let second_crossed = (ema1_below && curr.ema2 < curr.ema3)
                || (ema2_below && curr.ema1 < curr.ema3);
            if second_crossed {
                state.second_ema_crossed = true;
                state.stored_low = Some(window.last_closed.low);
                tracing::info!(
                    "Second EMA crossed below EMA3, stored low: {}",
                    window.last_closed.low
                );
            }
        }

        if let (true, Some(stored_low)) = (state.second_ema_crossed, state.stored_low) {
            if window.last_closed.close < stored_low {
                tracing::info!(
                    close = window.last_closed.close,
                    stored_low,
                    "Price closed below stored low, exiting long"
                );
                state.reset();
                return true;
            }
        }

        false
    }
}
