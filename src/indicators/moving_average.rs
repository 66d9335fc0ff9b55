use crate::models::{Candle, EmaTriple, IndicatorCandle};

/// Exponential moving average series seeded with the first value
///
/// `ema[0] = values[0]`, then `ema[i] = values[i] * α + ema[i-1] * (1 - α)`
/// with `α = 2 / (period + 1)`. Returns an empty series for an empty input
/// or a zero period.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.is_empty() {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut series = Vec::with_capacity(values.len());
    let mut ema = values[0];
    series.push(ema);

    for value in &values[1..] {
        ema = value * alpha + ema * (1.0 - alpha);
        series.push(ema);
    }

    series
}

/// Attach EMA1/EMA2/EMA3 of the closes to every candle
///
/// When any period is unusable every row carries `ema: None`.
pub fn attach_emas(
    candles: &[Candle],
    ema1_period: usize,
    ema2_period: usize,
    ema3_period: usize,
) -> Vec<IndicatorCandle> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema1 = ema_series(&closes, ema1_period);
    let ema2 = ema_series(&closes, ema2_period);
    let ema3 = ema_series(&closes, ema3_period);
    let complete = ema1.len() == closes.len()
        && ema2.len() == closes.len()
        && ema3.len() == closes.len();

    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| IndicatorCandle {
            candle: candle.clone(),
            ema: complete.then(|| EmaTriple {
                ema1: ema1[i],
                ema2: ema2[i],
                ema3: ema3[i],
            }),
        })
        .collect()
}
