// Technical indicators module
// Exponential moving averages over candle closes

pub mod moving_average;

pub use moving_average::{attach_emas, ema_series};
