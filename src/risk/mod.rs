// Risk management module
pub mod sizer;

pub use sizer::{size_position, PositionSize, MARGIN_BUFFER, MIN_NOTIONAL_USDT};
