use crate::error::BotError;
use crate::Result;

/// Share of free margin committed to a position, leaving room for fees and rounding
pub const MARGIN_BUFFER: f64 = 0.99;
/// Smallest order notional the exchange accepts
pub const MIN_NOTIONAL_USDT: f64 = 10.0;

/// Order size derived from available margin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSize {
    pub quantity: f64,
    pub notional: f64,
    pub margin: f64,
}

/// Size a long entry from free margin
///
/// Commits 99% of `free_margin` at `leverage`. Positions under
/// `min_notional` are raised to the floor, and rejected when the margin the
/// floor needs exceeds what is free.
pub fn size_position(
    free_margin: f64,
    leverage: u32,
    entry_price: f64,
    min_notional: f64,
) -> Result<PositionSize> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(BotError::InvalidInput(format!(
            "entry price must be positive, got {}",
            entry_price
        )));
    }
    if leverage == 0 {
        return Err(BotError::InvalidInput("leverage must be at least 1".to_string()));
    }

    let leverage = f64::from(leverage);
    let mut margin = free_margin * MARGIN_BUFFER;
    let mut notional = margin * leverage;
    let mut quantity = notional / entry_price;

    if notional < min_notional {
        notional = min_notional;
        quantity = min_notional / entry_price;
        margin = min_notional / leverage;

        if margin > free_margin {
            return Err(BotError::InsufficientFunds {
                required: margin,
                available: free_margin,
            });
        }
        tracing::debug!(
            "Raised order to minimum notional {:.2}: qty {} margin {:.2}",
            notional,
            quantity,
            margin
        );
    }

    Ok(PositionSize {
        quantity,
        notional,
        margin,
    })
}
