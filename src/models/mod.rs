use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fast, medium and slow EMA values for a single candle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EmaTriple {
    pub ema1: f64,
    pub ema2: f64,
    pub ema3: f64,
}

/// Candle with its derived moving averages attached
///
/// `ema` is `None` when the averages could not be computed for this row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorCandle {
    pub candle: Candle,
    pub ema: Option<EmaTriple>,
}

/// Candle interval supported by the strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
        }
    }

    /// Interval string as used by the exchange API
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
        }
    }

    /// Time remaining until the current candle of this timeframe closes
    ///
    /// Exactly on a boundary this returns a full interval, since the candle
    /// that just opened is the one we wait for.
    pub fn until_next_close(self, now: DateTime<Utc>) -> Duration {
        let interval_secs = self.minutes() * 60;
        let elapsed = now.timestamp().rem_euclid(interval_secs);
        Duration::seconds(interval_secs - elapsed)
            - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            other => Err(format!("unsupported timeframe '{}' (use 1m, 15m, 30m, 1h)", other)),
        }
    }
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that reduces a position of this direction
    pub fn closing_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_filled(self) -> bool {
        self == OrderStatus::Filled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MarginMode {
    #[default]
    #[serde(rename = "cross")]
    Cross,
    #[serde(rename = "isolated")]
    Isolated,
}

/// Order acknowledgement returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub executed_qty: f64,
    pub avg_price: Option<f64>,
}

/// Live position as reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Absolute size in contracts
    pub contracts: f64,
    pub entry_price: f64,
}

/// Positions at or below this size are treated as flat
pub const DUST_CONTRACTS: f64 = 0.0001;

impl Position {
    pub fn is_open(&self) -> bool {
        self.contracts > DUST_CONTRACTS
    }
}

/// Balance of a single asset in the futures wallet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Balance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

/// Best prices at the top of the order book
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderBookTop {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
}

/// Strip separators and settlement suffixes: `BTC/USDT:USDT` -> `BTCUSDT`
pub fn normalize_symbol(symbol: &str) -> String {
    let base = symbol.split(':').next().unwrap_or(symbol);
    base.replace('/', "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("ETH/USDT:USDT"), "ETHUSDT");
        assert_eq!(normalize_symbol("solusdt"), "SOLUSDT");
    }

    #[test]
    fn test_timeframe_parse_and_display() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::H1.to_string(), "1h");
        assert!("4h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_until_next_close() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 30).unwrap();
        assert_eq!(Timeframe::M1.until_next_close(now), Duration::seconds(30));
        assert_eq!(Timeframe::M15.until_next_close(now), Duration::seconds(450));
        assert_eq!(Timeframe::H1.until_next_close(now), Duration::seconds(3150));

        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        assert_eq!(Timeframe::M30.until_next_close(boundary), Duration::minutes(30));
    }

    #[test]
    fn test_dust_position_is_flat() {
        let position = Position {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            contracts: 0.00005,
            entry_price: 50000.0,
        };
        assert!(!position.is_open());
        assert_eq!(position.side.closing_order(), OrderSide::Sell);
    }
}
