// Order execution and trade lifecycle module
pub mod ledger;
pub mod orders;
pub mod retry;
pub mod trade;

pub use ledger::{TradeLedger, TradeRecord, TradeStats, LEDGER_CAPACITY};
pub use orders::OrderExecutor;
pub use retry::RetryPolicy;
pub use trade::{
    evaluate_exit, realized_pnl, round2, ActiveTrade, ExitReason, ExitThresholds, RealizedPnl,
    TradePhase,
};
