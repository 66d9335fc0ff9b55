// Alert texts

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::bot::{AccountSummary, BotStatus, SessionReport};
use crate::config::StrategyParams;
use crate::execution::{ExitReason, TradeStats};
use crate::models::Side;
use crate::risk::PositionSize;

/// India Standard Time, UTC+05:30
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn date_line(now: DateTime<Utc>) -> String {
    format!("📅 Date: {}", now.format("%Y-%m-%d"))
}

fn time_line(now: DateTime<Utc>) -> String {
    format!(
        "🕒 Time: {} IST | {} UTC",
        now.with_timezone(&ist_offset()).format("%H:%M"),
        now.format("%H:%M")
    )
}

fn base_asset(symbol: &str) -> &str {
    symbol
        .split('/')
        .next()
        .filter(|_| symbol.contains('/'))
        .unwrap_or_else(|| symbol.strip_suffix("USDT").unwrap_or(symbol))
}

pub fn start_message(
    balance: f64,
    params: &StrategyParams,
    coins: &[String],
    now: DateTime<Utc>,
) -> String {
    format!(
        "✅ TRADING BOT ACTIVATED ✅\n\n\
         💰 Account Overview:\n\
         \x20  ├─ Starting Balance: {:.2} USDT\n\
         \x20  ├─ Margin Available: 100%\n\
         \x20  └─ Risk Level: Low\n\n\
         ⚙️ Settings:\n\
         \x20  ├─ Leverage: {}x\n\
         \x20  ├─ Coins: {}\n\
         \x20  ├─ Strategy: EMA Crossover ({})\n\
         \x20  └─ Margin Mode: cross\n\n\
         📊 Parameters:\n\
         \x20  ├─ EMA1: {}\n\
         \x20  ├─ EMA2: {}\n\
         \x20  ├─ EMA3: {}\n\
         \x20  └─ Max Duration: {}m\n\n\
         {}\n{}",
        balance,
        params.leverage,
        coins.join(", "),
        params.timeframe,
        params.ema1,
        params.ema2,
        params.ema3,
        params.exitmin,
        date_line(now),
        time_line(now)
    )
}

pub fn entry_message(
    symbol: &str,
    entry_price: f64,
    size: &PositionSize,
    free_margin: f64,
    params: &StrategyParams,
) -> String {
    let size_pct = if free_margin > 0.0 {
        size.margin / free_margin * 100.0
    } else {
        0.0
    };
    let tp_price = entry_price * (1.0 + params.tp / 100.0);
    let sl_price = entry_price * (1.0 - params.sl / 100.0);

    format!(
        "🔺 LONG ENTRY ALERT 🔺\n\
         📈 Symbol: {}\n\
         💰 Entry Price: {:.2}\n\
         📊 Order Details:\n\
         \x20  ├─ Amount: {:.4} {}\n\
         \x20  ├─ Notional: {:.2} USDT\n\
         \x20  └─ Cost (Margin): {:.2} USDT\n\
         🎯 TP: {:.3} | SL: {:.3}\n\
         📊 Position Size: {:.2}% of Balance",
        symbol,
        entry_price,
        size.quantity,
        base_asset(symbol),
        size.notional,
        size.margin,
        tp_price,
        sl_price,
        size_pct
    )
}

pub fn insufficient_margin_message(symbol: &str, required: f64, available: f64) -> String {
    format!(
        "⚠️ Insufficient margin for {}: Required {:.2} USDT, Available {:.2} USDT",
        symbol, required, available
    )
}

#[allow(clippy::too_many_arguments)]
pub fn close_message(
    symbol: &str,
    side: Side,
    reason: &ExitReason,
    entry_price: f64,
    exit_price: f64,
    pl_pct: f64,
    pl_usdt: f64,
    balance: f64,
    leverage: u32,
    now: DateTime<Utc>,
) -> String {
    let side = match side {
        Side::Long => "Long",
        Side::Short => "Short",
    };
    format!(
        "🚨 TRADE CLOSED 🚨\n\
         📈 Symbol: {} ({})\n\
         📉 Exit Reason: {}\n\
         💰 Exit Price: {:.4}\n\
         📊 Performance:\n\
         \x20  ├─ Entry: {:.4}\n\
         \x20  ├─ P/L: {:.2}% ({:.2} USDT)\n\
         \x20  └─ Balance: {:.2} USDT\n\
         ⚙️ Leverage: {}x\n\
         {}\n{}",
        symbol,
        side,
        reason,
        exit_price,
        entry_price,
        pl_pct,
        pl_usdt,
        balance,
        leverage,
        date_line(now),
        time_line(now)
    )
}

pub fn closed_existing_message(symbol: &str, side: Side, contracts: f64) -> String {
    let side = match side {
        Side::Long => "long",
        Side::Short => "short",
    };
    format!(
        "🔔 Closed existing {} position for {}: {} contracts",
        side, symbol, contracts
    )
}

pub fn closed_on_stop_message(symbol: &str, contracts: f64) -> String {
    format!(
        "🔔 Closed long position for {}: {} contracts on bot stop",
        symbol, contracts
    )
}

pub fn position_vanished_message(symbol: &str, polls: u32) -> String {
    format!(
        "⚠️ Position for {} no longer reported by the exchange after {} checks. \
         Trade cleared without a record; check the account for a manual close or liquidation.",
        symbol, polls
    )
}

pub fn error_message(context: &str, error: &dyn std::fmt::Display) -> String {
    format!("❌ {}: {}", context, error)
}

pub fn stop_message(report: &SessionReport, now: DateTime<Utc>) -> String {
    format!(
        "🚫 BOT DEACTIVATED 🚫\n\
         📊 Session Report:\n\
         \x20  ├─ Start Balance: {:.2} USDT\n\
         \x20  ├─ End Balance: {:.2} USDT\n\
         \x20  ├─ Net P/L: {:.2}% ({:.2} USDT)\n\
         \x20  └─ Trades: {}\n\
         ⚙️ Leverage: {}x\n\
         {}\n{}\n\
         📋 Summary: Session ended",
        report.start_balance,
        report.end_balance,
        report.net_pl_pct,
        report.net_pl_usdt,
        report.trades,
        report.leverage,
        date_line(now),
        time_line(now)
    )
}

pub fn account_message(
    summary: &AccountSummary,
    params: &StrategyParams,
    active_symbol: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    format!(
        "💰 ACCOUNT STATUS 💰\n\n\
         📈 Current Balance:\n\
         \x20  ├─ USDT: {:.2}\n\
         \x20  ├─ Margin Used: {:.2} USDT ({:.1}%)\n\
         \x20  └─ Equity: {:.2} USDT\n\n\
         ⚙️ Settings:\n\
         \x20  ├─ Timeframe: {}\n\
         \x20  ├─ Margin Mode: cross\n\
         \x20  ├─ Leverage: {}x\n\
         \x20  ├─ Take-Profit: {}%\n\
         \x20  └─ Stop-Loss: {}%\n\n\
         📊 Open Positions:\n\
         \x20  └─ {}\n\n\
         {}\n{}",
        summary.balance,
        summary.margin_used,
        summary.margin_used_pct,
        summary.equity,
        params.timeframe,
        params.leverage,
        params.tp,
        params.sl,
        active_symbol.unwrap_or("None"),
        date_line(now),
        time_line(now)
    )
}

pub fn status_message(status: &BotStatus, now: DateTime<Utc>) -> String {
    let active = status
        .active_trade
        .as_ref()
        .map(|(symbol, phase)| format!("{} ({:?})", symbol, phase))
        .unwrap_or_else(|| "None".to_string());
    format!(
        "📡 BOT STATUS UPDATE 📡\n\n\
         {}\n\
         ⏰ Timeframe: {}\n\
         ⚖️ Margin Mode: cross\n\
         📊 Active Trade: {}\n\
         {}\n{}",
        if status.running { "✅ Running" } else { "❌ Stopped" },
        status.timeframe,
        active,
        date_line(now),
        time_line(now)
    )
}

pub fn trade_stats_message(stats: &TradeStats, start_balance: f64) -> String {
    format!(
        "📊 Trade Statistics:\n\n\
         Total Trades: {}\n\
         Winning Trades: {}\n\
         Win Rate: {:.1}%\n\
         Avg Win: {:.2}%\n\
         Avg Loss: {:.2}%\n\
         Max Drawdown: {:.2}%\n\n\
         Current Session:\n\
         Start Balance: {:.2} USDT",
        stats.total_trades,
        stats.winning_trades,
        stats.win_rate,
        stats.avg_win_pct,
        stats.avg_loss_pct,
        stats.max_drawdown_pct,
        start_balance
    )
}
