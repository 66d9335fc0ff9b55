use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use perpbot::config::{FileParams, Settings, DEFAULT_CONFIG_PATH};
use perpbot::notify::{messages, LogNotifier, Notifier, TelegramClient, TelegramNotifier};
use perpbot::{BinanceFuturesClient, Bot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound on waiting for queued alerts at exit
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "perpbot", about = "EMA crossover trading bot for USDT-margined perpetuals")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start trading until Ctrl+C, then flatten and report
    Run,
    /// Show the account summary
    Balance,
    /// Close every position on the selected coins
    CloseAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let (mut bot, delivery) = build_bot(&settings, &cli.config)?;

    let result = match cli.command {
        Command::Run => run(&mut bot).await,
        Command::Balance => bot
            .account_summary()
            .await
            .context("Failed to fetch balance")
            .map(|summary| {
                let active = bot.status().active_trade.map(|(symbol, _)| symbol);
                println!(
                    "{}",
                    messages::account_message(&summary, &settings.parameters, active.as_deref(), Utc::now())
                );
            }),
        Command::CloseAll => bot
            .close_all()
            .await
            .context("Failed to close positions")
            .map(|orders| tracing::info!("Closed {} positions", orders.len())),
    };

    // The delivery task drains once the bot's notifier handle is gone
    drop(bot);
    if let Some(delivery) = delivery {
        if tokio::time::timeout(NOTIFY_FLUSH_TIMEOUT, delivery).await.is_err() {
            tracing::warn!("Timed out flushing notifications");
        }
    }
    result
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("perpbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_bot(settings: &Settings, config_path: &Path) -> anyhow::Result<(Bot, Option<JoinHandle<()>>)> {
    let exchange =
        BinanceFuturesClient::new(&settings.exchange).context("Failed to create exchange client")?;

    let (notifier, delivery): (Arc<dyn Notifier>, _) =
        match TelegramClient::from_settings(&settings.telegram) {
            Some(client) => {
                let (telegram, delivery) = TelegramNotifier::spawn(client);
                (Arc::new(telegram), Some(delivery))
            }
            None => {
                tracing::warn!("Telegram not configured, alerts go to the log");
                (Arc::new(LogNotifier), None)
            }
        };

    let params = FileParams::new(config_path, settings.trading());
    let bot = Bot::new(
        Arc::new(exchange),
        notifier,
        Box::new(params),
        settings.engine.clone(),
    );
    Ok((bot, delivery))
}

async fn run(bot: &mut Bot) -> anyhow::Result<()> {
    bot.start().await.context("Failed to start bot")?;
    tracing::info!("Press Ctrl+C to stop");

    tokio::select! {
        result = bot.run_forever() => {
            if let Err(e) = result {
                tracing::error!("Trading loop ended: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let stats = bot.trade_stats();
    let start_balance = bot.session().start_balance;
    let report = bot.stop().await.context("Failed to stop bot")?;
    tracing::info!(
        "Final balance {:.2} USDT ({:+.2}%)",
        report.end_balance,
        report.net_pl_pct
    );
    println!("{}", messages::trade_stats_message(&stats, start_balance));
    Ok(())
}
