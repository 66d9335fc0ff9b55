use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::BINANCE_FUTURES_API;
use crate::models::{normalize_symbol, Timeframe};

pub const DEFAULT_CONFIG_PATH: &str = "perpbot.toml";

/// Full bot configuration
///
/// Loaded from an optional TOML file, overridden by `PERPBOT_*` environment
/// variables with `__` between nested keys (e.g. `PERPBOT_PARAMETERS__TP=0.8`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub telegram: TelegramSettings,
    pub parameters: StrategyParams,
    pub engine: EngineSettings,
    pub selected_coins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: BINANCE_FUTURES_API.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: 5000,
            requests_per_second: 10,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramSettings {
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        matches!((&self.token, &self.chat_id), (Some(t), Some(c)) if !t.is_empty() && !c.is_empty())
    }
}

/// Strategy parameters that may change while the bot runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyParams {
    pub ema1: usize,
    pub ema2: usize,
    pub ema3: usize,
    /// Take profit, percent of entry price
    pub tp: f64,
    /// Stop loss, percent of entry price
    pub sl: f64,
    /// Time-based exit after this many minutes
    pub exitmin: f64,
    pub use_exitmin: bool,
    pub timeframe: Timeframe,
    pub leverage: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ema1: 21,
            ema2: 60,
            ema3: 365,
            tp: 0.5,
            sl: 2.0,
            exitmin: 2.0,
            use_exitmin: true,
            timeframe: Timeframe::M1,
            leverage: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_secs: u64,
    pub candle_limit: usize,
    pub candle_close_buffer_secs: u64,
    pub min_notional: f64,
    pub missing_position_polls: u32,
    pub quote_asset: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            candle_limit: 500,
            candle_close_buffer_secs: 1,
            min_notional: 10.0,
            missing_position_polls: 3,
            quote_asset: "USDT".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("PERPBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("selected_coins"),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_env_fallbacks();
        settings.selected_coins = settings
            .selected_coins
            .iter()
            .map(|s| normalize_symbol(s))
            .collect();
        settings.validate()?;
        Ok(settings)
    }

    /// Conventional variable names for secrets not set in the file
    fn apply_env_fallbacks(&mut self) {
        if self.exchange.api_key.is_empty() {
            if let Ok(key) = std::env::var("BINANCE_API_KEY") {
                self.exchange.api_key = key;
            }
        }
        if self.exchange.api_secret.is_empty() {
            if let Ok(secret) = std::env::var("BINANCE_API_SECRET") {
                self.exchange.api_secret = secret;
            }
        }
        if self.telegram.token.is_none() {
            self.telegram.token = std::env::var("TELEGRAM_TOKEN").ok();
        }
        if self.telegram.chat_id.is_none() {
            self.telegram.chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.parameters;
        if p.ema1 == 0 || p.ema2 == 0 || p.ema3 == 0 {
            return Err(ConfigError::Message("EMA periods must be positive".to_string()));
        }
        if !(1..=125).contains(&p.leverage) {
            return Err(ConfigError::Message(format!(
                "leverage must be between 1 and 125, got {}",
                p.leverage
            )));
        }
        if p.tp <= 0.0 || p.sl <= 0.0 {
            return Err(ConfigError::Message(
                "tp and sl must be positive percentages".to_string(),
            ));
        }
        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "engine.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.engine.candle_limit < 3 {
            return Err(ConfigError::Message(
                "engine.candle_limit must be at least 3".to_string(),
            ));
        }
        Ok(())
    }

    pub fn trading(&self) -> TradingConfig {
        TradingConfig {
            params: self.parameters.clone(),
            selected_coins: self.selected_coins.clone(),
        }
    }
}

/// The part of the configuration re-read every decision cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingConfig {
    pub params: StrategyParams,
    pub selected_coins: Vec<String>,
}

/// Source of live trading parameters
pub trait ParamsSource: Send + Sync {
    fn snapshot(&self) -> TradingConfig;
}

impl ParamsSource for TradingConfig {
    fn snapshot(&self) -> TradingConfig {
        self.clone()
    }
}

/// Re-reads the config file on every snapshot, keeping the last good values
/// when the file is unreadable or invalid
pub struct FileParams {
    path: PathBuf,
    last_good: Mutex<TradingConfig>,
}

impl FileParams {
    pub fn new(path: impl Into<PathBuf>, initial: TradingConfig) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(initial),
        }
    }
}

impl ParamsSource for FileParams {
    fn snapshot(&self) -> TradingConfig {
        let mut last_good = self
            .last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match Settings::load(&self.path) {
            Ok(settings) => {
                let current = settings.trading();
                if current != *last_good {
                    tracing::info!("Trading parameters changed: {:?}", current.params);
                }
                *last_good = current;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to reload {}: {}. Keeping previous parameters",
                    self.path.display(),
                    e
                );
            }
        }

        last_good.clone()
    }
}
