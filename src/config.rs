use crate::models::MarginMode;
use crate::strategy::StrategyId;
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

/// Everything tunable about the bot. Loaded once at startup from an optional
/// `perpbot.toml` plus `PERPBOT_*` environment overrides; every field has a
/// default so an empty config is valid.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub trading: TradingSettings,
    pub scheduler: SchedulerSettings,
    pub throttle: ThrottleSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    /// Quote asset defining both the balance to watch and the tradable
    /// universe (symbols ending in it).
    pub quote_asset: String,
    pub recv_window_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            recv_window_ms: 6000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub strategy: StrategyId,
    /// Nominal value committed per entry; quantity = notional / price.
    pub notional: f64,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_open_positions: usize,
    pub excluded_symbols: Vec<String>,
    pub candle_interval: String,
    pub candle_lookback: u32,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyId::Rsi,
            notional: 10.0,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            take_profit_pct: 0.012,
            stop_loss_pct: 0.009,
            max_open_positions: 100,
            excluded_symbols: vec!["USDCUSDT".to_string()],
            candle_interval: "15m".to_string(),
            candle_lookback: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub cycle_interval_secs: u64,
    /// Pause between dependent exchange operations so their state can
    /// propagate before the next one lands.
    pub settle_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 180,
            settle_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Minimum spacing between any two gateway calls.
    pub cooldown_ms: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            cooldown_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or an optional `perpbot.toml` next to the
    /// binary) with `PERPBOT_*` environment variables layered on top, e.g.
    /// `PERPBOT_TRADING__NOTIONAL=25`.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(p) => builder.add_source(config::File::with_name(p)),
            None => builder.add_source(config::File::with_name("perpbot").required(false)),
        };

        builder
            .add_source(config::Environment::with_prefix("PERPBOT").separator("__"))
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.cycle_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.scheduler.settle_delay_ms)
    }
}

/// Exchange API credentials, read from the environment only. Missing keys
/// are a startup error, not something to discover mid-cycle.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: std::env::var("BINANCE_API_KEY")
                .context("BINANCE_API_KEY not set")?,
            api_secret: std::env::var("BINANCE_API_SECRET")
                .context("BINANCE_API_SECRET not set")?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}
