use clap::Parser;
use perpbot::api::{BinanceFutures, MarketGateway, Throttle};
use perpbot::config::{Credentials, Settings};
use perpbot::engine::{Engine, Shutdown};
use perpbot::precision::PrecisionCache;
use perpbot::strategy::{create_strategy, StrategyId};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "perpbot", about = "Bracket-order trading bot for Binance USD-M futures")]
struct Cli {
    /// Strategy to trade, overriding the configured one
    #[arg(long, value_enum)]
    strategy: Option<StrategyId>,

    /// Path to a settings file (defaults to an optional perpbot.toml)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perpbot=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy {
        settings.trading.strategy = strategy;
    }

    let credentials = Credentials::from_env()?;
    let gateway: Arc<dyn MarketGateway> = Arc::new(BinanceFutures::new(
        Some(settings.exchange.base_url.clone()),
        credentials.api_key.clone(),
        credentials.api_secret.clone(),
        settings.exchange.recv_window_ms,
    )?);

    let throttle = Throttle::new(
        Duration::from_millis(settings.throttle.cooldown_ms),
        settings.throttle.max_retries,
        Duration::from_millis(settings.throttle.retry_delay_ms),
    );
    let precision = PrecisionCache::new(gateway.clone(), throttle.clone());
    let strategy = create_strategy(settings.trading.strategy);

    tracing::info!(
        "perpbot starting: strategy {}, notional {} {}, leverage {}x",
        strategy.name(),
        settings.trading.notional,
        settings.exchange.quote_asset,
        settings.trading.leverage
    );

    let (trigger, shutdown) = Shutdown::new();
    let engine = Engine::new(gateway, throttle, precision, strategy, settings);
    let mut engine_task = tokio::spawn(async move { engine.run(shutdown).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested, finishing the current step");
            let _ = trigger.send(true);
            let _ = (&mut engine_task).await;
        }
        result = &mut engine_task => {
            if let Err(e) = result {
                tracing::error!("engine task failed: {}", e);
            }
        }
    }

    tracing::info!("perpbot stopped");
    Ok(())
}
