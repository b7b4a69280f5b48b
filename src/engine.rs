use crate::api::{GatewayError, MarketGateway, Throttle};
use crate::config::Settings;
use crate::execution::{BracketError, BracketStep, Orchestrator};
use crate::models::{OpenOrder, Position};
use crate::precision::PrecisionCache;
use crate::strategy::Strategy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cooperative shutdown signal, checked between cycle steps and between
/// bracket steps. In-flight gateway calls always complete or time out on
/// their own; nothing is aborted mid-call.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger and the handle. Send `true` on the trigger to
    /// request shutdown.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep that ends early when shutdown fires, so waits never delay a
    /// clean exit.
    pub async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = rx.wait_for(|triggered| *triggered) => {}
        }
    }
}

/// The reconciliation loop.
///
/// Each cycle rebuilds its whole view from live queries: balance, open
/// positions, open orders. Nothing is carried across cycles except the
/// instrument precision cache, so a crash-free restart and an ordinary
/// cycle look identical to the exchange.
pub struct Engine {
    gateway: Arc<dyn MarketGateway>,
    throttle: Throttle,
    strategy: Box<dyn Strategy>,
    orchestrator: Orchestrator,
    settings: Settings,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        throttle: Throttle,
        precision: PrecisionCache,
        strategy: Box<dyn Strategy>,
        settings: Settings,
    ) -> Self {
        let orchestrator =
            Orchestrator::new(gateway.clone(), throttle.clone(), precision, &settings);
        Self {
            gateway,
            throttle,
            strategy,
            orchestrator,
            settings,
        }
    }

    /// Run cycles until shutdown. Never returns early on gateway trouble:
    /// every failure below this loop is logged and contained.
    pub async fn run(&self, shutdown: Shutdown) {
        tracing::info!(
            "engine starting: strategy {}, interval {}, cap {}",
            self.strategy.name(),
            self.settings.trading.candle_interval,
            self.settings.trading.max_open_positions
        );

        let universe = loop {
            if shutdown.is_triggered() {
                return;
            }
            match self.tradable_universe().await {
                Ok(universe) if !universe.is_empty() => break universe,
                Ok(_) => tracing::warn!("instrument list came back empty, retrying"),
                Err(e) => tracing::warn!("failed to fetch instrument list: {}", e),
            }
            shutdown.pause(self.settings.cycle_interval()).await;
        };
        tracing::info!("{} tradable instruments", universe.len());

        while !shutdown.is_triggered() {
            self.cycle(&universe, &shutdown).await;
            shutdown.pause(self.settings.cycle_interval()).await;
        }
        tracing::info!("engine stopped");
    }

    /// One reconciliation pass: balance, exchange state, orphan cleanup,
    /// then signal evaluation and entries for eligible instruments.
    pub async fn cycle(&self, universe: &[String], shutdown: &Shutdown) {
        // 1. Balance first; trading decisions on a stale balance are worse
        // than skipping a cycle.
        let balance = match self.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("balance unavailable, skipping cycle: {}", e);
                return;
            }
        };
        tracing::info!(
            "balance: {:.2} {}",
            balance,
            self.settings.exchange.quote_asset
        );

        // 2. Authoritative exchange state for this cycle
        let positions = match self.fetch_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!("positions unavailable, skipping cycle: {}", e);
                return;
            }
        };
        let orders = match self.fetch_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!("open orders unavailable, skipping cycle: {}", e);
                return;
            }
        };

        let positioned: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        let pending: HashSet<&str> = orders.iter().map(|o| o.symbol.as_str()).collect();
        tracing::info!(
            "open positions: {}, instruments with open orders: {}",
            positioned.len(),
            pending.len()
        );

        // 3. Orphan cleanup: orders without a position are stale bracket legs
        for symbol in &pending {
            if positioned.contains(symbol) {
                continue;
            }
            if shutdown.is_triggered() {
                return;
            }
            match self.cancel_orders(symbol).await {
                Ok(()) => tracing::info!("{}: cancelled orphaned orders", symbol),
                Err(e) => tracing::warn!("{}: failed to cancel orphaned orders: {}", symbol, e),
            }
        }

        // 4. Entries, bounded by the position cap
        let cap = self.settings.trading.max_open_positions;
        if positioned.len() >= cap {
            tracing::info!("position cap reached ({}/{}), no new entries", positioned.len(), cap);
            return;
        }
        let mut slots = cap - positioned.len();

        for symbol in universe {
            if shutdown.is_triggered() {
                return;
            }
            if slots == 0 {
                break;
            }
            if positioned.contains(symbol.as_str()) || pending.contains(symbol.as_str()) {
                continue;
            }

            let candles = match self.fetch_candles(symbol).await {
                Ok(candles) => candles,
                Err(e) => {
                    tracing::warn!("{}: candles unavailable: {}", symbol, e);
                    continue;
                }
            };

            let signal = self.strategy.signal(&candles);
            let Some(side) = signal.entry_side() else {
                continue;
            };
            tracing::info!("{}: {:?} signal from {}", symbol, signal, self.strategy.name());

            let price = match self.fetch_price(symbol).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!("{}: price unavailable: {}", symbol, e);
                    continue;
                }
            };

            match self.orchestrator.execute(symbol, side, price, shutdown).await {
                Ok(receipt) => {
                    slots -= 1;
                    tracing::info!(
                        "{}: bracket open - entry {} qty {}",
                        symbol,
                        receipt.intent.entry_price,
                        receipt.intent.quantity
                    );
                }
                Err(e @ BracketError::Interrupted { .. }) => {
                    tracing::info!("{}", e);
                    return;
                }
                // Partial brackets stay on the exchange; next cycle sees the
                // instrument as positioned/pending and leaves it alone. An
                // entry that went in before a protective leg failed can still
                // fill, so it consumes a slot like a completed bracket.
                Err(e) => {
                    if matches!(e.step(), BracketStep::StopLoss | BracketStep::TakeProfit) {
                        slots -= 1;
                    }
                    tracing::error!("{}", e);
                }
            }
        }
    }

    /// All symbols quoted in the configured asset, minus exclusions.
    async fn tradable_universe(&self) -> Result<Vec<String>, GatewayError> {
        let gateway = self.gateway.clone();
        let symbols = self
            .throttle
            .call("list instruments", move || {
                let gateway = gateway.clone();
                async move { gateway.list_instruments().await }
            })
            .await?;

        let quote = &self.settings.exchange.quote_asset;
        let excluded = &self.settings.trading.excluded_symbols;
        Ok(symbols
            .into_iter()
            .filter(|s| s.ends_with(quote) && !excluded.contains(s))
            .collect())
    }

    async fn fetch_balance(&self) -> Result<f64, GatewayError> {
        let gateway = self.gateway.clone();
        let asset = self.settings.exchange.quote_asset.clone();
        self.throttle
            .call("balance", move || {
                let gateway = gateway.clone();
                let asset = asset.clone();
                async move { gateway.balance(&asset).await }
            })
            .await
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let gateway = self.gateway.clone();
        self.throttle
            .call("open positions", move || {
                let gateway = gateway.clone();
                async move { gateway.open_positions().await }
            })
            .await
    }

    async fn fetch_open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError> {
        let gateway = self.gateway.clone();
        self.throttle
            .call("open orders", move || {
                let gateway = gateway.clone();
                async move { gateway.open_orders().await }
            })
            .await
    }

    async fn cancel_orders(&self, symbol: &str) -> Result<(), GatewayError> {
        let gateway = self.gateway.clone();
        let symbol = symbol.to_string();
        self.throttle
            .call("cancel open orders", move || {
                let gateway = gateway.clone();
                let symbol = symbol.clone();
                async move { gateway.cancel_open_orders(&symbol).await }
            })
            .await
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
    ) -> Result<Vec<crate::models::Candle>, GatewayError> {
        let gateway = self.gateway.clone();
        let symbol = symbol.to_string();
        let interval = self.settings.trading.candle_interval.clone();
        let limit = self.settings.trading.candle_lookback;
        self.throttle
            .call("candles", move || {
                let gateway = gateway.clone();
                let symbol = symbol.clone();
                let interval = interval.clone();
                async move { gateway.candles(&symbol, &interval, limit).await }
            })
            .await
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        let gateway = self.gateway.clone();
        let symbol = symbol.to_string();
        self.throttle
            .call("price", move || {
                let gateway = gateway.clone();
                let symbol = symbol.clone();
                async move { gateway.price(&symbol).await }
            })
            .await
    }
}
