use crate::api::{GatewayError, MarketGateway, Throttle};
use crate::config::Settings;
use crate::engine::Shutdown;
use crate::execution::rounding::round_to;
use crate::models::{
    BracketIntent, InstrumentMeta, MarginMode, OrderAck, OrderRequest, OrderType, Side,
    TimeInForce,
};
use crate::precision::PrecisionCache;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// The stations of the bracket sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketStep {
    Precision,
    MarginMode,
    Leverage,
    Entry,
    StopLoss,
    TakeProfit,
}

impl BracketStep {
    pub fn as_str(self) -> &'static str {
        match self {
            BracketStep::Precision => "precision lookup",
            BracketStep::MarginMode => "margin mode",
            BracketStep::Leverage => "leverage",
            BracketStep::Entry => "entry order",
            BracketStep::StopLoss => "stop-loss order",
            BracketStep::TakeProfit => "take-profit order",
        }
    }
}

impl fmt::Display for BracketStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bracket sequence that did not finish. Whatever was placed before the
/// failing step stays on the exchange; the next reconciliation cycle will
/// see the resulting position/orders and keep the instrument off limits.
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("{step} failed for {symbol}: {source}")]
    Step {
        symbol: String,
        step: BracketStep,
        #[source]
        source: GatewayError,
    },

    #[error("shutdown requested before {step} for {symbol}")]
    Interrupted { symbol: String, step: BracketStep },
}

impl BracketError {
    pub fn step(&self) -> BracketStep {
        match self {
            BracketError::Step { step, .. } | BracketError::Interrupted { step, .. } => *step,
        }
    }
}

/// Exchange acknowledgements for all three legs of a completed bracket.
#[derive(Debug)]
pub struct BracketReceipt {
    pub intent: BracketIntent,
    pub entry: OrderAck,
    pub stop: OrderAck,
    pub take_profit: OrderAck,
}

/// Drives one instrument from directional signal to a fully bracketed
/// position: margin mode, leverage, limit entry, protective stop, protective
/// take-profit, strictly in that order.
///
/// Failures abort the remaining steps for this instrument only and are not
/// retried here (the throttle already retried anything transient). Partial
/// brackets are deliberately left in place rather than rolled back; the
/// reconciliation loop owns the cleanup decision.
pub struct Orchestrator {
    gateway: Arc<dyn MarketGateway>,
    throttle: Throttle,
    precision: PrecisionCache,
    notional: f64,
    leverage: u32,
    margin_mode: MarginMode,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    settle_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        throttle: Throttle,
        precision: PrecisionCache,
        settings: &Settings,
    ) -> Self {
        Self {
            gateway,
            throttle,
            precision,
            notional: settings.trading.notional,
            leverage: settings.trading.leverage,
            margin_mode: settings.trading.margin_mode,
            stop_loss_pct: settings.trading.stop_loss_pct,
            take_profit_pct: settings.trading.take_profit_pct,
            settle_delay: settings.settle_delay(),
        }
    }

    /// Pure price/quantity arithmetic for one bracket, rounded to the
    /// instrument's precision before anything touches the wire.
    pub fn plan(
        &self,
        symbol: &str,
        side: Side,
        reference_price: f64,
        meta: InstrumentMeta,
    ) -> BracketIntent {
        let quantity = round_to(self.notional / reference_price, meta.quantity_precision);

        let (stop_factor, tp_factor) = match side {
            Side::Buy => (1.0 - self.stop_loss_pct, 1.0 + self.take_profit_pct),
            Side::Sell => (1.0 + self.stop_loss_pct, 1.0 - self.take_profit_pct),
        };

        BracketIntent {
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price: round_to(reference_price, meta.price_precision),
            stop_price: round_to(reference_price * stop_factor, meta.price_precision),
            take_profit_price: round_to(reference_price * tp_factor, meta.price_precision),
        }
    }

    /// Run the full bracket sequence for one instrument.
    ///
    /// A configurable settle delay separates consecutive exchange
    /// operations; shutdown is honored between steps, never mid-call.
    pub async fn execute(
        &self,
        symbol: &str,
        side: Side,
        reference_price: f64,
        shutdown: &Shutdown,
    ) -> Result<BracketReceipt, BracketError> {
        let meta = self
            .precision
            .precision(symbol)
            .await
            .map_err(|e| self.step_error(symbol, BracketStep::Precision, e))?;

        let intent = self.plan(symbol, side, reference_price, meta);
        tracing::info!(
            "{}: planning {:?} bracket - qty {} entry {} stop {} tp {}",
            symbol,
            side,
            intent.quantity,
            intent.entry_price,
            intent.stop_price,
            intent.take_profit_price
        );

        // 1. Margin mode ("already set" is success at the gateway level)
        self.checkpoint(symbol, BracketStep::MarginMode, shutdown)?;
        {
            let gateway = self.gateway.clone();
            let sym = symbol.to_string();
            let mode = self.margin_mode;
            self.throttle
                .call("set margin mode", move || {
                    let gateway = gateway.clone();
                    let sym = sym.clone();
                    async move { gateway.set_margin_mode(&sym, mode).await }
                })
                .await
                .map_err(|e| self.step_error(symbol, BracketStep::MarginMode, e))?;
        }
        shutdown.pause(self.settle_delay).await;

        // 2. Leverage
        self.checkpoint(symbol, BracketStep::Leverage, shutdown)?;
        {
            let gateway = self.gateway.clone();
            let sym = symbol.to_string();
            let leverage = self.leverage;
            self.throttle
                .call("set leverage", move || {
                    let gateway = gateway.clone();
                    let sym = sym.clone();
                    async move { gateway.set_leverage(&sym, leverage).await }
                })
                .await
                .map_err(|e| self.step_error(symbol, BracketStep::Leverage, e))?;
        }
        shutdown.pause(self.settle_delay).await;

        // 3. Limit entry at the reference price
        self.checkpoint(symbol, BracketStep::Entry, shutdown)?;
        let entry = self
            .submit(
                BracketStep::Entry,
                OrderRequest {
                    symbol: symbol.to_string(),
                    side,
                    order_type: OrderType::Limit,
                    quantity: intent.quantity,
                    price: Some(intent.entry_price),
                    stop_price: None,
                    time_in_force: TimeInForce::Gtc,
                    client_order_id: Uuid::new_v4(),
                },
            )
            .await
            .map_err(|e| self.step_error(symbol, BracketStep::Entry, e))?;
        tracing::info!("{}: entry placed (order {})", symbol, entry.order_id);
        shutdown.pause(self.settle_delay).await;

        // 4. Protective stop on the opposite side
        self.checkpoint(symbol, BracketStep::StopLoss, shutdown)?;
        let stop = self
            .submit(
                BracketStep::StopLoss,
                OrderRequest {
                    symbol: symbol.to_string(),
                    side: side.inverse(),
                    order_type: OrderType::StopMarket,
                    quantity: intent.quantity,
                    price: None,
                    stop_price: Some(intent.stop_price),
                    time_in_force: TimeInForce::Gtc,
                    client_order_id: Uuid::new_v4(),
                },
            )
            .await
            .map_err(|e| self.step_error(symbol, BracketStep::StopLoss, e))?;
        tracing::info!("{}: stop-loss placed (order {})", symbol, stop.order_id);
        shutdown.pause(self.settle_delay).await;

        // 5. Take-profit on the opposite side
        self.checkpoint(symbol, BracketStep::TakeProfit, shutdown)?;
        let take_profit = self
            .submit(
                BracketStep::TakeProfit,
                OrderRequest {
                    symbol: symbol.to_string(),
                    side: side.inverse(),
                    order_type: OrderType::TakeProfitMarket,
                    quantity: intent.quantity,
                    price: None,
                    stop_price: Some(intent.take_profit_price),
                    time_in_force: TimeInForce::Gtc,
                    client_order_id: Uuid::new_v4(),
                },
            )
            .await
            .map_err(|e| self.step_error(symbol, BracketStep::TakeProfit, e))?;
        tracing::info!(
            "{}: take-profit placed (order {}), bracket complete",
            symbol,
            take_profit.order_id
        );

        Ok(BracketReceipt {
            intent,
            entry,
            stop,
            take_profit,
        })
    }

    async fn submit(
        &self,
        step: BracketStep,
        request: OrderRequest,
    ) -> Result<OrderAck, GatewayError> {
        let gateway = self.gateway.clone();
        let request = Arc::new(request);
        self.throttle
            .call(step.as_str(), move || {
                let gateway = gateway.clone();
                let request = request.clone();
                async move { gateway.place_order(&request).await }
            })
            .await
    }

    fn checkpoint(
        &self,
        symbol: &str,
        step: BracketStep,
        shutdown: &Shutdown,
    ) -> Result<(), BracketError> {
        if shutdown.is_triggered() {
            Err(BracketError::Interrupted {
                symbol: symbol.to_string(),
                step,
            })
        } else {
            Ok(())
        }
    }

    fn step_error(&self, symbol: &str, step: BracketStep, source: GatewayError) -> BracketError {
        BracketError::Step {
            symbol: symbol.to_string(),
            step,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Throttle;
    use crate::engine::Shutdown;

    fn meta(price_precision: u32, quantity_precision: u32) -> InstrumentMeta {
        InstrumentMeta {
            price_precision,
            quantity_precision,
        }
    }

    fn test_orchestrator(gateway: Arc<dyn MarketGateway>) -> Orchestrator {
        let throttle = Throttle::new(
            Duration::from_millis(1),
            1,
            Duration::from_millis(1),
        );
        let precision = PrecisionCache::new(gateway.clone(), throttle.clone());
        let mut settings = Settings::default();
        settings.scheduler.settle_delay_ms = 0;
        Orchestrator::new(gateway, throttle, precision, &settings)
    }

    // A gateway stub that only answers what plan() needs.
    struct NoopGateway;

    #[async_trait::async_trait]
    impl MarketGateway for NoopGateway {
        async fn balance(&self, _: &str) -> Result<f64, GatewayError> {
            unimplemented!()
        }
        async fn list_instruments(&self) -> Result<Vec<String>, GatewayError> {
            unimplemented!()
        }
        async fn candles(
            &self,
            _: &str,
            _: &str,
            _: u32,
        ) -> Result<Vec<crate::models::Candle>, GatewayError> {
            unimplemented!()
        }
        async fn price(&self, _: &str) -> Result<f64, GatewayError> {
            unimplemented!()
        }
        async fn instrument_metadata(
            &self,
        ) -> Result<Vec<(String, InstrumentMeta)>, GatewayError> {
            unimplemented!()
        }
        async fn set_margin_mode(&self, _: &str, _: MarginMode) -> Result<(), GatewayError> {
            unimplemented!()
        }
        async fn set_leverage(&self, _: &str, _: u32) -> Result<(), GatewayError> {
            unimplemented!()
        }
        async fn place_order(&self, _: &OrderRequest) -> Result<OrderAck, GatewayError> {
            unimplemented!()
        }
        async fn open_positions(&self) -> Result<Vec<crate::models::Position>, GatewayError> {
            unimplemented!()
        }
        async fn open_orders(&self) -> Result<Vec<crate::models::OpenOrder>, GatewayError> {
            unimplemented!()
        }
        async fn cancel_open_orders(&self, _: &str) -> Result<(), GatewayError> {
            unimplemented!()
        }
    }

    #[test]
    fn test_plan_buy_reference_values() {
        let orchestrator = test_orchestrator(Arc::new(NoopGateway));
        let intent = orchestrator.plan("BTCUSDT", Side::Buy, 100.0, meta(1, 1));

        assert_eq!(intent.quantity, 0.1);
        assert_eq!(intent.entry_price, 100.0);
        assert_eq!(intent.stop_price, 99.1);
        assert_eq!(intent.take_profit_price, 101.2);
        assert_eq!(intent.side, Side::Buy);
    }

    #[test]
    fn test_plan_sell_reference_values() {
        let orchestrator = test_orchestrator(Arc::new(NoopGateway));
        let intent = orchestrator.plan("BTCUSDT", Side::Sell, 100.0, meta(1, 1));

        assert_eq!(intent.stop_price, 100.9);
        assert_eq!(intent.take_profit_price, 98.8);
    }

    #[test]
    fn test_plan_rounds_quantity_to_precision() {
        let orchestrator = test_orchestrator(Arc::new(NoopGateway));
        // 10 / 3 = 3.333... truncated by rounding to one decimal
        let intent = orchestrator.plan("XRPUSDT", Side::Buy, 3.0, meta(4, 1));
        assert_eq!(intent.quantity, 3.3);
    }

    #[test]
    fn test_shutdown_checkpoint_interrupts() {
        let orchestrator = test_orchestrator(Arc::new(NoopGateway));
        let (trigger, shutdown) = Shutdown::new();
        trigger.send(true).unwrap();

        let err = orchestrator
            .checkpoint("BTCUSDT", BracketStep::Entry, &shutdown)
            .unwrap_err();
        assert!(matches!(
            err,
            BracketError::Interrupted {
                step: BracketStep::Entry,
                ..
            }
        ));
    }
}
