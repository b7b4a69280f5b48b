// Exchange access: gateway contract, Binance implementation, throttling
pub mod binance;
pub mod error;
pub mod throttle;

pub use binance::BinanceFutures;
pub use error::GatewayError;
pub use throttle::Throttle;

use crate::models::{
    Candle, InstrumentMeta, MarginMode, OpenOrder, OrderAck, OrderRequest, Position,
};
use async_trait::async_trait;

/// The exchange operations the engine needs, regardless of transport.
///
/// Every method is a single remote call with no retry or pacing of its own;
/// callers are expected to go through [`Throttle::call`]. Keeping the trait
/// this narrow lets tests drive the engine with an in-memory fake.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Free balance for one asset (e.g. "USDT").
    async fn balance(&self, asset: &str) -> Result<f64, GatewayError>;

    /// All tradable instrument symbols.
    async fn list_instruments(&self) -> Result<Vec<String>, GatewayError>;

    /// Most recent `limit` candles for a symbol, ascending by open time.
    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Current mark/last price for a symbol.
    async fn price(&self, symbol: &str) -> Result<f64, GatewayError>;

    /// The full instrument catalog with precision metadata.
    async fn instrument_metadata(&self) -> Result<Vec<(String, InstrumentMeta)>, GatewayError>;

    /// Set the margin mode for a symbol. "Already in this mode" counts as
    /// success, not an error.
    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<(), GatewayError>;

    /// Set leverage for a symbol.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError>;

    /// Submit one order and return the exchange acknowledgement.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Open positions with nonzero quantity.
    async fn open_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// All currently open orders.
    async fn open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError>;

    /// Cancel every open order for a symbol.
    async fn cancel_open_orders(&self, symbol: &str) -> Result<(), GatewayError>;
}
