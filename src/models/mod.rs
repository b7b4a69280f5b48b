use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV bar. Series are ordered ascending by open time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Directional signal produced per instrument per cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Up,
    Down,
    None,
}

impl Signal {
    /// Entry side for this signal, if it calls for an entry at all.
    pub fn entry_side(self) -> Option<Side> {
        match self {
            Signal::Up => Some(Side::Buy),
            Signal::Down => Some(Side::Sell),
            Signal::None => None,
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The protective legs of a bracket always sit on the opposite side.
    pub fn inverse(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Margin mode applied per instrument before entering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

impl MarginMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MarginMode::Isolated => "ISOLATED",
            MarginMode::Cross => "CROSSED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
        }
    }
}

/// A single order submission. `price` is set for limit orders, `stop_price`
/// for stop-market and take-profit-market orders.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub client_order_id: Uuid,
}

/// Exchange acknowledgement of a placed order.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
}

/// An open position as reported by the exchange. Quantity is signed and
/// nonzero by construction: zero rows are filtered at the gateway boundary.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
}

/// An open order as reported by the exchange. The engine only cares which
/// instruments have at least one.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: i64,
}

/// Per-instrument precision metadata, immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentMeta {
    pub price_precision: u32,
    pub quantity_precision: u32,
}

/// The fully computed three-legged order plan for one instrument. Built at
/// signal time, consumed by the orchestrator, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
}
