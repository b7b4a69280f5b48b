use crate::api::error::GatewayError;
use crate::api::MarketGateway;
use crate::models::{
    Candle, InstrumentMeta, MarginMode, OpenOrder, OrderAck, OrderRequest, OrderType, Position,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const HTTP_TIMEOUT_SECS: u64 = 30;

// Binance error code for "No need to change margin type"
const CODE_MARGIN_MODE_UNCHANGED: i64 = -4046;

/// Binance USD-M futures REST gateway.
///
/// Thin transport layer: one method per endpoint, exchange error codes mapped
/// into [`GatewayError`]. Pacing and retries live in the throttle, not here.
#[derive(Clone)]
pub struct BinanceFutures {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    price_precision: u32,
    quantity_precision: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderEntry {
    symbol: String,
    order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    order_id: i64,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceFutures {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        api_secret: String,
        recv_window_ms: u64,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            api_secret,
            recv_window_ms,
        })
    }

    /// HMAC-SHA256 over the query string, hex encoded, as required for all
    /// private endpoints.
    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn encode_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn get_public(&self, path: &str, params: &[(&str, String)]) -> Result<Response, GatewayError> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url = format!("{}?{}", url, Self::encode_query(params));
        }
        let response = self.http.get(&url).send().await?;
        Self::check_status(response).await
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<Response, GatewayError> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = Self::encode_query(&params);
        let signature = self.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Turn a non-success response into the matching `GatewayError`.
    async fn check_status(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // 429 is the documented rate-limit response; 418 is the IP ban that
        // follows repeated 429s.
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(GatewayError::RateLimited);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => Err(Self::map_error_code(err.code, err.msg)),
            Err(_) => Err(GatewayError::Malformed(format!(
                "HTTP {}: {}",
                status, body
            ))),
        }
    }

    fn map_error_code(code: i64, msg: String) -> GatewayError {
        match code {
            -1003 => GatewayError::RateLimited,
            -1022 | -2014 | -2015 => GatewayError::Auth(msg),
            _ => GatewayError::Rejected { code, message: msg },
        }
    }

    fn parse_f64(raw: &str, what: &str) -> Result<f64, GatewayError> {
        raw.parse::<f64>()
            .map_err(|_| GatewayError::Malformed(format!("bad {}: {:?}", what, raw)))
    }

    /// A kline row is a mixed JSON array: open time in ms, then OHLCV as
    /// strings, plus fields we ignore.
    fn parse_kline_row(row: &[serde_json::Value]) -> Result<Candle, GatewayError> {
        if row.len() < 6 {
            return Err(GatewayError::Malformed(format!(
                "kline row with {} fields",
                row.len()
            )));
        }

        let open_ms = row[0]
            .as_i64()
            .ok_or_else(|| GatewayError::Malformed("kline open time".to_string()))?;
        let open_time = Utc
            .timestamp_millis_opt(open_ms)
            .single()
            .ok_or_else(|| GatewayError::Malformed(format!("kline open time {}", open_ms)))?;

        let field = |i: usize, what: &str| -> Result<f64, GatewayError> {
            let raw = row[i]
                .as_str()
                .ok_or_else(|| GatewayError::Malformed(format!("kline {}", what)))?;
            Self::parse_f64(raw, what)
        };

        Ok(Candle {
            open_time,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        })
    }
}

#[async_trait]
impl MarketGateway for BinanceFutures {
    async fn balance(&self, asset: &str) -> Result<f64, GatewayError> {
        let response = self.send_signed(Method::GET, "/fapi/v2/balance", vec![]).await?;
        let entries: Vec<BalanceEntry> = response.json().await?;

        let entry = entries
            .into_iter()
            .find(|e| e.asset == asset)
            .ok_or_else(|| GatewayError::Malformed(format!("no {} balance entry", asset)))?;
        Self::parse_f64(&entry.balance, "balance")
    }

    async fn list_instruments(&self) -> Result<Vec<String>, GatewayError> {
        let response = self.get_public("/fapi/v1/ticker/price", &[]).await?;
        let tickers: Vec<TickerPrice> = response.json().await?;
        Ok(tickers.into_iter().map(|t| t.symbol).collect())
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let response = self.get_public("/fapi/v1/klines", &params).await?;
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;

        rows.iter().map(|row| Self::parse_kline_row(row)).collect()
    }

    async fn price(&self, symbol: &str) -> Result<f64, GatewayError> {
        let params = [("symbol", symbol.to_string())];
        let response = self.get_public("/fapi/v1/ticker/price", &params).await?;
        let ticker: TickerPrice = response.json().await?;
        Self::parse_f64(&ticker.price, "price")
    }

    async fn instrument_metadata(&self) -> Result<Vec<(String, InstrumentMeta)>, GatewayError> {
        let response = self.get_public("/fapi/v1/exchangeInfo", &[]).await?;
        let info: ExchangeInfo = response.json().await?;

        Ok(info
            .symbols
            .into_iter()
            .map(|s| {
                (
                    s.symbol,
                    InstrumentMeta {
                        price_precision: s.price_precision,
                        quantity_precision: s.quantity_precision,
                    },
                )
            })
            .collect())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("marginType", mode.as_str().to_string()),
        ];
        match self.send_signed(Method::POST, "/fapi/v1/marginType", params).await {
            Ok(_) => Ok(()),
            // Already in the requested mode: idempotent success.
            Err(GatewayError::Rejected { code, .. }) if code == CODE_MARGIN_MODE_UNCHANGED => {
                tracing::debug!("{} already in {} margin mode", symbol, mode.as_str());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        self.send_signed(Method::POST, "/fapi/v1/leverage", params).await?;
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.to_string()),
            ("timeInForce", request.time_in_force.as_str().to_string()),
            ("newClientOrderId", request.client_order_id.to_string()),
        ];

        match request.order_type {
            OrderType::Limit => {
                let price = request.price.ok_or_else(|| {
                    GatewayError::Malformed("limit order without price".to_string())
                })?;
                params.push(("price", price.to_string()));
            }
            OrderType::StopMarket | OrderType::TakeProfitMarket => {
                let stop = request.stop_price.ok_or_else(|| {
                    GatewayError::Malformed("trigger order without stop price".to_string())
                })?;
                params.push(("stopPrice", stop.to_string()));
            }
        }

        let response = self.send_signed(Method::POST, "/fapi/v1/order", params).await?;
        let ack: NewOrderResponse = response.json().await?;

        Ok(OrderAck {
            order_id: ack.order_id,
            client_order_id: ack.client_order_id,
        })
    }

    async fn open_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let response = self
            .send_signed(Method::GET, "/fapi/v2/positionRisk", vec![])
            .await?;
        let rows: Vec<PositionRisk> = response.json().await?;

        let mut positions = Vec::new();
        for row in rows {
            let quantity = Self::parse_f64(&row.position_amt, "position amount")?;
            // Flat symbols come back with a zero row; drop them here so the
            // engine only ever sees real positions.
            if quantity != 0.0 {
                positions.push(Position {
                    symbol: row.symbol,
                    quantity,
                });
            }
        }
        Ok(positions)
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError> {
        let response = self
            .send_signed(Method::GET, "/fapi/v1/openOrders", vec![])
            .await?;
        let rows: Vec<OpenOrderEntry> = response.json().await?;

        Ok(rows
            .into_iter()
            .map(|o| OpenOrder {
                symbol: o.symbol,
                order_id: o.order_id,
            })
            .collect())
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<(), GatewayError> {
        let params = vec![("symbol", symbol.to_string())];
        self.send_signed(Method::DELETE, "/fapi/v1/allOpenOrders", params)
            .await?;
        Ok(())
    }
}
