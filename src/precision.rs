use crate::api::{GatewayError, MarketGateway, Throttle};
use crate::models::InstrumentMeta;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-instrument precision lookup backed by one `exchangeInfo` fetch.
///
/// The catalog is loaded on the first miss and kept for the process lifetime;
/// `refresh` re-fetches it explicitly. Metadata never changes shape once
/// resolved, so readers share the map behind an `RwLock`.
///
/// Cloneable; all clones share the same cache.
#[derive(Clone)]
pub struct PrecisionCache {
    gateway: Arc<dyn MarketGateway>,
    throttle: Throttle,
    catalog: Arc<RwLock<HashMap<String, InstrumentMeta>>>,
}

impl PrecisionCache {
    pub fn new(gateway: Arc<dyn MarketGateway>, throttle: Throttle) -> Self {
        Self {
            gateway,
            throttle,
            catalog: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Price and quantity precision for one symbol.
    ///
    /// Fails with `InstrumentNotFound` when the symbol is absent from the
    /// exchange catalog even after a (re)load.
    pub async fn precision(&self, symbol: &str) -> Result<InstrumentMeta, GatewayError> {
        {
            let catalog = self.catalog.read().await;
            if let Some(meta) = catalog.get(symbol) {
                return Ok(*meta);
            }
            // A miss on a loaded catalog means the symbol does not exist;
            // re-fetching per miss would defeat the call-volume bound.
            if !catalog.is_empty() {
                return Err(GatewayError::InstrumentNotFound(symbol.to_string()));
            }
        }

        self.refresh().await?;

        self.catalog
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::InstrumentNotFound(symbol.to_string()))
    }

    /// Re-fetch the full instrument catalog, replacing the cached copy.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        let gateway = self.gateway.clone();
        let entries = self
            .throttle
            .call("exchange metadata", move || {
                let gateway = gateway.clone();
                async move { gateway.instrument_metadata().await }
            })
            .await?;

        let mut catalog = self.catalog.write().await;
        catalog.clear();
        catalog.extend(entries);
        tracing::debug!("instrument catalog loaded: {} symbols", catalog.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Candle, MarginMode, OpenOrder, OrderAck, OrderRequest, Position,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CatalogGateway {
        fetches: AtomicU32,
    }

    #[async_trait]
    impl MarketGateway for CatalogGateway {
        async fn balance(&self, _asset: &str) -> Result<f64, GatewayError> {
            unimplemented!()
        }
        async fn list_instruments(&self) -> Result<Vec<String>, GatewayError> {
            unimplemented!()
        }
        async fn candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Result<Vec<Candle>, GatewayError> {
            unimplemented!()
        }
        async fn price(&self, _symbol: &str) -> Result<f64, GatewayError> {
            unimplemented!()
        }
        async fn instrument_metadata(
            &self,
        ) -> Result<Vec<(String, InstrumentMeta)>, GatewayError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                (
                    "BTCUSDT".to_string(),
                    InstrumentMeta {
                        price_precision: 1,
                        quantity_precision: 3,
                    },
                ),
                (
                    "ETHUSDT".to_string(),
                    InstrumentMeta {
                        price_precision: 2,
                        quantity_precision: 3,
                    },
                ),
            ])
        }
        async fn set_margin_mode(
            &self,
            _symbol: &str,
            _mode: MarginMode,
        ) -> Result<(), GatewayError> {
            unimplemented!()
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), GatewayError> {
            unimplemented!()
        }
        async fn place_order(&self, _request: &OrderRequest) -> Result<OrderAck, GatewayError> {
            unimplemented!()
        }
        async fn open_positions(&self) -> Result<Vec<Position>, GatewayError> {
            unimplemented!()
        }
        async fn open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError> {
            unimplemented!()
        }
        async fn cancel_open_orders(&self, _symbol: &str) -> Result<(), GatewayError> {
            unimplemented!()
        }
    }

    fn test_cache() -> (Arc<CatalogGateway>, PrecisionCache) {
        let gateway = Arc::new(CatalogGateway {
            fetches: AtomicU32::new(0),
        });
        let throttle = Throttle::new(Duration::from_millis(1), 1, Duration::from_millis(1));
        let cache = PrecisionCache::new(gateway.clone(), throttle);
        (gateway, cache)
    }

    #[tokio::test]
    async fn test_catalog_fetched_once_for_repeated_lookups() {
        let (gateway, cache) = test_cache();

        let btc = cache.precision("BTCUSDT").await.unwrap();
        let eth = cache.precision("ETHUSDT").await.unwrap();
        let btc_again = cache.precision("BTCUSDT").await.unwrap();

        assert_eq!(btc.price_precision, 1);
        assert_eq!(eth.price_precision, 2);
        assert_eq!(btc, btc_again);
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let (_gateway, cache) = test_cache();

        let result = cache.precision("NOPEUSDT").await;
        assert!(matches!(result, Err(GatewayError::InstrumentNotFound(s)) if s == "NOPEUSDT"));
    }

    #[tokio::test]
    async fn test_explicit_refresh_refetches() {
        let (gateway, cache) = test_cache();

        cache.precision("BTCUSDT").await.unwrap();
        cache.refresh().await.unwrap();
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 2);
    }
}
