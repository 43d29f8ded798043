/// Token prices in SOL from the Jupiter price API

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Jupiter;
use crate::core::SOL_MINT;

/// Same-mint lookups inside one monitor pass share a quote
const CACHE_DURATION: Duration = Duration::from_millis(1_000);

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price in SOL per whole token; `None` when the service has no price yet
    async fn price(&self, mint: &str) -> Result<Option<f64>>;
}

pub struct PriceFeed {
    client: Client,
    api_url: String,
    token_cache: Arc<Mutex<HashMap<String, (f64, Instant)>>>,
}

impl PriceFeed {
    pub fn new(config: &Jupiter) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .context("Failed to create HTTP client")?,
            api_url: config.price_api_url.clone(),
            token_cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn fetch_jupiter_price(&self, mint: &str) -> Result<Option<f64>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("ids", mint), ("vsToken", SOL_MINT)])
            .send()
            .await
            .context("Failed to request price from Jupiter")?;

        if !response.status().is_success() {
            anyhow::bail!("Jupiter price API error: {}", response.status());
        }

        let data: Value = response
            .json()
            .await
            .context("Failed to parse Jupiter price response")?;
        Ok(parse_price(&data, mint))
    }

    fn get_cached_token_price(&self, mint: &str) -> Option<f64> {
        let cache = self
            .token_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .get(mint)
            .filter(|(_, fetched)| fetched.elapsed() < CACHE_DURATION)
            .map(|(price, _)| *price)
    }

    fn cache_token_price(&self, mint: &str, price: f64) {
        let mut cache = self
            .token_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.retain(|_, (_, fetched)| fetched.elapsed() < CACHE_DURATION);
        cache.insert(mint.to_string(), (price, Instant::now()));
    }
}

/// V2 format: `{ "data": { "<mint>": { "price": "0.0012" } } }`, entry null when unknown
fn parse_price(data: &Value, mint: &str) -> Option<f64> {
    let price = &data["data"][mint]["price"];
    price
        .as_str()
        .and_then(|p| p.parse::<f64>().ok())
        .or_else(|| price.as_f64())
        .filter(|p| p.is_finite() && *p > 0.0)
}

#[async_trait]
impl PriceSource for PriceFeed {
    async fn price(&self, mint: &str) -> Result<Option<f64>> {
        if let Some(cached_price) = self.get_cached_token_price(mint) {
            return Ok(Some(cached_price));
        }

        let price = self.fetch_jupiter_price(mint).await?;
        if let Some(price) = price {
            self.cache_token_price(mint, price);
            debug!(mint = %mint, price, "Jupiter price");
        }
        Ok(price)
    }
}
