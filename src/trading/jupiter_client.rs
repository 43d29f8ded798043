/// Jupiter API Client for swap routing
///
/// Quotes a route, then asks Jupiter V6 to serialize an unsigned transaction
/// for it. Signing and submission stay with the swap pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use crate::config::Jupiter;

/// Jupiter quote response
///
/// Only the fields the pipeline reads are typed; everything else is carried
/// through untouched because the swap endpoint expects the quote verbatim.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount
    pub in_amount: String,
    /// Output amount
    pub out_amount: String,
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Swap request for executing trades
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// User's public key
    pub user_public_key: String,
    /// Quote response from Jupiter
    pub quote_response: QuoteResponse,
    #[serde(flatten)]
    pub config: SwapConfig,
}

/// Swap configuration
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapConfig {
    /// Wrap and unwrap SOL automatically
    pub wrap_and_unwrap_sol: bool,
    /// Fee account (for platform fees)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_account: Option<String>,
    /// Compute unit price in micro-lamports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_unit_price_micro_lamports: Option<u64>,
    /// Routing tip, `{"jitoTipLamports": n}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<Value>,
    /// Dynamic compute units
    pub dynamic_compute_unit_limit: bool,
}

/// Jupiter swap response with transaction
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 serialized versioned transaction
    pub swap_transaction: String,
    /// Last block height at which the embedded blockhash is valid
    pub last_valid_block_height: u64,
    #[serde(default)]
    pub simulation_error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

/// Fee settings an account attaches to a swap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapFees {
    /// Micro-lamports per compute unit, sent as `computeUnitPriceMicroLamports`
    pub compute_unit_price_micro_lamports: u64,
    pub routing_fee_lamports: u64,
}

#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse>;

    async fn build_swap(
        &self,
        quote: &QuoteResponse,
        payer: &str,
        fees: SwapFees,
    ) -> Result<SwapResponse>;

    /// Token account that collects the platform fee, if any
    fn fee_account(&self) -> Option<&str>;
}

/// Jupiter V6 API client for swap execution
pub struct JupiterClient {
    /// HTTP client for API requests
    client: Client,
    /// Jupiter API base URL
    api_url: String,
    fee_account: Option<String>,
    platform_fee_bps: Option<u16>,
}

impl JupiterClient {
    pub fn new(config: &Jupiter) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            fee_account: config.fee_account.clone(),
            platform_fee_bps: config.platform_fee_bps,
        })
    }

    pub fn swap_request(&self, quote: &QuoteResponse, payer: &str, fees: SwapFees) -> SwapRequest {
        SwapRequest {
            user_public_key: payer.to_string(),
            quote_response: quote.clone(),
            config: SwapConfig {
                wrap_and_unwrap_sol: true,
                fee_account: self.fee_account.clone(),
                compute_unit_price_micro_lamports: (fees.compute_unit_price_micro_lamports > 0)
                    .then_some(fees.compute_unit_price_micro_lamports),
                prioritization_fee_lamports: (fees.routing_fee_lamports > 0).then(|| {
                    serde_json::json!({ "jitoTipLamports": fees.routing_fee_lamports })
                }),
                dynamic_compute_unit_limit: true,
            },
        }
    }
}

/// Pulls Jupiter's `{"error": ...}` message out of a failed response body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl SwapRouter for JupiterClient {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse> {
        debug!("🔍 Getting Jupiter quote: {} {} -> {}", amount, input_mint, output_mint);

        let mut params = vec![
            ("inputMint", input_mint.to_string()),
            ("outputMint", output_mint.to_string()),
            ("amount", amount.to_string()),
            ("slippageBps", slippage_bps.to_string()),
        ];
        if let Some(bps) = self.platform_fee_bps {
            params.push(("platformFeeBps", bps.to_string()));
        }

        let url = format!("{}/quote", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to request quote from Jupiter")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{}", error_message(&body));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .context("Failed to parse Jupiter quote response")?;

        debug!(
            "📊 Quote received: {} {} -> {} {} (impact: {:?}%)",
            quote.in_amount, input_mint, quote.out_amount, output_mint, quote.price_impact_pct
        );
        Ok(quote)
    }

    async fn build_swap(
        &self,
        quote: &QuoteResponse,
        payer: &str,
        fees: SwapFees,
    ) -> Result<SwapResponse> {
        let url = format!("{}/swap", self.api_url);
        debug!("📤 Requesting swap transaction from Jupiter");

        let response = self
            .client
            .post(&url)
            .json(&self.swap_request(quote, payer, fees))
            .send()
            .await
            .context("Failed to request swap transaction from Jupiter")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Jupiter swap transaction request failed with status {}: {}",
                status,
                error_message(&body)
            );
        }

        let swap_response: SwapResponse = response
            .json()
            .await
            .context("Failed to parse Jupiter swap response")?;
        debug!("📥 Swap transaction received from Jupiter");
        Ok(swap_response)
    }

    fn fee_account(&self) -> Option<&str> {
        self.fee_account.as_deref()
    }
}
