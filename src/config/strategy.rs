/// Configuration structures

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub rpc: Rpc,
    pub jupiter: Jupiter,
    pub listener: Listener,
    pub monitor: Monitor,
    pub sell_policy: SellPolicy,
    pub policy: Policy,
    pub store: Store,
    pub telegram: Telegram,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Rpc {
    pub http_url: String,
    pub ws_url: String,
    pub backup_ws_urls: Vec<String>,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Poll interval while waiting for a submitted swap to confirm
    pub confirm_poll_ms: u64,
    /// Delay between submission attempts
    pub submit_retry_delay_ms: u64,
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            backup_ws_urls: Vec::new(),
            connect_timeout_ms: 30_000,
            reconnect_delay_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            confirm_poll_ms: 1_000,
            submit_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Jupiter {
    pub api_url: String,
    pub price_api_url: String,
    /// Platform fee token account; its ledger entries are excluded from swap deltas
    pub fee_account: Option<String>,
    pub platform_fee_bps: Option<u16>,
    pub request_timeout_secs: u64,
}

impl Default for Jupiter {
    fn default() -> Self {
        Self {
            api_url: "https://quote-api.jup.ag/v6".to_string(),
            price_api_url: "https://api.jup.ag/price/v2".to_string(),
            fee_account: None,
            platform_fee_bps: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Listener {
    pub program_id: String,
    pub instruction_marker: String,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            program_id: crate::core::RAYDIUM_AMM_PROGRAM.to_string(),
            instruction_marker: crate::core::POOL_INIT_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Monitor {
    pub min_interval_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Sell trigger rates relative to the entry price
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SellPolicy {
    /// Take profit once the watermark reaches entry * rate
    pub take_profit_rate: f64,
    /// Hard stop once the price falls to entry * rate
    pub stop_loss_rate: f64,
    /// Trailing stop once the price falls to watermark * rate
    pub trailing_rate: f64,
}

impl Default for SellPolicy {
    fn default() -> Self {
        Self {
            take_profit_rate: 1.3,
            stop_loss_rate: 0.7,
            trailing_rate: 0.9,
        }
    }
}

/// Whether new listings are broadcast before or after the risk screen
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    #[default]
    AcceptedOnly,
    Always,
}

/// What a confirmed swap reports when its balance delta cannot be resolved
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedBalancePolicy {
    #[default]
    Zero,
    Fail,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Policy {
    pub broadcast: BroadcastPolicy,
    pub unresolved_balance: UnresolvedBalancePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Store {
    pub path: String,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            path: "data/accounts.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Telegram {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
}

impl Default for Telegram {
    fn default() -> Self {
        Self {
            api_url: "https://api.telegram.org".to_string(),
            bot_token: None,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets and endpoints from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.telegram.bot_token = Some(token);
            }
        }
        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            self.rpc.http_url = url;
        }
        if let Ok(url) = std::env::var("SOLANA_WS_URL") {
            self.rpc.ws_url = url;
        }
    }
}
