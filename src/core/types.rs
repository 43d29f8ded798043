use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::constants::{lamports_to_sol, RISK_HIGH, RISK_LOW, RISK_MEDIUM};
use super::wallet::WalletCredentials;

/// Chat recipient id that identifies an account
pub type AccountId = i64;

/// Per-account trading settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingSettings {
    /// SOL committed per buy
    pub stake_sol: f64,
    /// Compute unit price in micro-lamports per compute unit
    #[serde(alias = "priority_fee_lamports")]
    pub priority_fee_micro_lamports: u64,
    /// Slippage tolerance in basis points (1 = 0.01%)
    pub slippage_bps: u16,
    /// Routing tip in lamports, sent with the swap build request when non-zero
    pub routing_fee_lamports: u64,
    /// Window start, "HH:MM"
    pub start_at: String,
    /// Window stop (exclusive), "HH:MM"
    pub stop_at: String,
    pub bot_enabled: bool,
    pub auto_trade_enabled: bool,
    pub time_check_enabled: bool,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            stake_sol: 0.0,
            priority_fee_micro_lamports: 5_000,
            slippage_bps: 100,
            routing_fee_lamports: 0,
            start_at: "00:00".to_string(),
            stop_at: "23:59".to_string(),
            bot_enabled: false,
            auto_trade_enabled: false,
            time_check_enabled: false,
        }
    }
}

/// A subscribed account with its wallet, settings and holdings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: Option<String>,
    pub wallet: WalletCredentials,
    pub settings: TradingSettings,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Account {
    pub fn new(id: AccountId, username: Option<String>, wallet: WalletCredentials) -> Self {
        Self {
            id,
            username,
            wallet,
            settings: TradingSettings::default(),
            positions: Vec::new(),
        }
    }

    pub fn position(&self, mint: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.token.address == mint)
    }

    pub fn position_mut(&mut self, mint: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.token.address == mint)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }
}

/// Token identity and screening data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub risk: u8,
}

impl TokenInfo {
    pub fn display_name(&self) -> &str {
        if self.symbol.is_empty() {
            &self.name
        } else {
            &self.symbol
        }
    }
}

/// Risk classification from mint/freeze authority presence
pub fn classify_risk(freeze_authority: bool, mint_authority: bool) -> u8 {
    if freeze_authority {
        RISK_HIGH
    } else if mint_authority {
        RISK_MEDIUM
    } else {
        RISK_LOW
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Bought,
    /// A sell pipeline owns the position
    Selling,
    Sold,
}

/// A purchased holding, tracked from Bought to Sold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token: TokenInfo,
    pub pool_address: String,
    /// Entry price in SOL per whole token
    pub entry_price: f64,
    /// Highest price seen since entry
    #[serde(default)]
    pub peak_price: Option<f64>,
    /// Held amount in base units
    pub amount: u64,
    /// SOL routed into the buy, in lamports
    pub sol_spent_lamports: u64,
    pub status: PositionStatus,
    pub buy_signature: String,
    pub bought_at: DateTime<Utc>,
    #[serde(default)]
    pub sell_signature: Option<String>,
    #[serde(default)]
    pub proceeds_lamports: Option<u64>,
    #[serde(default)]
    pub sold_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Bought && self.amount > 0
    }

    /// Starting watermark for an evaluation cycle
    pub fn watermark(&self) -> f64 {
        self.peak_price
            .map_or(self.entry_price, |peak| peak.max(self.entry_price))
    }

    pub fn sol_spent(&self) -> f64 {
        lamports_to_sol(self.sol_spent_lamports)
    }
}

/// A new SOL-paired listing that passed the risk screen
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationEvent {
    pub signature: String,
    pub token: TokenInfo,
    pub pool_address: String,
    /// Price in SOL when available from the price service
    pub price: Option<f64>,
}

/// Realized profit or loss of a closed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitLoss {
    pub lamports: i64,
}

impl ProfitLoss {
    pub fn between(spent_lamports: u64, proceeds_lamports: u64) -> Self {
        Self {
            lamports: proceeds_lamports as i64 - spent_lamports as i64,
        }
    }

    pub fn sol(&self) -> f64 {
        self.lamports as f64 / super::constants::LAMPORTS_PER_SOL as f64
    }

    pub fn is_profit(&self) -> bool {
        self.lamports > 0
    }

    pub fn label(&self) -> &'static str {
        if self.is_profit() {
            "Profit"
        } else {
            "Loss"
        }
    }
}
