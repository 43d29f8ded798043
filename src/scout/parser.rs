/// Resolves a pool-initialization signature into a screened listing

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::metadata::MetadataSource;
use crate::core::{
    classify_risk, MigrationEvent, TokenInfo, COIN_MINT_SLOT, PC_MINT_SLOT, POOL_ACCOUNT_SLOT,
    RISK_HIGH, SOL_MINT,
};
use crate::trading::{ChainRpc, Finality, ParsedTransaction};
use crate::util::PriceSource;

/// Why a signature produced no migration event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseRejection {
    #[error("transaction has no pool initialization instruction")]
    NoPoolInstruction,

    #[error("pool instruction is missing a mint account")]
    MissingMint,

    #[error("pool is not paired with SOL")]
    NotNativePair,

    #[error("High risk: {} is a freezeable token", .0.address)]
    HighRisk(TokenInfo),

    #[error("service error: {0}")]
    Service(String),
}

/// Pool accounts read from the `initialize2` instruction
#[derive(Debug, Clone, PartialEq)]
pub struct PoolAccounts {
    pub pool: String,
    pub token_mint: String,
}

pub struct MigrationParser {
    rpc: Arc<dyn ChainRpc>,
    metadata: Arc<dyn MetadataSource>,
    prices: Arc<dyn PriceSource>,
    program_id: String,
}

/// Reads the fixed account slots of the target program's instruction
pub fn pool_accounts(
    transaction: &ParsedTransaction,
    program_id: &str,
) -> Result<PoolAccounts, ParseRejection> {
    let instruction = transaction
        .instructions
        .iter()
        .find(|ix| ix.program_id == program_id)
        .ok_or(ParseRejection::NoPoolInstruction)?;

    let coin = instruction.accounts.get(COIN_MINT_SLOT);
    let pc = instruction.accounts.get(PC_MINT_SLOT);
    let (coin, pc) = match (coin, pc) {
        (Some(coin), Some(pc)) => (coin, pc),
        _ => return Err(ParseRejection::MissingMint),
    };
    let pool = instruction
        .accounts
        .get(POOL_ACCOUNT_SLOT)
        .ok_or(ParseRejection::MissingMint)?;

    let token_mint = match (coin == SOL_MINT, pc == SOL_MINT) {
        (true, false) => pc,
        (false, true) => coin,
        _ => return Err(ParseRejection::NotNativePair),
    };

    Ok(PoolAccounts {
        pool: pool.clone(),
        token_mint: token_mint.clone(),
    })
}

impl MigrationParser {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        metadata: Arc<dyn MetadataSource>,
        prices: Arc<dyn PriceSource>,
        program_id: &str,
    ) -> Self {
        Self {
            rpc,
            metadata,
            prices,
            program_id: program_id.to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn parse(&self, signature: &str) -> Result<MigrationEvent, ParseRejection> {
        let transaction = self
            .rpc
            .get_transaction(signature, Finality::Finalized)
            .await
            .map_err(|e| ParseRejection::Service(format!("{:#}", e)))?
            .ok_or_else(|| ParseRejection::Service(format!("transaction {} not found", signature)))?;

        let accounts = pool_accounts(&transaction, &self.program_id)?;
        debug!(pool = %accounts.pool, mint = %accounts.token_mint, "Pool accounts resolved");

        let metadata = self
            .metadata
            .metadata(&accounts.token_mint)
            .await
            .map_err(|e| ParseRejection::Service(format!("{:#}", e)))?;

        let token = TokenInfo {
            address: accounts.token_mint.clone(),
            symbol: metadata.symbol,
            name: metadata.name,
            decimals: metadata.decimals,
            risk: classify_risk(metadata.freeze_authority, metadata.mint_authority),
        };
        if token.risk >= RISK_HIGH {
            info!(mint = %token.address, "🚫 High risk token rejected");
            return Err(ParseRejection::HighRisk(token));
        }

        let price = match self.prices.price(&token.address).await {
            Ok(price) => price,
            Err(e) => {
                warn!(mint = %token.address, error = %e, "Price unavailable for new listing");
                None
            }
        };

        info!(mint = %token.address, symbol = %token.symbol, risk = token.risk, "🆕 New LP found");
        Ok(MigrationEvent {
            signature: signature.to_string(),
            token,
            pool_address: accounts.pool,
            price,
        })
    }
}
