/// Swap execution pipeline shared by buys and sells
///
/// quote → build → decode → sign → submit → confirm → verify. Every step maps
/// its failure onto one `SwapError` variant; the pipeline holds no state, so
/// one instance serves every account concurrently.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::jupiter_client::{SwapFees, SwapRouter};
use super::ledger;
use super::rpc::{ChainRpc, Finality, LedgerSnapshot, SignatureState};
use crate::config::{Config, UnresolvedBalancePolicy};
use crate::core::{WalletCredentials, MAX_SUBMIT_ATTEMPTS, SOL_MINT};

/// Polls allowed for a confirmed transaction to become fetchable
const LEDGER_FETCH_ATTEMPTS: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwapError {
    /// The router refused to quote; the message is its own
    #[error("{0}")]
    QuoteRejected(String),

    #[error("Failed to build swap transaction: {0}")]
    Build(String),

    #[error("Failed to decode swap transaction: {0}")]
    Decode(String),

    #[error("Failed to sign swap transaction: {0}")]
    Signing(String),

    #[error("Failed to submit swap transaction: {0}")]
    Submission(String),

    #[error("Transaction {0} was not confirmed before its blockhash expired")]
    ConfirmationTimeout(String),

    #[error("Could not resolve balance change of transaction {0}")]
    UnresolvedBalance(String),
}

/// What to swap, in base units of the input mint
#[derive(Debug, Clone, PartialEq)]
pub struct SwapOrder {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
    pub fees: SwapFees,
}

impl SwapOrder {
    pub fn buy(mint: &str, lamports: u64, slippage_bps: u16, fees: SwapFees) -> Self {
        Self {
            input_mint: SOL_MINT.to_string(),
            output_mint: mint.to_string(),
            amount: lamports,
            slippage_bps,
            fees,
        }
    }

    pub fn sell(mint: &str, amount: u64, slippage_bps: u16, fees: SwapFees) -> Self {
        Self {
            input_mint: mint.to_string(),
            output_mint: SOL_MINT.to_string(),
            amount,
            slippage_bps,
            fees,
        }
    }
}

/// Confirmed swap with the amounts actually moved
#[derive(Debug, Clone, PartialEq)]
pub struct SwapReceipt {
    pub signature: String,
    pub input_amount: u64,
    /// Output received by the trader, in base units of the output mint
    pub output_amount: u64,
    /// Signed change of the trader's SOL (native plus wrapped), in lamports
    pub sol_delta: i64,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub confirm_poll: Duration,
    pub submit_retry_delay: Duration,
    pub max_submit_attempts: u32,
    pub unresolved_balance: UnresolvedBalancePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confirm_poll: Duration::from_millis(1_000),
            submit_retry_delay: Duration::from_millis(500),
            max_submit_attempts: MAX_SUBMIT_ATTEMPTS,
            unresolved_balance: UnresolvedBalancePolicy::Zero,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            confirm_poll: Duration::from_millis(config.rpc.confirm_poll_ms),
            submit_retry_delay: Duration::from_millis(config.rpc.submit_retry_delay_ms),
            max_submit_attempts: MAX_SUBMIT_ATTEMPTS,
            unresolved_balance: config.policy.unresolved_balance,
        }
    }
}

pub struct SwapPipeline {
    rpc: Arc<dyn ChainRpc>,
    router: Arc<dyn SwapRouter>,
    options: PipelineOptions,
}

impl SwapPipeline {
    pub fn new(rpc: Arc<dyn ChainRpc>, router: Arc<dyn SwapRouter>, options: PipelineOptions) -> Self {
        Self {
            rpc,
            router,
            options,
        }
    }

    #[instrument(skip(self, wallet, order), fields(payer = %wallet.public_key, input = %order.input_mint, output = %order.output_mint, amount = order.amount))]
    pub async fn execute(
        &self,
        wallet: &WalletCredentials,
        order: &SwapOrder,
    ) -> Result<SwapReceipt, SwapError> {
        let quote = self
            .router
            .quote(&order.input_mint, &order.output_mint, order.amount, order.slippage_bps)
            .await
            .map_err(|e| SwapError::QuoteRejected(e.to_string()))?;

        let built = self
            .router
            .build_swap(&quote, &wallet.public_key, order.fees)
            .await
            .map_err(|e| SwapError::Build(format!("{:#}", e)))?;

        let transaction = decode_transaction(&built.swap_transaction)?;
        let signed = sign_transaction(transaction, wallet)?;
        let signature = self.submit(&signed).await?;
        info!(signature = %signature, "📨 Swap submitted");

        self.confirm(&signature, built.last_valid_block_height).await?;
        info!(signature = %signature, "✅ Swap confirmed");

        let snapshot = self.fetch_ledger(&signature).await;
        let (output_amount, sol_delta) = self.resolve_amounts(
            snapshot.as_ref(),
            &wallet.public_key,
            &order.output_mint,
            &signature,
        )?;

        Ok(SwapReceipt {
            signature,
            input_amount: quote.in_amount.parse().unwrap_or(order.amount),
            output_amount,
            sol_delta,
        })
    }

    async fn submit(&self, transaction: &VersionedTransaction) -> Result<String, SwapError> {
        let mut last_error = String::new();
        for attempt in 1..=self.options.max_submit_attempts {
            match self.rpc.send_transaction(transaction).await {
                Ok(signature) => return Ok(signature),
                Err(e) => {
                    warn!(attempt, error = %e, "Submission attempt failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.options.max_submit_attempts {
                sleep(self.options.submit_retry_delay).await;
            }
        }
        Err(SwapError::Submission(last_error))
    }

    /// Waits until the signature confirms or the chain passes `last_valid_block_height`
    async fn confirm(&self, signature: &str, last_valid_block_height: u64) -> Result<(), SwapError> {
        let mut consecutive_errors = 0;
        loop {
            match self.rpc.signature_state(signature).await {
                Ok(SignatureState::Confirmed) => return Ok(()),
                Ok(SignatureState::Failed(reason)) => {
                    return Err(SwapError::Submission(format!(
                        "transaction {} failed: {}",
                        signature, reason
                    )))
                }
                Ok(SignatureState::Pending) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(signature = %signature, error = %e, "Signature status check failed");
                }
            }

            match self.rpc.block_height().await {
                Ok(height) if height > last_valid_block_height => {
                    return Err(SwapError::ConfirmationTimeout(signature.to_string()))
                }
                Ok(_) => {}
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(error = %e, "Block height check failed");
                }
            }

            if consecutive_errors >= self.options.max_submit_attempts {
                return Err(SwapError::ConfirmationTimeout(signature.to_string()));
            }
            sleep(self.options.confirm_poll).await;
        }
    }

    async fn fetch_ledger(&self, signature: &str) -> Option<LedgerSnapshot> {
        for attempt in 1..=LEDGER_FETCH_ATTEMPTS {
            match self.rpc.get_transaction(signature, Finality::Confirmed).await {
                Ok(Some(transaction)) => return transaction.ledger,
                Ok(None) => debug!(signature = %signature, attempt, "Transaction not yet available"),
                Err(e) => warn!(signature = %signature, attempt, error = %e, "Failed to fetch swap transaction"),
            }
            if attempt < LEDGER_FETCH_ATTEMPTS {
                sleep(self.options.confirm_poll).await;
            }
        }
        None
    }

    fn resolve_amounts(
        &self,
        snapshot: Option<&LedgerSnapshot>,
        payer: &str,
        output_mint: &str,
        signature: &str,
    ) -> Result<(u64, i64), SwapError> {
        let fee_account = self.router.fee_account();
        let sol_delta = snapshot
            .and_then(|s| ledger::native_proceeds(s, payer, SOL_MINT, fee_account))
            .unwrap_or(0);
        let output = snapshot.and_then(|s| {
            if output_mint == SOL_MINT {
                ledger::native_proceeds(s, payer, SOL_MINT, fee_account)
            } else {
                ledger::token_change(s, output_mint, payer, fee_account)
            }
        });

        let output = match (output, self.options.unresolved_balance) {
            (Some(change), _) => change,
            (None, UnresolvedBalancePolicy::Zero) => {
                warn!(signature = %signature, "⚠️ Balance change unresolved, reporting zero output");
                0
            }
            (None, UnresolvedBalancePolicy::Fail) => {
                return Err(SwapError::UnresolvedBalance(signature.to_string()))
            }
        };

        Ok((clamp_u64(output), sol_delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64))
    }
}

fn clamp_u64(value: i128) -> u64 {
    value.clamp(0, u64::MAX as i128) as u64
}

fn decode_transaction(payload: &str) -> Result<VersionedTransaction, SwapError> {
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| SwapError::Decode(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| SwapError::Decode(e.to_string()))
}

fn sign_transaction(
    transaction: VersionedTransaction,
    wallet: &WalletCredentials,
) -> Result<VersionedTransaction, SwapError> {
    let keypair = wallet
        .keypair()
        .map_err(|e| SwapError::Signing(format!("{:#}", e)))?;
    VersionedTransaction::try_new(transaction.message, &[&keypair])
        .map_err(|e| SwapError::Signing(e.to_string()))
}
