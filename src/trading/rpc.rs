/// Chain RPC seam
///
/// `ChainRpc` is what the parser, the swap pipeline and the monitor need from
/// a Solana node. `SolanaRpc` implements it over the nonblocking RPC client;
/// the parsed transaction shapes are flattened into plain structs so the
/// pipelines never touch the wire encoding.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, UiInstruction, UiMessage, UiParsedInstruction, UiTransactionEncoding,
    UiTransactionStatusMeta, UiTransactionTokenBalance,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Top-level instruction with its program and ordered account list
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
}

/// Token ledger entry with its account index resolved to an address
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceEntry {
    pub account: String,
    pub mint: String,
    pub owner: Option<String>,
    pub amount: u64,
}

/// Pre/post balances recorded by the runtime for one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub signature: String,
    pub instructions: Vec<ParsedInstruction>,
    /// `None` when the node returned no status meta
    pub ledger: Option<LedgerSnapshot>,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    Confirmed,
    Finalized,
}

impl Finality {
    fn commitment(self) -> CommitmentConfig {
        match self {
            Finality::Confirmed => CommitmentConfig::confirmed(),
            Finality::Finalized => CommitmentConfig::finalized(),
        }
    }
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Parsed transaction, `None` if the node does not know it (yet)
    async fn get_transaction(
        &self,
        signature: &str,
        finality: Finality,
    ) -> Result<Option<ParsedTransaction>>;

    /// Native balance in lamports
    async fn get_balance(&self, address: &str) -> Result<u64>;

    /// Balance of `owner`'s associated token account in base units, 0 if it does not exist
    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<u64>;

    async fn get_account_data(&self, address: &str) -> Result<Option<Vec<u8>>>;

    /// Submits with preflight skipped; returns the signature
    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<String>;

    async fn signature_state(&self, signature: &str) -> Result<SignatureState>;

    async fn block_height(&self) -> Result<u64>;
}

pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(rpc_url: &str, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                rpc_url.to_string(),
                timeout,
                CommitmentConfig::confirmed(),
            ),
        }
    }
}

fn pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).with_context(|| format!("Invalid address: {}", address))
}

fn signature(signature: &str) -> Result<Signature> {
    Signature::from_str(signature).with_context(|| format!("Invalid signature: {}", signature))
}

fn option<T>(value: OptionSerializer<T>) -> Option<T> {
    match value {
        OptionSerializer::Some(inner) => Some(inner),
        _ => None,
    }
}

fn base_units(amount: &UiTokenAmount) -> Result<u64> {
    amount
        .amount
        .parse()
        .with_context(|| format!("Token amount is not an integer: {}", amount.amount))
}

fn token_entries(
    balances: OptionSerializer<Vec<UiTransactionTokenBalance>>,
    account_keys: &[String],
) -> Vec<TokenBalanceEntry> {
    option(balances)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|balance| {
            let account = account_keys.get(balance.account_index as usize)?.clone();
            Some(TokenBalanceEntry {
                account,
                mint: balance.mint,
                owner: option(balance.owner),
                amount: base_units(&balance.ui_token_amount).ok()?,
            })
        })
        .collect()
}

fn ledger_snapshot(meta: UiTransactionStatusMeta, account_keys: Vec<String>) -> LedgerSnapshot {
    let pre_token_balances = token_entries(meta.pre_token_balances, &account_keys);
    let post_token_balances = token_entries(meta.post_token_balances, &account_keys);
    LedgerSnapshot {
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances,
        post_token_balances,
        account_keys,
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn get_transaction(
        &self,
        tx_signature: &str,
        finality: Finality,
    ) -> Result<Option<ParsedTransaction>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(finality.commitment()),
            max_supported_transaction_version: Some(0),
        };
        let response = match self
            .client
            .get_transaction_with_config(&signature(tx_signature)?, config)
            .await
        {
            Ok(response) => response,
            Err(e) if e.to_string().contains("invalid type: null") => return Ok(None),
            Err(e) => return Err(e).context("getTransaction failed"),
        };

        let message = match response.transaction.transaction {
            EncodedTransaction::Json(ui_transaction) => match ui_transaction.message {
                UiMessage::Parsed(message) => message,
                UiMessage::Raw(_) => anyhow::bail!("Node returned a raw message for jsonParsed"),
            },
            _ => anyhow::bail!("Node returned an undecoded transaction for jsonParsed"),
        };

        let account_keys: Vec<String> = message
            .account_keys
            .iter()
            .map(|key| key.pubkey.clone())
            .collect();
        let instructions = message
            .instructions
            .into_iter()
            .filter_map(|instruction| match instruction {
                UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(ix)) => {
                    Some(ParsedInstruction {
                        program_id: ix.program_id,
                        accounts: ix.accounts,
                    })
                }
                UiInstruction::Parsed(UiParsedInstruction::Parsed(ix)) => Some(ParsedInstruction {
                    program_id: ix.program_id,
                    accounts: Vec::new(),
                }),
                UiInstruction::Compiled(ix) => Some(ParsedInstruction {
                    program_id: account_keys.get(ix.program_id_index as usize)?.clone(),
                    accounts: ix
                        .accounts
                        .iter()
                        .filter_map(|index| account_keys.get(*index as usize).cloned())
                        .collect(),
                }),
            })
            .collect();

        let meta = response.transaction.meta;
        let failed = meta.as_ref().map_or(false, |meta| meta.err.is_some());
        let ledger = meta.map(|meta| ledger_snapshot(meta, account_keys));

        debug!(signature = %tx_signature, slot = response.slot, "Fetched parsed transaction");
        Ok(Some(ParsedTransaction {
            signature: tx_signature.to_string(),
            instructions,
            ledger,
            failed,
        }))
    }

    async fn get_balance(&self, address: &str) -> Result<u64> {
        self.client
            .get_balance(&pubkey(address)?)
            .await
            .with_context(|| format!("getBalance failed for {}", address))
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<u64> {
        let token_account = spl_associated_token_account::get_associated_token_address(
            &pubkey(owner)?,
            &pubkey(mint)?,
        );
        match self.client.get_token_account_balance(&token_account).await {
            Ok(balance) => base_units(&balance),
            Err(e) if e.to_string().contains("could not find account") => Ok(0),
            Err(e) => Err(e).context("getTokenAccountBalance failed"),
        }
    }

    async fn get_account_data(&self, address: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(&pubkey(address)?, CommitmentConfig::confirmed())
            .await
            .with_context(|| format!("getAccountInfo failed for {}", address))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<String> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .client
            .send_transaction_with_config(transaction, config)
            .await
            .context("sendTransaction failed")?;
        Ok(signature.to_string())
    }

    async fn signature_state(&self, tx_signature: &str) -> Result<SignatureState> {
        let response = self
            .client
            .get_signature_statuses(&[signature(tx_signature)?])
            .await
            .context("getSignatureStatuses failed")?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureState::Pending),
        };
        if let Some(err) = status.err {
            return Ok(SignatureState::Failed(err.to_string()));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(SignatureState::Confirmed)
        } else {
            Ok(SignatureState::Pending)
        }
    }

    async fn block_height(&self) -> Result<u64> {
        self.client
            .get_block_height()
            .await
            .context("getBlockHeight failed")
    }
}
