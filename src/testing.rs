//! In-memory collaborators for unit tests

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::BorshSerialize;
use chrono::Utc;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::VersionedTransaction;
use spl_token::solana_program::program_option::COption;
use spl_token::state::Mint;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Config, ConfigManager, UnresolvedBalancePolicy};
use crate::core::{
    Account, AccountId, MigrationEvent, Position, PositionStatus, TokenInfo, WalletCredentials,
    MAX_SUBMIT_ATTEMPTS,
};
use crate::database::JsonAccountStore;
use crate::execution::PositionMonitor;
use crate::scout::{MetadataSource, TokenMetadata};
use crate::strike::BuyDispatcher;
use crate::trading::{
    ChainRpc, Finality, LedgerSnapshot, ParsedInstruction, ParsedTransaction, PipelineOptions,
    QuoteResponse, SignatureState, SwapFees, SwapPipeline, SwapRouter,
};
use crate::trading::jupiter_client::SwapResponse;
use crate::trading::rpc::TokenBalanceEntry;
use crate::transport::Notifier;
use crate::util::PriceSource;

const STARTING_LAMPORTS: u64 = 10_000_000_000;

pub fn wallet() -> WalletCredentials {
    let secret = bs58::encode(Keypair::new().to_bytes()).into_string();
    WalletCredentials::import(&secret).unwrap()
}

/// Bot and auto-trade on, no time window, 0.1 SOL stake
pub fn account(id: AccountId) -> Account {
    let mut account = Account::new(id, Some(format!("user{}", id)), wallet());
    account.settings.bot_enabled = true;
    account.settings.auto_trade_enabled = true;
    account.settings.time_check_enabled = false;
    account.settings.stake_sol = 0.1;
    account
}

pub fn token(mint: &str) -> TokenInfo {
    TokenInfo {
        address: mint.to_string(),
        symbol: "TKA".to_string(),
        name: "Token A".to_string(),
        decimals: 6,
        risk: 0,
    }
}

/// Bought position paid with 0.1 SOL
pub fn position(mint: &str, entry_price: f64, amount: u64) -> Position {
    Position {
        token: token(mint),
        pool_address: format!("Pool-{}", mint),
        entry_price,
        peak_price: None,
        amount,
        sol_spent_lamports: 100_000_000,
        status: PositionStatus::Bought,
        buy_signature: format!("buy-{}", mint),
        bought_at: Utc::now(),
        sell_signature: None,
        proceeds_lamports: None,
        sold_at: None,
    }
}

pub fn migration_event(mint: &str, price: Option<f64>) -> MigrationEvent {
    MigrationEvent {
        signature: format!("sig-{}", mint),
        token: token(mint),
        pool_address: format!("Pool-{}", mint),
        price,
    }
}

/// Transaction whose only instruction is a pool initialization of `program`
pub fn pool_transaction(
    signature: &str,
    program: &str,
    coin_mint: &str,
    pc_mint: &str,
    pool: &str,
) -> ParsedTransaction {
    let mut accounts: Vec<String> = (0..21).map(|i| format!("account-{}", i)).collect();
    accounts[4] = pool.to_string();
    accounts[8] = coin_mint.to_string();
    accounts[9] = pc_mint.to_string();
    ParsedTransaction {
        signature: signature.to_string(),
        instructions: vec![ParsedInstruction {
            program_id: program.to_string(),
            accounts,
        }],
        ledger: None,
        failed: false,
    }
}

pub fn mint_account(decimals: u8, mint_authority: bool, freeze_authority: bool) -> Vec<u8> {
    let authority = |present: bool| {
        if present {
            COption::Some(Pubkey::new_unique())
        } else {
            COption::None
        }
    };
    let mint = Mint {
        mint_authority: authority(mint_authority),
        supply: 1_000_000_000,
        decimals,
        is_initialized: true,
        freeze_authority: authority(freeze_authority),
    };
    let mut data = vec![0u8; Mint::LEN];
    Mint::pack(mint, &mut data).unwrap();
    data
}

/// Metaplex metadata account with NUL padded name and symbol
pub fn metadata_account(mint: &Pubkey, name: &str, symbol: &str) -> Vec<u8> {
    let padded = |text: &str, width: usize| {
        let mut padded = text.to_string();
        padded.extend(std::iter::repeat('\0').take(width.saturating_sub(text.len())));
        padded
    };
    let mut data = Vec::new();
    4u8.serialize(&mut data).unwrap();
    Pubkey::new_unique().to_bytes().serialize(&mut data).unwrap();
    mint.to_bytes().serialize(&mut data).unwrap();
    padded(name, 32).serialize(&mut data).unwrap();
    padded(symbol, 10).serialize(&mut data).unwrap();
    padded("", 200).serialize(&mut data).unwrap();
    data
}

/// Scripted chain: canned accounts and transactions, plus a swap ledger per payer
#[derive(Default)]
pub struct FakeRpc {
    transactions: Mutex<HashMap<String, ParsedTransaction>>,
    accounts: Mutex<HashMap<String, Vec<u8>>>,
    balances: Mutex<HashMap<String, u64>>,
    token_balances: Mutex<HashMap<(String, String), u64>>,
    swap_ledgers: Mutex<HashMap<String, LedgerSnapshot>>,
    sent: Mutex<HashMap<String, String>>,
    send_failures: AtomicU32,
    send_attempts: AtomicU32,
    sent_count: AtomicUsize,
    signature_state: Mutex<Option<SignatureState>>,
    block_height: AtomicU64,
}

impl FakeRpc {
    pub fn set_transaction(&self, transaction: ParsedTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction.signature.clone(), transaction);
    }

    pub fn set_account(&self, address: &str, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address.to_string(), data);
    }

    pub fn set_balance(&self, address: &str, lamports: u64) {
        self.balances.lock().unwrap().insert(address.to_string(), lamports);
    }

    pub fn set_token_balance(&self, owner: &str, mint: &str, amount: u64) {
        self.token_balances
            .lock()
            .unwrap()
            .insert((owner.to_string(), mint.to_string()), amount);
    }

    /// Ledger of every swap `payer` submits: `mint` and lamports move by the given deltas
    pub fn set_swap_outcome(&self, payer: &str, mint: &str, token_delta: i64, lamport_delta: i64) {
        let pre_tokens = if token_delta < 0 { token_delta.unsigned_abs() } else { 0 };
        let post_tokens = (pre_tokens as i64 + token_delta) as u64;
        let entry = |amount| TokenBalanceEntry {
            account: format!("ata-{}", payer),
            mint: mint.to_string(),
            owner: Some(payer.to_string()),
            amount,
        };

        let snapshot = LedgerSnapshot {
            account_keys: vec![payer.to_string()],
            pre_balances: vec![STARTING_LAMPORTS],
            post_balances: vec![(STARTING_LAMPORTS as i64 + lamport_delta) as u64],
            // a freshly created token account has no pre entry
            pre_token_balances: if pre_tokens > 0 { vec![entry(pre_tokens)] } else { Vec::new() },
            post_token_balances: vec![entry(post_tokens)],
        };
        self.swap_ledgers
            .lock()
            .unwrap()
            .insert(payer.to_string(), snapshot);
    }

    /// Only the fee account (owned by the payer) moves; the payer's own account does not
    pub fn set_fee_only_outcome(&self, payer: &str, mint: &str, fee_account: &str) {
        let entry = |account: &str, amount| TokenBalanceEntry {
            account: account.to_string(),
            mint: mint.to_string(),
            owner: Some(payer.to_string()),
            amount,
        };
        let own_account = format!("ata-{}", payer);

        let snapshot = LedgerSnapshot {
            account_keys: vec![payer.to_string()],
            pre_balances: vec![STARTING_LAMPORTS],
            post_balances: vec![STARTING_LAMPORTS],
            pre_token_balances: vec![entry(&own_account, 1_000), entry(fee_account, 0)],
            post_token_balances: vec![entry(&own_account, 1_000), entry(fee_account, 25)],
        };
        self.swap_ledgers
            .lock()
            .unwrap()
            .insert(payer.to_string(), snapshot);
    }

    /// The next `count` submissions are rejected
    pub fn fail_sends(&self, count: u32) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    pub fn send_attempts(&self) -> u32 {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent_count.load(Ordering::SeqCst)
    }

    pub fn set_signature_state(&self, state: SignatureState) {
        *self.signature_state.lock().unwrap() = Some(state);
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    async fn get_transaction(
        &self,
        signature: &str,
        _finality: Finality,
    ) -> Result<Option<ParsedTransaction>> {
        if let Some(transaction) = self.transactions.lock().unwrap().get(signature) {
            return Ok(Some(transaction.clone()));
        }
        let payer = match self.sent.lock().unwrap().get(signature) {
            Some(payer) => payer.clone(),
            None => return Ok(None),
        };
        let ledger = self
            .swap_ledgers
            .lock()
            .unwrap()
            .get(&payer)
            .cloned()
            .unwrap_or_default();
        Ok(Some(ParsedTransaction {
            signature: signature.to_string(),
            instructions: Vec::new(),
            ledger: Some(ledger),
            failed: false,
        }))
    }

    async fn get_balance(&self, address: &str) -> Result<u64> {
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<u64> {
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(owner.to_string(), mint.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn get_account_data(&self, address: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<String> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.send_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.send_failures.store(remaining - 1, Ordering::SeqCst);
            bail!("node is behind");
        }

        let signature = transaction
            .signatures
            .first()
            .ok_or_else(|| anyhow!("unsigned transaction"))?
            .to_string();
        let payer = transaction
            .message
            .static_account_keys()
            .first()
            .ok_or_else(|| anyhow!("transaction has no payer"))?
            .to_string();
        self.sent.lock().unwrap().insert(signature.clone(), payer);
        self.sent_count.fetch_add(1, Ordering::SeqCst);
        Ok(signature)
    }

    async fn signature_state(&self, _signature: &str) -> Result<SignatureState> {
        Ok(self
            .signature_state
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(SignatureState::Confirmed))
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }
}

/// Router that returns an empty, unsigned transaction paid by the requester
#[derive(Default)]
pub struct FakeRouter {
    pub quote_error: Option<String>,
    pub failing: Mutex<HashSet<String>>,
    pub panicking: Mutex<HashSet<String>>,
}

impl FakeRouter {
    pub const LAST_VALID_BLOCK_HEIGHT: u64 = 1_000;
    pub const FEE_ACCOUNT: &'static str = "FeeAccount1111111111111111111111111111111111";

    /// Swap builds for `payer` fail
    pub fn fail_for(&self, payer: &str) {
        self.failing.lock().unwrap().insert(payer.to_string());
    }

    /// Swap builds for `payer` panic
    pub fn panic_for(&self, payer: &str) {
        self.panicking.lock().unwrap().insert(payer.to_string());
    }
}

#[async_trait]
impl SwapRouter for FakeRouter {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse> {
        if let Some(message) = &self.quote_error {
            bail!("{}", message);
        }
        Ok(QuoteResponse {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount: amount.to_string(),
            out_amount: "0".to_string(),
            slippage_bps,
            price_impact_pct: None,
            extra: serde_json::Map::new(),
        })
    }

    async fn build_swap(
        &self,
        _quote: &QuoteResponse,
        payer: &str,
        _fees: SwapFees,
    ) -> Result<SwapResponse> {
        if self.panicking.lock().unwrap().contains(payer) {
            panic!("router exploded for {}", payer);
        }
        if self.failing.lock().unwrap().contains(payer) {
            bail!("route expired");
        }

        let payer = Pubkey::from_str(payer)?;
        let message = Message::new_with_blockhash(&[], Some(&payer), &Hash::new_unique());
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
            message: VersionedMessage::Legacy(message),
        };
        Ok(SwapResponse {
            swap_transaction: STANDARD.encode(bincode::serialize(&transaction)?),
            last_valid_block_height: Self::LAST_VALID_BLOCK_HEIGHT,
            simulation_error: None,
        })
    }

    fn fee_account(&self) -> Option<&str> {
        Some(Self::FEE_ACCOUNT)
    }
}

pub struct FakeMetadata {
    metadata: TokenMetadata,
}

impl FakeMetadata {
    pub fn new(metadata: TokenMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn metadata(&self, _mint: &str) -> Result<TokenMetadata> {
        Ok(self.metadata.clone())
    }
}

#[derive(Default)]
pub struct FakePrices {
    prices: Mutex<HashMap<String, f64>>,
    failing: AtomicBool,
}

impl FakePrices {
    pub fn with_price(mint: &str, price: f64) -> Self {
        let prices = Self::default();
        prices.set_price(mint, price);
        prices
    }

    pub fn set_price(&self, mint: &str, price: f64) {
        self.prices.lock().unwrap().insert(mint.to_string(), price);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn price(&self, mint: &str) -> Result<Option<f64>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("price service unavailable");
        }
        Ok(self.prices.lock().unwrap().get(mint).copied())
    }
}

/// Captures sent messages; sends to `failing` recipients error out
#[derive(Default)]
pub struct RecordingNotifier {
    failing: HashSet<AccountId>,
    latency: Option<Duration>,
    messages: Mutex<Vec<(AccountId, String)>>,
}

impl RecordingNotifier {
    pub fn failing_for(recipients: &[AccountId]) -> Self {
        Self {
            failing: recipients.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Every send waits `latency` before it is recorded
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn messages_for(&self, recipient: AccountId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: AccountId, text: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&recipient) {
            bail!("chat {} blocked the bot", recipient);
        }
        self.messages
            .lock()
            .unwrap()
            .push((recipient, text.to_string()));
        Ok(())
    }
}

/// Buy dispatcher and position monitor wired to shared fakes
pub struct Harness {
    pub store: Arc<JsonAccountStore>,
    pub rpc: Arc<FakeRpc>,
    pub router: Arc<FakeRouter>,
    pub prices: Arc<FakePrices>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: Arc<SwapPipeline>,
    pub dispatcher: BuyDispatcher,
    pub monitor: PositionMonitor,
}

pub fn harness() -> Harness {
    let store = Arc::new(JsonAccountStore::in_memory());
    let rpc = Arc::new(FakeRpc::default());
    let router = Arc::new(FakeRouter::default());
    let prices = Arc::new(FakePrices::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = Arc::new(ConfigManager::from_config(Config::default()));

    let pipeline = Arc::new(SwapPipeline::new(
        rpc.clone(),
        router.clone(),
        PipelineOptions {
            confirm_poll: Duration::from_millis(1),
            submit_retry_delay: Duration::from_millis(1),
            max_submit_attempts: MAX_SUBMIT_ATTEMPTS,
            unresolved_balance: UnresolvedBalancePolicy::Zero,
        },
    ));
    let dispatcher = BuyDispatcher::new(store.clone(), pipeline.clone(), rpc.clone(), notifier.clone());
    let monitor = PositionMonitor::new(
        store.clone(),
        pipeline.clone(),
        rpc.clone(),
        prices.clone(),
        notifier.clone(),
        config,
    );

    Harness {
        store,
        rpc,
        router,
        prices,
        notifier,
        pipeline,
        dispatcher,
        monitor,
    }
}
