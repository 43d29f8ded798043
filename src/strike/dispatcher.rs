/// Concurrent buy fan-out for a new listing
///
/// Each eligible account gets its own task; a failing or panicking account
/// never affects its siblings.

use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::core::{
    is_eligible, lamports_to_sol, minutes_now, sol_to_lamports, Account, MigrationEvent, Position,
    PositionStatus, TokenInfo,
};
use crate::database::AccountStore;
use crate::trading::{ChainRpc, SwapFees, SwapOrder, SwapPipeline};
use crate::transport::{messages, notify, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyOutcome {
    Bought,
    /// Balance below stake; no swap attempted
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub bought: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn attempted(&self) -> usize {
        self.bought + self.skipped + self.failed
    }

    fn record(&mut self, outcome: BuyOutcome) {
        match outcome {
            BuyOutcome::Bought => self.bought += 1,
            BuyOutcome::Skipped => self.skipped += 1,
            BuyOutcome::Failed => self.failed += 1,
        }
    }
}

/// Accounts that take part in automated buys at `now` (minutes of the day)
pub fn wants_auto_buy(account: &Account, now: u32) -> bool {
    account.settings.auto_trade_enabled
        && account.settings.stake_sol > 0.0
        && account.wallet.is_configured()
        && is_eligible(account, now)
}

/// Entry price for a fill: the quoted price, else SOL paid per whole token received
pub fn entry_price(quoted: Option<f64>, spent_lamports: u64, token_amount: u64, decimals: u8) -> f64 {
    quoted.unwrap_or_else(|| {
        let whole_tokens = token_amount as f64 / 10f64.powi(decimals as i32);
        if whole_tokens > 0.0 {
            lamports_to_sol(spent_lamports) / whole_tokens
        } else {
            0.0
        }
    })
}

#[derive(Clone)]
pub struct BuyDispatcher {
    store: Arc<dyn AccountStore>,
    pipeline: Arc<SwapPipeline>,
    rpc: Arc<dyn ChainRpc>,
    notifier: Arc<dyn Notifier>,
}

impl BuyDispatcher {
    pub fn new(
        store: Arc<dyn AccountStore>,
        pipeline: Arc<SwapPipeline>,
        rpc: Arc<dyn ChainRpc>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            pipeline,
            rpc,
            notifier,
        }
    }

    /// Best-effort listing notice to every bot-enabled account
    #[instrument(skip(self, token), fields(mint = %token.address))]
    pub async fn broadcast(&self, token: &TokenInfo) {
        let recipients = match self.store.find(&|a: &Account| a.settings.bot_enabled).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to load broadcast recipients");
                return;
            }
        };

        let text = messages::migration_text(token);
        let notifier = self.notifier.as_ref();
        join_all(recipients.iter().map(|a| notify(notifier, a.id, &text))).await;
        info!(recipients = recipients.len(), "📣 Migration broadcast");
    }

    #[instrument(skip(self, event), fields(mint = %event.token.address, signature = %event.signature))]
    pub async fn dispatch(&self, event: &MigrationEvent) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let now = minutes_now();
        let accounts = match self.store.find(&|a: &Account| wants_auto_buy(a, now)).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to load buy candidates");
                return summary;
            }
        };

        let mut tasks = JoinSet::new();
        for account in accounts {
            let dispatcher = self.clone();
            let event = event.clone();
            tasks.spawn(async move { dispatcher.buy_for(account, &event).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "Buy task aborted");
                    summary.record(BuyOutcome::Failed);
                }
            }
        }

        info!(
            bought = summary.bought,
            skipped = summary.skipped,
            failed = summary.failed,
            "🎯 Buy fan-out finished"
        );
        summary
    }

    #[instrument(skip(self, account, event), fields(account = account.id))]
    async fn buy_for(&self, account: Account, event: &MigrationEvent) -> BuyOutcome {
        let settings = &account.settings;
        let token = &event.token;
        let stake_lamports = sol_to_lamports(settings.stake_sol);

        let balance = match self.rpc.get_balance(&account.wallet.public_key).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Failed to read wallet balance");
                let text = messages::buy_failed_text(token, "Could not read wallet balance.");
                notify(self.notifier.as_ref(), account.id, &text).await;
                return BuyOutcome::Failed;
            }
        };
        if balance < stake_lamports {
            info!(balance, stake_lamports, "Insufficient balance, skipping buy");
            let text = messages::insufficient_balance_text(token, balance, settings.stake_sol);
            notify(self.notifier.as_ref(), account.id, &text).await;
            return BuyOutcome::Skipped;
        }

        let order = SwapOrder::buy(
            &token.address,
            stake_lamports,
            settings.slippage_bps,
            SwapFees {
                compute_unit_price_micro_lamports: settings.priority_fee_micro_lamports,
                routing_fee_lamports: settings.routing_fee_lamports,
            },
        );
        let receipt = match self.pipeline.execute(&account.wallet, &order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Buy failed");
                let text = messages::buy_failed_text(token, &e.to_string());
                notify(self.notifier.as_ref(), account.id, &text).await;
                return BuyOutcome::Failed;
            }
        };

        if receipt.output_amount == 0 {
            warn!(signature = %receipt.signature, "Buy confirmed without a token balance change");
            let text = messages::buy_failed_text(
                token,
                &format!("No tokens were received in {}.", receipt.signature),
            );
            notify(self.notifier.as_ref(), account.id, &text).await;
            return BuyOutcome::Failed;
        }

        let entry_price = entry_price(event.price, stake_lamports, receipt.output_amount, token.decimals);
        let position = Position {
            token: token.clone(),
            pool_address: event.pool_address.clone(),
            entry_price,
            peak_price: None,
            amount: receipt.output_amount,
            sol_spent_lamports: stake_lamports,
            status: PositionStatus::Bought,
            buy_signature: receipt.signature.clone(),
            bought_at: Utc::now(),
            sell_signature: None,
            proceeds_lamports: None,
            sold_at: None,
        };
        if let Err(e) = self.store.append_position(account.id, position).await {
            error!(error = %e, signature = %receipt.signature, "Failed to record bought position");
            let text = messages::buy_untracked_text(token, &receipt.signature, receipt.output_amount);
            notify(self.notifier.as_ref(), account.id, &text).await;
            return BuyOutcome::Failed;
        }

        info!(signature = %receipt.signature, amount = receipt.output_amount, entry_price, "✅ Bought");
        let text = messages::buy_success_text(
            token,
            &receipt.signature,
            settings.stake_sol,
            receipt.output_amount,
            entry_price,
        );
        notify(self.notifier.as_ref(), account.id, &text).await;
        BuyOutcome::Bought
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AccountId;
    use crate::database::{AccountUpdate, JsonAccountStore, StoreError};
    use crate::testing::{account, harness, migration_event, Harness, RecordingNotifier};
    use async_trait::async_trait;

    /// Delegates to an in-memory store but cannot append positions
    struct FullDiskStore(JsonAccountStore);

    #[async_trait]
    impl AccountStore for FullDiskStore {
        async fn find(
            &self,
            predicate: &(dyn for<'a> Fn(&'a Account) -> bool + Send + Sync),
        ) -> Result<Vec<Account>, StoreError> {
            self.0.find(predicate).await
        }

        async fn find_one(&self, id: AccountId) -> Result<Account, StoreError> {
            self.0.find_one(id).await
        }

        async fn save(&self, account: Account) -> Result<(), StoreError> {
            self.0.save(account).await
        }

        async fn update(&self, id: AccountId, update: AccountUpdate) -> Result<Account, StoreError> {
            self.0.update(id, update).await
        }

        async fn append_position(&self, _id: AccountId, _position: Position) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        async fn begin_sell(&self, id: AccountId, position_id: &str) -> Result<bool, StoreError> {
            self.0.begin_sell(id, position_id).await
        }

        async fn abort_sell(&self, id: AccountId, position_id: &str) -> Result<(), StoreError> {
            self.0.abort_sell(id, position_id).await
        }

        async fn complete_sell(
            &self,
            id: AccountId,
            position_id: &str,
            signature: &str,
            proceeds_lamports: u64,
        ) -> Result<Position, StoreError> {
            self.0
                .complete_sell(id, position_id, signature, proceeds_lamports)
                .await
        }

        async fn record_peak(
            &self,
            id: AccountId,
            position_id: &str,
            peak: f64,
        ) -> Result<(), StoreError> {
            self.0.record_peak(id, position_id, peak).await
        }
    }

    #[test]
    fn test_effective_fill_price() {
        assert_eq!(entry_price(Some(0.5), 100, 10, 0), 0.5);
        // 0.1 SOL for 50 whole tokens
        assert!((entry_price(None, 100_000_000, 50_000_000, 6) - 0.002).abs() < 1e-12);
        assert_eq!(entry_price(None, 100, 0, 6), 0.0);
    }

    #[test]
    fn test_auto_buy_requires_stake_and_toggle() {
        let mut acct = account(1);
        assert!(wants_auto_buy(&acct, 600));
        acct.settings.stake_sol = 0.0;
        assert!(!wants_auto_buy(&acct, 600));
        acct.settings.stake_sol = 0.1;
        acct.settings.auto_trade_enabled = false;
        assert!(!wants_auto_buy(&acct, 600));

        let mut no_wallet = account(2);
        no_wallet.wallet = Default::default();
        assert!(!wants_auto_buy(&no_wallet, 600));
    }

    #[tokio::test]
    async fn test_faulty_account_does_not_block_siblings() {
        let Harness {
            store,
            rpc,
            router,
            notifier,
            dispatcher,
            ..
        } = harness();

        let ok_a = account(1);
        let faulty = account(2);
        let panicking = account(3);
        let ok_b = account(4);
        for acct in [&ok_a, &faulty, &panicking, &ok_b] {
            rpc.set_balance(&acct.wallet.public_key, 1_000_000_000);
            rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", 5_000, -100_000_000);
            store.save(acct.clone()).await.unwrap();
        }
        router.fail_for(&faulty.wallet.public_key);
        router.panic_for(&panicking.wallet.public_key);

        let summary = dispatcher.dispatch(&migration_event("MintA", Some(0.002))).await;

        assert_eq!(summary.bought, 2);
        assert_eq!(summary.failed, 2);
        for id in [1, 4] {
            let acct = store.find_one(id).await.unwrap();
            assert_eq!(acct.positions.len(), 1);
            assert_eq!(acct.positions[0].amount, 5_000);
            assert_eq!(acct.positions[0].status, PositionStatus::Bought);
            assert!(notifier.messages_for(id)[0].contains("is success"));
        }
        assert!(store.find_one(2).await.unwrap().positions.is_empty());
        assert!(notifier.messages_for(2)[0].contains("was failed"));
    }

    #[tokio::test]
    async fn test_insufficient_balance_skips_swap() {
        let Harness {
            store,
            rpc,
            notifier,
            dispatcher,
            ..
        } = harness();

        let acct = account(1);
        rpc.set_balance(&acct.wallet.public_key, 1_000);
        store.save(acct).await.unwrap();

        let summary = dispatcher.dispatch(&migration_event("MintA", None)).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(rpc.sent_count(), 0);
        assert!(notifier.messages_for(1)[0].contains("Skipped buying"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_bot_enabled_only() {
        let Harness {
            store,
            notifier,
            dispatcher,
            ..
        } = harness();

        let mut off = account(2);
        off.settings.bot_enabled = false;
        let mut watcher = account(3);
        watcher.settings.auto_trade_enabled = false;
        store.save(account(1)).await.unwrap();
        store.save(off).await.unwrap();
        store.save(watcher).await.unwrap();

        dispatcher.broadcast(&migration_event("MintA", None).token).await;
        assert_eq!(notifier.messages_for(1).len(), 1);
        assert!(notifier.messages_for(2).is_empty());
        assert_eq!(notifier.messages_for(3).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_price_uses_fill_price() {
        let Harness {
            store,
            rpc,
            dispatcher,
            ..
        } = harness();

        let acct = account(1);
        rpc.set_balance(&acct.wallet.public_key, 1_000_000_000);
        // stake 0.1 SOL for 50 whole tokens of a 6 decimal mint
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", 50_000_000, -100_000_000);
        store.save(acct).await.unwrap();

        dispatcher.dispatch(&migration_event("MintA", None)).await;
        let position = &store.find_one(1).await.unwrap().positions[0];
        assert!((position.entry_price - 0.002).abs() < 1e-12);
        assert_eq!(position.sol_spent_lamports, 100_000_000);
    }

    #[tokio::test]
    async fn test_unsaved_position_is_reported_as_untracked() {
        let Harness { rpc, pipeline, .. } = harness();
        let store = Arc::new(FullDiskStore(JsonAccountStore::in_memory()));
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = BuyDispatcher::new(store.clone(), pipeline, rpc.clone(), notifier.clone());

        let acct = account(1);
        rpc.set_balance(&acct.wallet.public_key, 1_000_000_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", 5_000_000, -100_000_000);
        store.save(acct).await.unwrap();

        let summary = dispatcher.dispatch(&migration_event("MintA", Some(0.02))).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bought, 0);
        assert_eq!(rpc.sent_count(), 1);

        let messages = notifier.messages_for(1);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("could not be saved"));
        assert!(!messages[0].contains("is success"));
    }

    #[tokio::test]
    async fn test_success_notice_carries_entry_price() {
        let Harness {
            store,
            rpc,
            notifier,
            dispatcher,
            ..
        } = harness();

        let acct = account(1);
        rpc.set_balance(&acct.wallet.public_key, 1_000_000_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", 50_000_000, -100_000_000);
        store.save(acct).await.unwrap();

        dispatcher.dispatch(&migration_event("MintA", Some(0.0025))).await;
        assert!(notifier.messages_for(1)[0].contains("Price: <b>0.0025</b> SOL"));
    }
}
