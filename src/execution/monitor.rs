/// Background position monitoring for stop losses and profit taking
///
/// Every cycle re-reads the eligible accounts, evaluates each open position on
/// its own task and sells the ones that hit a trigger. Cycles are paced by a
/// minimum interval that backs off exponentially while upstream calls fail.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::policy::{evaluate, SellTrigger};
use crate::config::{ConfigManager, SellPolicy};
use crate::core::{is_eligible, minutes_now, Account, Position, ProfitLoss};
use crate::database::AccountStore;
use crate::trading::{ChainRpc, SwapFees, SwapOrder, SwapPipeline};
use crate::transport::{messages, notify, Notifier};
use crate::util::PriceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    Held,
    Sold,
    SellFailed,
    /// Another sell owns the position, or there is nothing on chain to sell
    Skipped,
    /// Price or store lookup failed
    Errored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub sold: usize,
    pub failed: usize,
    pub upstream_errors: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: PositionOutcome) {
        self.evaluated += 1;
        match outcome {
            PositionOutcome::Sold => self.sold += 1,
            PositionOutcome::SellFailed => {
                self.failed += 1;
                self.upstream_errors += 1;
            }
            PositionOutcome::Errored => self.upstream_errors += 1,
            PositionOutcome::Held | PositionOutcome::Skipped => {}
        }
    }
}

/// Accounts whose positions the monitor manages at `now`
pub fn is_monitored(account: &Account, now: u32) -> bool {
    account.settings.auto_trade_enabled && is_eligible(account, now)
}

/// Minimum interval doubled per consecutive failing cycle, capped at `max`
pub fn backoff_delay(min: Duration, max: Duration, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return min;
    }
    let factor = 1u32 << consecutive_failures.min(16);
    min.saturating_mul(factor).min(max)
}

fn with_jitter(delay: Duration, max: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=spread);
    (delay + Duration::from_millis(jitter)).min(max.max(delay))
}

#[derive(Clone)]
pub struct PositionMonitor {
    store: Arc<dyn AccountStore>,
    pipeline: Arc<SwapPipeline>,
    rpc: Arc<dyn ChainRpc>,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
    config: Arc<ConfigManager>,
}

impl PositionMonitor {
    pub fn new(
        store: Arc<dyn AccountStore>,
        pipeline: Arc<SwapPipeline>,
        rpc: Arc<dyn ChainRpc>,
        prices: Arc<dyn PriceSource>,
        notifier: Arc<dyn Notifier>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            store,
            pipeline,
            rpc,
            prices,
            notifier,
            config,
        }
    }

    /// Runs cycles until shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("📊 Position monitor started");
        let mut consecutive_failures = 0u32;

        loop {
            let report = self.run_cycle().await;
            consecutive_failures = if report.upstream_errors > 0 {
                consecutive_failures.saturating_add(1)
            } else {
                0
            };

            let pacing = self.config.monitor();
            let max = Duration::from_millis(pacing.max_backoff_ms);
            let delay = with_jitter(
                backoff_delay(Duration::from_millis(pacing.min_interval_ms), max, consecutive_failures),
                max,
            );
            if consecutive_failures > 0 {
                warn!(
                    consecutive_failures,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream errors, backing off"
                );
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("🛑 Position monitor shutting down");
                    return;
                }
            }
        }
    }

    /// One pass over every open position of every monitored account
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let now = minutes_now();
        let policy = self.config.sell_policy();

        let accounts = match self.store.find(&|a: &Account| is_monitored(a, now)).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to load monitored accounts");
                report.upstream_errors += 1;
                return report;
            }
        };

        let mut tasks = JoinSet::new();
        for account in accounts {
            let account = Arc::new(account);
            for position in account.open_positions().cloned() {
                let monitor = self.clone();
                let account = Arc::clone(&account);
                tasks.spawn(async move { monitor.evaluate_position(&account, position, policy).await });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "Position task aborted");
                    report.record(PositionOutcome::SellFailed);
                }
            }
        }

        if report.evaluated > 0 {
            debug!(
                evaluated = report.evaluated,
                sold = report.sold,
                failed = report.failed,
                "Monitor cycle finished"
            );
        }
        report
    }

    #[instrument(skip(self, account, position, policy), fields(account = account.id, mint = %position.token.address))]
    async fn evaluate_position(
        &self,
        account: &Account,
        position: Position,
        policy: SellPolicy,
    ) -> PositionOutcome {
        let mint = position.token.address.as_str();
        let price = match self.prices.price(mint).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                debug!("No price yet");
                return PositionOutcome::Held;
            }
            Err(e) => {
                warn!(error = %e, "Price lookup failed");
                return PositionOutcome::Errored;
            }
        };

        let watermark = position.watermark().max(price);
        if position.peak_price.map_or(true, |peak| watermark > peak) {
            if let Err(e) = self
                .store
                .record_peak(account.id, &position.buy_signature, watermark)
                .await
            {
                warn!(error = %e, "Failed to persist watermark");
            }
        }

        match evaluate(position.entry_price, watermark, price, &policy) {
            Some(trigger) => {
                info!(
                    trigger = %trigger,
                    entry = position.entry_price,
                    watermark,
                    price,
                    "🚪 Sell triggered"
                );
                self.sell(account, &position, trigger).await
            }
            None => PositionOutcome::Held,
        }
    }

    async fn sell(&self, account: &Account, position: &Position, trigger: SellTrigger) -> PositionOutcome {
        let mint = position.token.address.as_str();
        let position_id = position.buy_signature.as_str();
        match self.store.begin_sell(account.id, position_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Sell already in progress");
                return PositionOutcome::Skipped;
            }
            Err(e) => {
                error!(error = %e, "Failed to lock position for sell");
                return PositionOutcome::Errored;
            }
        }

        let balance = match self.rpc.get_token_balance(&account.wallet.public_key, mint).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Failed to read token balance");
                self.release(account, position_id).await;
                return PositionOutcome::Errored;
            }
        };
        if balance == 0 {
            warn!("No token balance on chain, position left open");
            self.release(account, position_id).await;
            return PositionOutcome::Skipped;
        }

        let settings = &account.settings;
        let order = SwapOrder::sell(
            mint,
            balance,
            settings.slippage_bps,
            SwapFees {
                compute_unit_price_micro_lamports: settings.priority_fee_micro_lamports,
                routing_fee_lamports: settings.routing_fee_lamports,
            },
        );

        match self.pipeline.execute(&account.wallet, &order).await {
            Ok(receipt) => {
                let proceeds = receipt.output_amount;
                if let Err(e) = self
                    .store
                    .complete_sell(account.id, position_id, &receipt.signature, proceeds)
                    .await
                {
                    error!(error = %e, signature = %receipt.signature, "Failed to record sold position");
                }

                let pnl = ProfitLoss::between(position.sol_spent_lamports, proceeds);
                info!(
                    signature = %receipt.signature,
                    trigger = %trigger,
                    proceeds,
                    pnl_lamports = pnl.lamports,
                    "✅ Sold"
                );
                let text = messages::sell_success_text(&position.token, proceeds, pnl, &receipt.signature);
                notify(self.notifier.as_ref(), account.id, &text).await;
                PositionOutcome::Sold
            }
            Err(e) => {
                warn!(error = %e, trigger = %trigger, "Sell failed");
                self.release(account, position_id).await;
                let text = messages::sell_failed_text(&position.token, &e.to_string());
                notify(self.notifier.as_ref(), account.id, &text).await;
                PositionOutcome::SellFailed
            }
        }
    }

    async fn release(&self, account: &Account, position_id: &str) {
        if let Err(e) = self.store.abort_sell(account.id, position_id).await {
            error!(account = account.id, position = %position_id, error = %e, "Failed to release sell lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{sol_to_lamports, PositionStatus};
    use crate::testing::{account, harness, position, Harness};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let min = Duration::from_millis(2_000);
        let max = Duration::from_millis(60_000);
        assert_eq!(backoff_delay(min, max, 0), min);
        assert_eq!(backoff_delay(min, max, 1), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(min, max, 3), Duration::from_millis(16_000));
        assert_eq!(backoff_delay(min, max, 10), max);
        assert_eq!(backoff_delay(min, max, u32::MAX), max);
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let max = Duration::from_millis(60_000);
        for _ in 0..100 {
            let delay = with_jitter(Duration::from_millis(2_000), max);
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay <= Duration::from_millis(2_200));
        }
        assert_eq!(with_jitter(max, max), max);
    }

    #[tokio::test]
    async fn test_take_profit_sells_full_balance() {
        let Harness {
            store,
            rpc,
            prices,
            notifier,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        acct.positions.push(position("MintA", 0.002, 5_000));
        rpc.set_token_balance(&acct.wallet.public_key, "MintA", 5_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", -5_000, 120_000_000);
        prices.set_price("MintA", 0.003);
        store.save(acct).await.unwrap();

        let report = monitor.run_cycle().await;
        assert_eq!(report.sold, 1);

        let closed = &store.find_one(1).await.unwrap().positions[0];
        assert_eq!(closed.status, PositionStatus::Sold);
        assert_eq!(closed.proceeds_lamports, Some(120_000_000));
        let messages = notifier.messages_for(1);
        assert!(messages[0].contains("Profit: <b>0.02</b> SOL"));
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_position_open() {
        let Harness {
            store,
            rpc,
            router,
            prices,
            notifier,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        acct.positions.push(position("MintA", 0.002, 5_000));
        rpc.set_token_balance(&acct.wallet.public_key, "MintA", 5_000);
        router.fail_for(&acct.wallet.public_key);
        prices.set_price("MintA", 0.001);
        store.save(acct).await.unwrap();

        let report = monitor.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.upstream_errors, 1);

        let open = &store.find_one(1).await.unwrap().positions[0];
        assert_eq!(open.status, PositionStatus::Bought);
        assert!(notifier.messages_for(1)[0].contains("Selling <b>TKA</b> was failed"));

        // the next cycle tries again
        let report = monitor.run_cycle().await;
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_watermark_persists_across_cycles() {
        let Harness {
            store,
            rpc,
            prices,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        acct.positions.push(position("MintA", 100.0, 5_000));
        rpc.set_token_balance(&acct.wallet.public_key, "MintA", 5_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", -5_000, 90_000_000);
        store.save(acct).await.unwrap();

        prices.set_price("MintA", 125.0);
        assert_eq!(monitor.run_cycle().await.sold, 0);
        assert_eq!(store.find_one(1).await.unwrap().positions[0].peak_price, Some(125.0));

        // 112 is above the entry floor but 10% under the remembered peak
        prices.set_price("MintA", 112.0);
        assert_eq!(monitor.run_cycle().await.sold, 1);
        let closed = &store.find_one(1).await.unwrap().positions[0];
        assert_eq!(closed.status, PositionStatus::Sold);
    }

    #[tokio::test]
    async fn test_sell_closes_the_triggering_position_of_a_shared_mint() {
        let Harness {
            store,
            rpc,
            prices,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        let early = position("MintA", 100.0, 5_000);
        let mut late = position("MintA", 50.0, 5_000);
        late.buy_signature = "buy-MintA-repool".to_string();
        acct.positions.push(early);
        acct.positions.push(late);
        rpc.set_token_balance(&acct.wallet.public_key, "MintA", 5_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", -5_000, 200_000_000);
        store.save(acct).await.unwrap();

        // take profit for the 50 entry only
        prices.set_price("MintA", 105.0);
        let report = monitor.run_cycle().await;
        assert_eq!(report.sold, 1);

        let positions = store.find_one(1).await.unwrap().positions;
        let early = positions.iter().find(|p| p.buy_signature == "buy-MintA").unwrap();
        let late = positions.iter().find(|p| p.buy_signature == "buy-MintA-repool").unwrap();
        assert_eq!(early.status, PositionStatus::Bought);
        assert_eq!(early.proceeds_lamports, None);
        assert_eq!(early.peak_price, Some(105.0));
        assert_eq!(late.status, PositionStatus::Sold);
        assert_eq!(late.proceeds_lamports, Some(200_000_000));
    }

    #[tokio::test]
    async fn test_loss_is_reported_with_sign() {
        let Harness {
            store,
            rpc,
            prices,
            notifier,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        let mut held = position("MintA", 0.002, 5_000);
        held.sol_spent_lamports = sol_to_lamports(1.0);
        acct.positions.push(held);
        rpc.set_token_balance(&acct.wallet.public_key, "MintA", 5_000);
        rpc.set_swap_outcome(&acct.wallet.public_key, "MintA", -5_000, sol_to_lamports(0.8) as i64);
        prices.set_price("MintA", 0.001);
        store.save(acct).await.unwrap();

        monitor.run_cycle().await;
        assert!(notifier.messages_for(1)[0].contains("Loss: <b>-0.2</b> SOL"));
    }

    #[tokio::test]
    async fn test_ineligible_and_quiet_positions_are_left_alone() {
        let Harness {
            store,
            rpc,
            prices,
            monitor,
            ..
        } = harness();

        let mut manual = account(1);
        manual.settings.auto_trade_enabled = false;
        manual.positions.push(position("MintA", 0.002, 5_000));
        let mut quiet = account(2);
        quiet.positions.push(position("MintA", 0.002, 5_000));
        store.save(manual).await.unwrap();
        store.save(quiet).await.unwrap();
        prices.set_price("MintA", 0.0021);

        let report = monitor.run_cycle().await;
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.sold, 0);
        assert_eq!(rpc.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_wallet_releases_lock_without_swap() {
        let Harness {
            store,
            rpc,
            prices,
            notifier,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        acct.positions.push(position("MintA", 0.002, 5_000));
        prices.set_price("MintA", 0.001);
        store.save(acct).await.unwrap();

        let report = monitor.run_cycle().await;
        assert_eq!(report.sold + report.failed, 0);
        assert_eq!(rpc.sent_count(), 0);
        assert!(notifier.messages_for(1).is_empty());
        assert_eq!(
            store.find_one(1).await.unwrap().positions[0].status,
            PositionStatus::Bought
        );
    }

    #[tokio::test]
    async fn test_price_outage_counts_as_upstream_error() {
        let Harness {
            store,
            prices,
            monitor,
            ..
        } = harness();

        let mut acct = account(1);
        acct.positions.push(position("MintA", 0.002, 5_000));
        store.save(acct).await.unwrap();
        prices.fail(true);

        let report = monitor.run_cycle().await;
        assert_eq!(report.upstream_errors, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let Harness { monitor, .. } = harness();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
