/// Balance deltas of a confirmed swap, read from the runtime's pre/post ledger
///
/// Entries belonging to the routing service's fee account are never counted
/// toward the trader, even when the fee account shares the trader's owner.

use super::rpc::{LedgerSnapshot, TokenBalanceEntry};

fn owned_total(
    entries: &[TokenBalanceEntry],
    mint: &str,
    owner: &str,
    fee_account: Option<&str>,
) -> Option<u128> {
    let mut matched = false;
    let mut total = 0u128;
    for entry in entries {
        if entry.mint != mint || entry.owner.as_deref() != Some(owner) {
            continue;
        }
        if fee_account.is_some_and(|fee| fee == entry.account) {
            continue;
        }
        matched = true;
        total += entry.amount as u128;
    }
    matched.then_some(total)
}

/// Change of `owner`'s `mint` holdings; `None` when the ledger has no entry for them at all
pub fn token_change(
    snapshot: &LedgerSnapshot,
    mint: &str,
    owner: &str,
    fee_account: Option<&str>,
) -> Option<i128> {
    let pre = owned_total(&snapshot.pre_token_balances, mint, owner, fee_account);
    let post = owned_total(&snapshot.post_token_balances, mint, owner, fee_account);
    if pre.is_none() && post.is_none() {
        return None;
    }
    Some(post.unwrap_or(0) as i128 - pre.unwrap_or(0) as i128)
}

/// Lamport change of `address`, fees included
pub fn native_change(snapshot: &LedgerSnapshot, address: &str) -> Option<i128> {
    let index = snapshot.account_keys.iter().position(|key| key == address)?;
    let pre = *snapshot.pre_balances.get(index)?;
    let post = *snapshot.post_balances.get(index)?;
    Some(post as i128 - pre as i128)
}

/// Native proceeds of `payer`: lamports plus any wrapped SOL left in its token accounts
pub fn native_proceeds(
    snapshot: &LedgerSnapshot,
    payer: &str,
    wrapped_mint: &str,
    fee_account: Option<&str>,
) -> Option<i128> {
    let lamports = native_change(snapshot, payer)?;
    let wrapped = token_change(snapshot, wrapped_mint, payer, fee_account).unwrap_or(0);
    Some(lamports + wrapped)
}
