/// Outbound message texts (Telegram HTML parse mode)

use crate::core::{lamports_to_sol, round_down, ProfitLoss, TokenInfo};

fn tx_link(signature: &str) -> String {
    format!("📝 <a href='https://solscan.io/tx/{}'>Transaction</a>", signature)
}

pub fn migration_text(token: &TokenInfo) -> String {
    format!(
        "🔔 New Migration ({} / {}) 🔔\n\
         💶 <code>{}</code>\n\
         📊 <a href=\"https://solscan.io/token/{addr}\">Contract</a> • \
         <a href=\"https://birdeye.so/token/{addr}?chain=solana\">Birdeye</a> • \
         <a href=\"https://dexscreener.com/solana/{addr}\">Dexscreener</a>",
        token.name,
        token.symbol,
        token.address,
        addr = token.address
    )
}

pub fn buy_success_text(
    token: &TokenInfo,
    signature: &str,
    sol_spent: f64,
    token_amount: u64,
    entry_price: f64,
) -> String {
    let whole_tokens = token_amount as f64 / 10f64.powi(token.decimals as i32);
    format!(
        "🟢 <b>Buying <b>{}</b> is success</b>.\n\
         You bought <b>{}</b> {} using <b>{}</b> SOL.\n\
         💲 Price: <b>{}</b> SOL\n{}",
        token.display_name(),
        round_down(whole_tokens, 4),
        token.display_name(),
        sol_spent,
        entry_price,
        tx_link(signature)
    )
}

/// The swap landed but the position could not be saved, so it is not auto-sold
pub fn buy_untracked_text(token: &TokenInfo, signature: &str, token_amount: u64) -> String {
    let whole_tokens = token_amount as f64 / 10f64.powi(token.decimals as i32);
    format!(
        "⚠️ Bought <b>{}</b> {} but the position could not be saved.\n\
         It will not be sold automatically, please sell it manually.\n{}",
        round_down(whole_tokens, 4),
        token.display_name(),
        tx_link(signature)
    )
}

pub fn buy_failed_text(token: &TokenInfo, reason: &str) -> String {
    format!(
        "🛍 Buying <b>{}</b> was failed!🔴\n{}",
        token.display_name(),
        reason
    )
}

pub fn insufficient_balance_text(token: &TokenInfo, balance_lamports: u64, stake_sol: f64) -> String {
    format!(
        "⚠️ Skipped buying <b>{}</b>: wallet balance <b>{}</b> SOL is below the snipe amount <b>{}</b> SOL.",
        token.display_name(),
        round_down(lamports_to_sol(balance_lamports), 4),
        stake_sol
    )
}

pub fn sell_success_text(token: &TokenInfo, proceeds_lamports: u64, pnl: ProfitLoss, signature: &str) -> String {
    let marker = if pnl.is_profit() { "🟢" } else { "🔴" };
    format!(
        "🔴 <b>Selling {} was success! 🟢</b>\n\
         💵 You got <b>{}</b> SOL\n\
         {} {}: <b>{}</b> SOL\n{}",
        token.display_name(),
        round_down(lamports_to_sol(proceeds_lamports), 4),
        marker,
        pnl.label(),
        round_down(pnl.sol(), 4),
        tx_link(signature)
    )
}

pub fn sell_failed_text(token: &TokenInfo, reason: &str) -> String {
    format!(
        "🛍 Selling <b>{}</b> was failed!🔴\n{}",
        token.display_name(),
        reason
    )
}
