/// Sell triggers for an open position

use std::fmt;

use crate::config::SellPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellTrigger {
    /// Watermark reached entry * take_profit_rate
    TakeProfit,
    /// Price fell to entry * stop_loss_rate
    StopLoss,
    /// Price fell to watermark * trailing_rate
    TrailingStop,
}

impl fmt::Display for SellTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SellTrigger::TakeProfit => "TAKE_PROFIT",
            SellTrigger::StopLoss => "STOP_LOSS",
            SellTrigger::TrailingStop => "TRAILING_STOP",
        };
        f.write_str(reason)
    }
}

/// Checks the three exit conditions against an already updated watermark
pub fn evaluate(entry: f64, watermark: f64, price: f64, policy: &SellPolicy) -> Option<SellTrigger> {
    if watermark >= entry * policy.take_profit_rate {
        return Some(SellTrigger::TakeProfit);
    }
    if price <= entry * policy.stop_loss_rate {
        return Some(SellTrigger::StopLoss);
    }
    if price <= watermark * policy.trailing_rate {
        return Some(SellTrigger::TrailingStop);
    }
    None
}

/// Folds observed prices into the watermark and stops at the first trigger
pub fn first_trigger(entry: f64, prices: &[f64], policy: &SellPolicy) -> Option<(usize, SellTrigger)> {
    let mut watermark = entry;
    for (index, &price) in prices.iter().enumerate() {
        watermark = watermark.max(price);
        if let Some(trigger) = evaluate(entry, watermark, price, policy) {
            return Some((index, trigger));
        }
    }
    None
}
