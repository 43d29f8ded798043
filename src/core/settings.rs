/// Validated settings actions
///
/// These are the entry points the chat surface calls with raw user text.
/// Every rejection is a `SniperError::Validation` carrying the reply text.

use super::eligibility::parse_time_of_day;
use super::error::SniperError;
use super::types::TradingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    StakeAmount,
    PriorityFee,
    SlippageBps,
    RoutingFee,
}

impl NumericField {
    pub fn label(&self) -> &'static str {
        match self {
            NumericField::StakeAmount => "Snipe Amount",
            NumericField::PriorityFee => "Priority Fee",
            NumericField::SlippageBps => "Slippage Bps",
            NumericField::RoutingFee => "Routing Fee",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Bot,
    AutoTrade,
    TimeCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEdge {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingUpdate {
    Numeric(NumericField, String),
    Time(WindowEdge, String),
    Toggle(Toggle),
}

fn parse_number(field: NumericField, text: &str) -> Result<f64, SniperError> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(SniperError::Validation(format!("{} must be number.", field.label()))),
    }
}

fn parse_whole(field: NumericField, text: &str) -> Result<u64, SniperError> {
    let value = parse_number(field, text)?;
    if value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(SniperError::Validation(format!(
            "{} must be a whole number.",
            field.label()
        )));
    }
    Ok(value as u64)
}

/// Normalizes "H:M" to zero-padded "HH:MM"
pub fn normalize_time(text: &str) -> Result<String, SniperError> {
    let minutes = parse_time_of_day(text).ok_or_else(|| {
        SniperError::Validation(
            "Invalid time format. Please enter in this format <code>00:00</code>".to_string(),
        )
    })?;
    Ok(format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

impl TradingSettings {
    pub fn apply(&mut self, update: SettingUpdate) -> Result<(), SniperError> {
        match update {
            SettingUpdate::Numeric(field, text) => match field {
                NumericField::StakeAmount => self.stake_sol = parse_number(field, &text)?,
                NumericField::PriorityFee => {
                    self.priority_fee_micro_lamports = parse_whole(field, &text)?
                }
                NumericField::RoutingFee => {
                    self.routing_fee_lamports = parse_whole(field, &text)?
                }
                NumericField::SlippageBps => {
                    let bps = parse_whole(field, &text)?;
                    if bps > 10_000 {
                        return Err(SniperError::Validation(
                            "Slippage Bps must be at most 10000.".to_string(),
                        ));
                    }
                    self.slippage_bps = bps as u16;
                }
            },
            SettingUpdate::Time(edge, text) => {
                let time = normalize_time(&text)?;
                let minutes = parse_time_of_day(&time).unwrap_or_default();
                match edge {
                    WindowEdge::Start => {
                        if parse_time_of_day(&self.stop_at).is_some_and(|stop| minutes >= stop) {
                            return Err(SniperError::Validation(
                                "Invalid time! start time must be less than stop time".to_string(),
                            ));
                        }
                        self.start_at = time;
                    }
                    WindowEdge::Stop => {
                        if parse_time_of_day(&self.start_at).is_some_and(|start| minutes <= start) {
                            return Err(SniperError::Validation(
                                "Invalid time! stop time must be greater than start time"
                                    .to_string(),
                            ));
                        }
                        self.stop_at = time;
                    }
                }
            }
            SettingUpdate::Toggle(toggle) => match toggle {
                Toggle::Bot => self.bot_enabled = !self.bot_enabled,
                Toggle::AutoTrade => self.auto_trade_enabled = !self.auto_trade_enabled,
                Toggle::TimeCheck => self.time_check_enabled = !self.time_check_enabled,
            },
        }
        Ok(())
    }
}
