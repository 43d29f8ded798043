/// Eligibility gate for automated buy/sell participation

use chrono::{Local, Timelike};

use super::types::{Account, TradingSettings};

/// Parses "HH:MM" into minutes since midnight
pub fn parse_time_of_day(text: &str) -> Option<u32> {
    let (hour, minute) = text.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Current local time of day in minutes
pub fn minutes_now() -> u32 {
    let now = Local::now();
    now.hour() * 60 + now.minute()
}

/// True iff the bot is on and, when the time check is on, `now` lies in [start, stop)
pub fn is_eligible(account: &Account, now_minutes: u32) -> bool {
    settings_eligible(&account.settings, now_minutes)
}

pub fn settings_eligible(settings: &TradingSettings, now_minutes: u32) -> bool {
    if !settings.bot_enabled {
        return false;
    }
    if !settings.time_check_enabled {
        return true;
    }
    match (
        parse_time_of_day(&settings.start_at),
        parse_time_of_day(&settings.stop_at),
    ) {
        (Some(start), Some(stop)) => start <= now_minutes && now_minutes < stop,
        _ => false,
    }
}
