pub mod messages;
pub mod telegram;

pub use telegram::{build_notifier, notify, LogNotifier, Notifier, TelegramNotifier};
