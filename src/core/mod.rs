pub mod constants;
pub mod eligibility;
pub mod error;
pub mod settings;
pub mod types;
pub mod wallet;

pub use constants::*;
pub use eligibility::{is_eligible, minutes_now, parse_time_of_day};
pub use error::SniperError;
pub use settings::{NumericField, SettingUpdate, Toggle, WindowEdge};
pub use types::*;
pub use wallet::WalletCredentials;
