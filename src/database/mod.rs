/// Account and position persistence

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Account, AccountId, Position, SettingUpdate, SniperError, TradingSettings, WalletCredentials};

pub mod account_store;

pub use account_store::JsonAccountStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("No position in the expected state for {0}")]
    NoSuchPosition(String),

    #[error(transparent)]
    Rejected(#[from] SniperError),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for SniperError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SniperError::NotFound(id),
            StoreError::Rejected(inner) => inner,
            other => SniperError::service(other),
        }
    }
}

/// Edit applied to one account; an `Err` leaves the stored record unchanged
pub type AccountUpdate = Box<dyn FnOnce(&mut Account) -> Result<(), SniperError> + Send>;

/// Account/position store. Every mutation is atomic per account record.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find(
        &self,
        predicate: &(dyn for<'a> Fn(&'a Account) -> bool + Send + Sync),
    ) -> Result<Vec<Account>, StoreError>;

    async fn find_one(&self, id: AccountId) -> Result<Account, StoreError>;

    async fn save(&self, account: Account) -> Result<(), StoreError>;

    async fn update(&self, id: AccountId, update: AccountUpdate) -> Result<Account, StoreError>;

    async fn append_position(&self, id: AccountId, position: Position) -> Result<(), StoreError>;

    /// Marks the position Bought → Selling; false if it is not Bought.
    /// Positions are addressed by their buy signature.
    async fn begin_sell(&self, id: AccountId, position_id: &str) -> Result<bool, StoreError>;

    /// Selling → Bought after a failed sell
    async fn abort_sell(&self, id: AccountId, position_id: &str) -> Result<(), StoreError>;

    /// Selling → Sold, recording the sale; returns the closed position
    async fn complete_sell(
        &self,
        id: AccountId,
        position_id: &str,
        signature: &str,
        proceeds_lamports: u64,
    ) -> Result<Position, StoreError>;

    /// Raises the persisted watermark of the open position if `peak` is higher
    async fn record_peak(&self, id: AccountId, position_id: &str, peak: f64)
        -> Result<(), StoreError>;
}

/// Applies one settings action to a stored account and returns the new settings
pub async fn apply_setting(
    store: &dyn AccountStore,
    id: AccountId,
    update: SettingUpdate,
) -> Result<TradingSettings, SniperError> {
    let account = store
        .update(id, Box::new(move |account: &mut Account| account.settings.apply(update)))
        .await?;
    Ok(account.settings)
}

/// Replaces the account wallet with an imported secret key; returns the public key
pub async fn import_wallet(
    store: &dyn AccountStore,
    id: AccountId,
    secret: &str,
) -> Result<String, SniperError> {
    let wallet = WalletCredentials::import(secret)?;
    let public_key = wallet.public_key.clone();
    store
        .update(
            id,
            Box::new(move |account: &mut Account| {
                account.wallet = wallet;
                Ok(())
            }),
        )
        .await?;
    Ok(public_key)
}
