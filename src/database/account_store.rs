use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AccountStore, AccountUpdate, StoreError};
use crate::core::{Account, AccountId, Position, PositionStatus};

/// Accounts held in memory and written through to a JSON file on every mutation
pub struct JsonAccountStore {
    accounts: DashMap<AccountId, Account>,
    file_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl JsonAccountStore {
    /// Loads `path` if it exists; stale `Selling` positions go back to `Bought`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            accounts: DashMap::new(),
            file_path: Some(path.clone()),
            write_lock: Mutex::new(()),
        };

        if !path.exists() {
            info!(path = %path.display(), "📁 No account file yet, starting empty");
            return Ok(store);
        }

        let json_data = fs::read_to_string(&path)?;
        let loaded: Vec<Account> = serde_json::from_str(&json_data)?;
        let mut restored = 0;
        for mut account in loaded {
            for position in account.positions.iter_mut() {
                if position.status == PositionStatus::Selling {
                    position.status = PositionStatus::Bought;
                    restored += 1;
                }
            }
            store.accounts.insert(account.id, account);
        }
        if restored > 0 {
            warn!(restored, "Restored interrupted sells to Bought");
            store.persist()?;
        }

        info!(accounts = store.accounts.len(), path = %path.display(), "📂 Loaded accounts");
        Ok(store)
    }

    /// Store without a backing file
    pub fn in_memory() -> Self {
        Self {
            accounts: DashMap::new(),
            file_path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Writes a full snapshot to a temp file, then renames it over the store file
    fn persist(&self) -> Result<(), StoreError> {
        let path = match &self.file_path {
            Some(path) => path,
            None => return Ok(()),
        };
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut snapshot: Vec<Account> = self.accounts.iter().map(|a| a.value().clone()).collect();
        snapshot.sort_by_key(|a| a.id);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json_data = serde_json::to_string_pretty(&snapshot)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json_data)?;
        fs::rename(&temp_path, path)?;

        debug!(accounts = snapshot.len(), "💾 Accounts saved");
        Ok(())
    }

    /// Applies `f` under the record's lock, then persists
    fn mutate<T>(
        &self,
        id: AccountId,
        f: impl FnOnce(&mut Account) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = {
            let mut account = self.accounts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            f(account.value_mut())?
        };
        self.persist()?;
        Ok(result)
    }
}

fn position_in<'a>(
    account: &'a mut Account,
    position_id: &str,
    status: PositionStatus,
) -> Option<&'a mut Position> {
    account
        .positions
        .iter_mut()
        .find(|p| p.buy_signature == position_id && p.status == status)
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn find(
        &self,
        predicate: &(dyn for<'a> Fn(&'a Account) -> bool + Send + Sync),
    ) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn find_one(&self, id: AccountId) -> Result<Account, StoreError> {
        self.accounts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, account: Account) -> Result<(), StoreError> {
        self.accounts.insert(account.id, account);
        self.persist()
    }

    async fn update(&self, id: AccountId, update: AccountUpdate) -> Result<Account, StoreError> {
        self.mutate(id, |account| {
            let mut draft = account.clone();
            update(&mut draft)?;
            *account = draft.clone();
            Ok(draft)
        })
    }

    async fn append_position(&self, id: AccountId, position: Position) -> Result<(), StoreError> {
        self.mutate(id, |account| {
            account.positions.push(position);
            Ok(())
        })
    }

    async fn begin_sell(&self, id: AccountId, position_id: &str) -> Result<bool, StoreError> {
        let acquired = {
            let mut account = self.accounts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            match position_in(account.value_mut(), position_id, PositionStatus::Bought) {
                Some(position) => {
                    position.status = PositionStatus::Selling;
                    true
                }
                None => false,
            }
        };
        if acquired {
            self.persist()?;
        }
        Ok(acquired)
    }

    async fn abort_sell(&self, id: AccountId, position_id: &str) -> Result<(), StoreError> {
        self.mutate(id, |account| {
            let position = position_in(account, position_id, PositionStatus::Selling)
                .ok_or_else(|| StoreError::NoSuchPosition(position_id.to_string()))?;
            position.status = PositionStatus::Bought;
            Ok(())
        })
    }

    async fn complete_sell(
        &self,
        id: AccountId,
        position_id: &str,
        signature: &str,
        proceeds_lamports: u64,
    ) -> Result<Position, StoreError> {
        self.mutate(id, |account| {
            let position = position_in(account, position_id, PositionStatus::Selling)
                .ok_or_else(|| StoreError::NoSuchPosition(position_id.to_string()))?;
            position.status = PositionStatus::Sold;
            position.sell_signature = Some(signature.to_string());
            position.proceeds_lamports = Some(proceeds_lamports);
            position.sold_at = Some(Utc::now());
            Ok(position.clone())
        })
    }

    async fn record_peak(
        &self,
        id: AccountId,
        position_id: &str,
        peak: f64,
    ) -> Result<(), StoreError> {
        let changed = {
            let mut account = self.accounts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            match position_in(account.value_mut(), position_id, PositionStatus::Bought) {
                Some(position) if position.peak_price.map_or(true, |p| peak > p) => {
                    position.peak_price = Some(peak);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.persist()?;
        }
        Ok(())
    }
}
