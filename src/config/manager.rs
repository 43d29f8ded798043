/// Configuration manager with hot-reload capability

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use super::{Config, Monitor, SellPolicy};

pub struct ConfigManager {
    config_path: Option<String>,
    current_config: Arc<RwLock<Config>>,
    last_modified: Option<SystemTime>,
}

impl ConfigManager {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let config = Config::load_from_file(path)?;
        let last_modified = std::fs::metadata(path)?.modified().ok();

        Ok(Self {
            config_path: Some(path.to_string()),
            current_config: Arc::new(RwLock::new(config)),
            last_modified,
        })
    }

    /// Fixed configuration without a backing file
    pub fn from_config(config: Config) -> Self {
        Self {
            config_path: None,
            current_config: Arc::new(RwLock::new(config)),
            last_modified: None,
        }
    }

    pub fn get_config(&self) -> Config {
        self.current_config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sell_policy(&self) -> SellPolicy {
        self.current_config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sell_policy
    }

    pub fn monitor(&self) -> Monitor {
        self.current_config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .monitor
            .clone()
    }

    /// Polls the file mtime every 5 seconds and swaps in the new config when it parses
    pub fn start_hot_reload(&self) -> Option<JoinHandle<()>> {
        self.start_hot_reload_every(Duration::from_secs(5))
    }

    pub fn start_hot_reload_every(&self, period: Duration) -> Option<JoinHandle<()>> {
        let config_path = self.config_path.clone()?;
        let current_config = Arc::clone(&self.current_config);
        let mut last_modified = self.last_modified;

        Some(tokio::spawn(async move {
            let mut reload_timer = interval(period);
            loop {
                reload_timer.tick().await;

                let modified = match std::fs::metadata(&config_path).and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(_) => continue,
                };
                if last_modified.is_some_and(|last| modified <= last) {
                    continue;
                }

                match Config::load_from_file(&config_path) {
                    Ok(new_config) => {
                        *current_config
                            .write()
                            .unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
                        last_modified = Some(modified);
                        info!(path = %config_path, "🔄 Configuration reloaded");
                    }
                    Err(e) => {
                        warn!(path = %config_path, error = %e, "⚠️ Failed to reload configuration - keeping current");
                        last_modified = Some(modified);
                    }
                }
            }
        }))
    }
}
