/// Configuration management with hot-reload

pub mod manager;
pub mod strategy;

pub use manager::ConfigManager;
pub use strategy::*;
