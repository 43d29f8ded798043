// Configuration and shared domain types
pub mod config;
pub mod core;

// Persistence
pub mod database;

// Log stream ingestion
pub mod ingest;

// Listing discovery, buys, sells
pub mod execution;
pub mod scout;
pub mod strike;
pub mod trading;

// Notifications and price data
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::core::*;
pub use ingest::{ChainEventListener, SolanaWebSocketClient};
