pub mod history;
pub mod listener;
pub mod websocket;

pub use history::SignatureHistory;
pub use listener::{ChainEventListener, SignatureHandler};
pub use websocket::{LogsNotification, SolanaWebSocketClient, WebSocketConfig, WebSocketEvent};
