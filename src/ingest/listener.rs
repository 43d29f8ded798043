/// Chain event listener
///
/// Filters the program log stream down to new pool initializations and hands
/// each fresh signature to a handler on its own task.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::history::SignatureHistory;
use super::websocket::{LogsNotification, SolanaWebSocketClient, WebSocketConfig, WebSocketEvent};

#[async_trait]
pub trait SignatureHandler: Send + Sync {
    async fn handle(&self, signature: String);
}

pub struct ChainEventListener {
    history: SignatureHistory,
    marker: String,
    handler: Arc<dyn SignatureHandler>,
}

impl ChainEventListener {
    pub fn new(marker: &str, history: SignatureHistory, handler: Arc<dyn SignatureHandler>) -> Self {
        Self {
            history,
            marker: marker.to_string(),
            handler,
        }
    }

    /// Successful, carries the marker, and not seen within the history window
    pub fn accept(&self, logs: &LogsNotification) -> bool {
        if !logs.succeeded() || !logs.mentions(&self.marker) {
            return false;
        }
        if !self.history.check_and_record(&logs.signature) {
            debug!(signature = %logs.signature, "Duplicate signature dropped");
            return false;
        }
        true
    }

    /// Forwards an accepted signature without waiting for the handler
    pub fn on_logs(&self, logs: LogsNotification) -> Option<JoinHandle<()>> {
        if !self.accept(&logs) {
            return None;
        }
        info!(
            signature = %logs.signature,
            "🔎 Pool initialization: https://explorer.solana.com/tx/{}", logs.signature
        );
        let handler = Arc::clone(&self.handler);
        Some(tokio::spawn(async move { handler.handle(logs.signature).await }))
    }

    async fn consume(
        &self,
        client: &SolanaWebSocketClient,
        mut events: mpsc::UnboundedReceiver<WebSocketEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                WebSocketEvent::Logs(logs) => {
                    self.on_logs(logs);
                }
                WebSocketEvent::Connected { url } => info!(url = %url, "🔗 Log stream connected"),
                WebSocketEvent::SubscriptionConfirmed { subscription_id } => {
                    info!(subscription_id, "📡 Log subscription active")
                }
                WebSocketEvent::Disconnected { reason } => {
                    let stats = client.get_stats().await;
                    warn!(
                        reason = %reason,
                        url = %stats.current_url,
                        attempts = stats.connection_attempts,
                        messages = stats.messages_received,
                        "Log stream disconnected"
                    );
                }
                WebSocketEvent::Error { error } => warn!(error = %error, "Log stream error"),
            }
        }
    }

    /// Streams logs until shutdown; connection failures are retried by the client
    pub async fn run(&self, config: WebSocketConfig, mut shutdown: broadcast::Receiver<()>) {
        info!(program = %config.program_id, marker = %self.marker, "👂 Chain event listener started");
        let (client, events) = SolanaWebSocketClient::new(config);

        tokio::select! {
            result = client.run() => {
                if let Err(e) = result {
                    warn!(error = %e, "WebSocket client stopped");
                }
            }
            _ = self.consume(&client, events) => warn!("Log event channel closed"),
            _ = shutdown.recv() => info!("🛑 Chain event listener shutting down"),
        }
    }
}
