use anyhow::{Context, Result};
use futures_util::future::select_all;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::Rpc;

const LOGS_SUBSCRIBE_ID: u64 = 1;

/// Configuration for the program log stream
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Primary RPC WebSocket URL (e.g., "wss://api.mainnet-beta.solana.com/")
    pub primary_url: String,
    /// Backup RPC WebSocket URLs for failover
    pub backup_urls: Vec<String>,
    /// Program whose logs are streamed
    pub program_id: String,
    pub commitment: String,
    pub connect_timeout_ms: u64,
    /// Delay after every URL in the rotation has failed
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl WebSocketConfig {
    pub fn from_rpc(rpc: &Rpc, program_id: &str) -> Self {
        Self {
            primary_url: rpc.ws_url.clone(),
            backup_urls: rpc.backup_ws_urls.clone(),
            program_id: program_id.to_string(),
            commitment: "finalized".to_string(),
            connect_timeout_ms: rpc.connect_timeout_ms,
            reconnect_delay_ms: rpc.reconnect_delay_ms,
            heartbeat_interval_ms: rpc.heartbeat_interval_ms,
        }
    }
}

/// JSON-RPC request for Solana WebSocket subscriptions
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn logs_subscribe(id: u64, program_id: &str, commitment: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: "logsSubscribe".to_string(),
            params: serde_json::json!([
                { "mentions": [program_id] },
                { "commitment": commitment }
            ]),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct WebSocketNotification {
    method: String,
    params: WebSocketNotificationParams,
}

#[derive(Debug, Deserialize)]
struct WebSocketNotificationParams {
    subscription: u64,
    result: LogsResult,
}

#[derive(Debug, Deserialize)]
struct LogsResult {
    value: LogsNotification,
}

/// One transaction's log lines for the subscribed program
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogsNotification {
    pub signature: String,
    /// Transaction error, `None` when it succeeded
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl LogsNotification {
    pub fn succeeded(&self) -> bool {
        self.err.as_ref().map_or(true, Value::is_null)
    }

    pub fn mentions(&self, marker: &str) -> bool {
        self.logs.iter().any(|line| line.contains(marker))
    }
}

/// Event emitted by the WebSocket client
#[derive(Debug, Clone)]
pub enum WebSocketEvent {
    Connected { url: String },
    Disconnected { reason: String },
    SubscriptionConfirmed { subscription_id: u64 },
    Logs(LogsNotification),
    Error { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub current_url: String,
    pub connection_attempts: u32,
    pub successful_connections: u32,
    pub messages_received: u64,
    pub last_message_time: Option<Instant>,
}

/// Streams program logs from Solana RPC nodes with failover across URLs
pub struct SolanaWebSocketClient {
    config: WebSocketConfig,
    event_sender: mpsc::UnboundedSender<WebSocketEvent>,
    stats: Arc<tokio::sync::RwLock<ConnectionStats>>,
}

impl std::fmt::Debug for SolanaWebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaWebSocketClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SolanaWebSocketClient {
    /// Creates the client and the receiver its events are delivered on
    pub fn new(config: WebSocketConfig) -> (Self, mpsc::UnboundedReceiver<WebSocketEvent>) {
        info!("Initializing Solana WebSocket client with primary URL: {}", config.primary_url);

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let stats = ConnectionStats {
            state: ConnectionState::Disconnected,
            current_url: config.primary_url.clone(),
            connection_attempts: 0,
            successful_connections: 0,
            messages_received: 0,
            last_message_time: None,
        };

        let client = Self {
            config,
            event_sender,
            stats: Arc::new(tokio::sync::RwLock::new(stats)),
        };
        (client, event_receiver)
    }

    /// Connection loop; runs until the task is dropped
    #[instrument(skip(self), fields(program = %self.config.program_id))]
    pub async fn run(&self) -> Result<()> {
        info!("Starting Solana WebSocket client connection loop");

        let urls = std::iter::once(self.config.primary_url.clone())
            .chain(self.config.backup_urls.iter().cloned())
            .collect::<Vec<_>>();
        let mut current_url_index = 0;

        loop {
            let url = &urls[current_url_index % urls.len()];
            self.set_state(ConnectionState::Connecting, Some(url)).await;

            match self.connect_and_handle(url).await {
                Ok(()) => {
                    debug!("WebSocket connection closed normally");
                    let _ = self.event_sender.send(WebSocketEvent::Disconnected {
                        reason: format!("{} closed", url),
                    });
                    sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                }
                Err(e) => {
                    error!(error = %e, url = %url, "WebSocket connection failed");
                    self.set_state(ConnectionState::Failed, None).await;
                    let _ = self.event_sender.send(WebSocketEvent::Error {
                        error: format!("Connection to {} failed: {}", url, e),
                    });

                    current_url_index += 1;
                    if current_url_index % urls.len() == 0 {
                        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
                        warn!("All URLs failed, waiting {:?} before retrying", delay);
                        sleep(delay).await;
                    }
                }
            }

            self.set_state(ConnectionState::Reconnecting, None).await;
        }
    }

    async fn set_state(&self, state: ConnectionState, url: Option<&str>) {
        let mut stats = self.stats.write().await;
        stats.state = state;
        if let Some(url) = url {
            stats.current_url = url.to_string();
            stats.connection_attempts += 1;
        }
        if state == ConnectionState::Connected {
            stats.successful_connections += 1;
            stats.last_message_time = Some(Instant::now());
        }
    }

    #[instrument(skip(self))]
    async fn connect_and_handle(&self, url: &str) -> Result<()> {
        info!("Attempting to connect to Solana RPC WebSocket: {}", url);

        let parsed_url = Url::parse(url).context("Failed to parse WebSocket URL")?;
        let (ws_stream, response) = timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connect_async(parsed_url),
        )
        .await
        .context("Connection timeout")?
        .context("Failed to connect to WebSocket")?;

        info!("Successfully connected to {} (HTTP {})", url, response.status());
        self.set_state(ConnectionState::Connected, None).await;
        let _ = self.event_sender.send(WebSocketEvent::Connected { url: url.to_string() });

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let request = JsonRpcRequest::logs_subscribe(
            LOGS_SUBSCRIBE_ID,
            &self.config.program_id,
            &self.config.commitment,
        );
        let subscribe = serde_json::to_string(&request)
            .context("Failed to serialize logs subscription request")?;
        tx.send(Message::Text(subscribe))
            .map_err(|_| anyhow::anyhow!("WebSocket sender channel closed"))?;
        info!("📡 Sent logs subscription for program {}", self.config.program_id);

        let tx_task = {
            let event_sender = self.event_sender.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if let Err(e) = ws_sender.send(msg).await {
                        error!(error = %e, "Failed to send WebSocket message");
                        let _ = event_sender.send(WebSocketEvent::Error {
                            error: format!("Send error: {}", e),
                        });
                        break;
                    }
                }
            })
        };

        let rx_task = {
            let event_sender = self.event_sender.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            {
                                let mut stats = stats.write().await;
                                stats.messages_received += 1;
                                stats.last_message_time = Some(Instant::now());
                            }
                            match parse_message(&text) {
                                Some(event) => {
                                    if event_sender.send(event).is_err() {
                                        debug!("Event receiver dropped");
                                        break;
                                    }
                                }
                                None => debug!(message = %text, "Ignoring WebSocket message"),
                            }
                        }
                        Ok(Message::Close(close_frame)) => {
                            info!("WebSocket closed: {:?}", close_frame);
                            break;
                        }
                        Ok(Message::Binary(data)) => {
                            warn!("Received unexpected binary message: {} bytes", data.len());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "WebSocket receive error");
                            let _ = event_sender.send(WebSocketEvent::Error {
                                error: format!("Receive error: {}", e),
                            });
                            break;
                        }
                    }
                }
                debug!("WebSocket receive loop ended");
            })
        };

        let heartbeat_task = {
            let tx = tx.clone();
            let heartbeat_interval = Duration::from_millis(self.config.heartbeat_interval_ms);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(heartbeat_interval);
                loop {
                    interval.tick().await;
                    if tx.send(Message::Ping(vec![])).is_err() {
                        debug!("Heartbeat channel closed");
                        break;
                    }
                }
            })
        };

        let mut session = SessionTasks(vec![tx_task, rx_task, heartbeat_task]);
        let finished = session.wait_any().await;
        debug!(
            task = ["sender", "receiver", "heartbeat"].get(finished).copied().unwrap_or("unknown"),
            "WebSocket session task completed"
        );

        Ok(())
    }

    pub async fn get_stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }
}

/// Tasks of one connection; dropping the set aborts whatever is still running
struct SessionTasks(Vec<JoinHandle<()>>);

impl SessionTasks {
    /// Waits for the first task to finish and returns its index
    async fn wait_any(&mut self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        let (_, index, _) = select_all(self.0.iter_mut()).await;
        index
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Maps a raw frame to an event; `None` for frames that carry nothing actionable
pub fn parse_message(message: &str) -> Option<WebSocketEvent> {
    if let Ok(notification) = serde_json::from_str::<WebSocketNotification>(message) {
        if notification.method != "logsNotification" {
            warn!("Unknown notification method: {}", notification.method);
            return None;
        }
        debug!(subscription = notification.params.subscription, "Received logs notification");
        return Some(WebSocketEvent::Logs(notification.params.result.value));
    }

    let response = serde_json::from_str::<JsonRpcResponse>(message).ok()?;
    if let Some(error) = response.error {
        error!("JSON-RPC error for request {:?}: {} - {}", response.id, error.code, error.message);
        return Some(WebSocketEvent::Error {
            error: format!("RPC error {}: {}", error.code, error.message),
        });
    }
    let subscription_id = response.result.and_then(|r| r.as_u64())?;
    info!("Subscription confirmed: subscription_id={}", subscription_id);
    Some(WebSocketEvent::SubscriptionConfirmed { subscription_id })
}
