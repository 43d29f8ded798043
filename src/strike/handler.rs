/// Listener callback: parse a pool signature, announce it, fan out buys

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dispatcher::BuyDispatcher;
use crate::config::BroadcastPolicy;
use crate::ingest::SignatureHandler;
use crate::scout::{MigrationParser, ParseRejection};

pub struct MigrationHandler {
    parser: Arc<MigrationParser>,
    dispatcher: BuyDispatcher,
    broadcast: BroadcastPolicy,
}

impl MigrationHandler {
    pub fn new(parser: Arc<MigrationParser>, dispatcher: BuyDispatcher, broadcast: BroadcastPolicy) -> Self {
        Self {
            parser,
            dispatcher,
            broadcast,
        }
    }
}

#[async_trait]
impl SignatureHandler for MigrationHandler {
    async fn handle(&self, signature: String) {
        match self.parser.parse(&signature).await {
            Ok(event) => {
                let (_, summary) = tokio::join!(
                    self.dispatcher.broadcast(&event.token),
                    self.dispatcher.dispatch(&event)
                );
                debug!(signature = %signature, attempted = summary.attempted(), "Migration handled");
            }
            Err(ParseRejection::HighRisk(token)) => {
                if self.broadcast == BroadcastPolicy::Always {
                    self.dispatcher.broadcast(&token).await;
                }
                info!(signature = %signature, mint = %token.address, "High risk listing skipped");
            }
            Err(ParseRejection::Service(reason)) => {
                warn!(signature = %signature, reason = %reason, "Failed to parse pool transaction");
            }
            Err(rejection) => {
                debug!(signature = %signature, reason = %rejection, "Signature is not a SOL pool listing");
            }
        }
    }
}
