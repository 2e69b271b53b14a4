//! NATS-backed bus (core NATS, no JetStream persistence)

use crate::{
    bus::{MessageBus, MessageHandler, SubscriptionId},
    message::Message,
    metrics::{MESSAGE_PUBLISH_TOTAL, MESSAGE_RECEIVE_TOTAL},
    Error, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// NATS connection settings
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Connection name reported to the server
    pub connection_name: String,

    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            connection_name: "iso-gateway".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Bus over a shared NATS connection
///
/// Each subscription runs on its own task; unsubscribing cancels the task,
/// which drains the NATS subscriber before exiting.
pub struct NatsBus {
    client: async_nats::Client,
    subscriptions: Mutex<HashMap<SubscriptionId, CancellationToken>>,
    next_id: AtomicU64,
}

impl NatsBus {
    /// Connect to NATS
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS: {}", config.url);

        let client = async_nats::ConnectOptions::new()
            .name(&config.connection_name)
            .connection_timeout(config.connect_timeout)
            .connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!("✅ Connected to NATS at {}", config.url);
        Ok(Self::with_client(client))
    }

    /// Wrap an already connected client
    pub fn with_client(client: async_nats::Client) -> Self {
        Self {
            client,
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

/// NATS treats whitespace, `*` and `>` specially; a channel containing them
/// would not map to a single literal subject.
pub fn validate_subject(channel: &str) -> Result<()> {
    if channel.is_empty()
        || channel
            .chars()
            .any(|c| c.is_whitespace() || c == '*' || c == '>')
    {
        return Err(Error::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

#[async_trait]
impl MessageBus for NatsBus {
    fn name(&self) -> &str {
        "nats"
    }

    async fn publish(&self, channel: &str, message: Message) -> Result<()> {
        validate_subject(channel)?;
        let payload = message.to_bytes()?;

        let result = async {
            self.client
                .publish(channel.to_string(), payload)
                .await
                .map_err(|e| Error::Publish {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })?;

            // Flush to ensure sent
            self.client.flush().await.map_err(|e| Error::Publish {
                channel: channel.to_string(),
                reason: format!("flush failed: {}", e),
            })
        }
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL.with_label_values(&[status]).inc();

        debug!(channel, message_id = %message.id, "Published message");
        result
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId> {
        validate_subject(channel)?;

        let mut subscriber = self
            .client
            .subscribe(channel.to_string())
            .await
            .map_err(|e| Error::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.subscriptions.lock().insert(id, token.clone());

        debug!(channel, subscription = %id, "Subscribed");

        let channel = channel.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = subscriber.unsubscribe().await {
                            warn!(channel = %channel, subscription = %id, "NATS unsubscribe failed: {}", e);
                        }
                        break;
                    }
                    next = subscriber.next() => {
                        let Some(msg) = next else {
                            debug!(channel = %channel, "NATS subscription stream ended");
                            break;
                        };
                        match Message::from_bytes(&msg.payload) {
                            Ok(message) => {
                                MESSAGE_RECEIVE_TOTAL.with_label_values(&["success"]).inc();
                                handler.handle(&channel, message, id).await;
                            }
                            Err(e) => {
                                error!(channel = %channel, "Failed to parse message: {}", e);
                                MESSAGE_RECEIVE_TOTAL.with_label_values(&["parse_error"]).inc();
                            }
                        }
                    }
                }
            }
        });

        Ok(id)
    }

    async fn unsubscribe(&self, channel: &str, subscription: SubscriptionId) -> Result<()> {
        match self.subscriptions.lock().remove(&subscription) {
            Some(token) => {
                token.cancel();
                debug!(channel, subscription = %subscription, "Unsubscribed");
            }
            None => debug!(channel, subscription = %subscription, "Unsubscribe for unknown subscription"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nats_config_default() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_subject_validation() {
        assert!(validate_subject("credit-transfer-status-E2E-001").is_ok());
        assert!(validate_subject("iso20022.pacs008.outbound").is_ok());
        assert!(matches!(validate_subject("a b"), Err(Error::InvalidChannel(_))));
        assert!(validate_subject("status-*").is_err());
        assert!(validate_subject("status->").is_err());
        assert!(validate_subject("").is_err());
    }
}
