//! In-process bus
//!
//! Delivers to every subscriber of a channel in registration order. Used by
//! single-node deployments and by tests.

use crate::{
    bus::{MessageBus, MessageHandler, SubscriptionId},
    message::Message,
    metrics::{MESSAGE_PUBLISH_TOTAL, MESSAGE_RECEIVE_TOTAL},
    Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type Subscribers = Vec<(SubscriptionId, Arc<dyn MessageHandler>)>;

/// In-memory pub/sub bus
#[derive(Default)]
pub struct InMemoryBus {
    channels: Mutex<HashMap<String, Subscribers>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions on one channel
    pub fn subscription_count(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, Vec::len)
    }

    /// Live subscriptions across all channels
    pub fn total_subscriptions(&self) -> usize {
        self.channels.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn publish(&self, channel: &str, message: Message) -> Result<()> {
        // Snapshot so handlers can (un)subscribe without deadlocking.
        let subscribers: Subscribers = self
            .channels
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default();

        MESSAGE_PUBLISH_TOTAL.with_label_values(&["success"]).inc();
        debug!(
            channel,
            message_id = %message.id,
            subscribers = subscribers.len(),
            "Publishing message"
        );

        for (id, handler) in subscribers {
            MESSAGE_RECEIVE_TOTAL.with_label_values(&["success"]).inc();
            handler.handle(channel, message.clone(), id).await;
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push((id, handler));

        debug!(channel, subscription = %id, "Subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, channel: &str, subscription: SubscriptionId) -> Result<()> {
        let mut channels = self.channels.lock();
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.retain(|(id, _)| *id != subscription);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        debug!(channel, subscription = %subscription, "Unsubscribed");
        Ok(())
    }
}
