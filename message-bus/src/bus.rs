//! Publish/subscribe contract shared by every bus implementation

use crate::{message::Message, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Handle identifying one subscription on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle incoming message
    async fn handle(&self, channel: &str, message: Message, subscription: SubscriptionId);
}

/// Pub/sub bus
///
/// Delivery is at most once per subscriber and messages published before a
/// subscription exists are not replayed.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Bus implementation name (for health reporting)
    fn name(&self) -> &str;

    /// Publish a message on a channel
    async fn publish(&self, channel: &str, message: Message) -> Result<()>;

    /// Register a handler for every message published on `channel`
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId>;

    /// Remove a subscription. Unknown ids are not an error.
    async fn unsubscribe(&self, channel: &str, subscription: SubscriptionId) -> Result<()>;
}
