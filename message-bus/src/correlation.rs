//! Correlation registry
//!
//! Lets one leg of a flow wait for a message that another leg publishes on a
//! derived channel. Waiters on the same channel share one bus subscription
//! and are served oldest first: each published message resolves exactly one
//! waiter. The subscription is torn down as soon as the channel has no
//! waiters left, whether that happened through delivery, timeout or the
//! waiter being dropped.
//!
//! Callers never see a [`SubscriptionId`]; the only handle is the
//! [`PendingResponse`] future, which cleans up after itself.

use crate::{
    bus::{MessageBus, MessageHandler, SubscriptionId},
    channel::ChannelKey,
    message::Message,
    metrics::{CORRELATION_PENDING, CORRELATION_WAIT_DURATION, CORRELATION_WAIT_TOTAL},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Message>,
}

struct PendingChannel {
    generation: u64,
    subscription: Option<SubscriptionId>,
    waiters: VecDeque<Waiter>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingChannel>>>;

/// Registry of in-flight correlated waits
#[derive(Clone)]
pub struct CorrelationRegistry {
    bus: Arc<dyn MessageBus>,
    pending: PendingMap,
    sequence: Arc<AtomicU64>,
}

impl CorrelationRegistry {
    /// Create a registry over a shared bus connection
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            pending: Arc::new(Mutex::new(HashMap::new())),
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Underlying bus
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Waiters currently registered on a key
    pub fn pending_waiters(&self, key: &ChannelKey) -> usize {
        self.pending
            .lock()
            .get(&key.channel())
            .map_or(0, |entry| entry.waiters.len())
    }

    /// Subscribe, then wait up to `timeout` for the first message on `key`
    pub async fn await_correlated_response(
        &self,
        key: &ChannelKey,
        timeout: Duration,
    ) -> Result<Message> {
        self.register(key).await?.wait(timeout).await
    }

    /// Establish the subscription for `key` without starting the timer
    ///
    /// Use this when the message that answers the wait is provoked by a
    /// publish the caller makes afterwards; the bus does not replay.
    pub async fn register(&self, key: &ChannelKey) -> Result<PendingResponse> {
        let channel = key.channel();
        let wait_id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let (generation, needs_subscription) = {
            let mut pending = self.pending.lock();
            match pending.entry(channel.clone()) {
                Entry::Occupied(mut entry) => {
                    let entry = entry.get_mut();
                    entry.waiters.push_back(Waiter { id: wait_id, tx });
                    (entry.generation, false)
                }
                Entry::Vacant(slot) => {
                    let generation = self.sequence.fetch_add(1, Ordering::Relaxed);
                    slot.insert(PendingChannel {
                        generation,
                        subscription: None,
                        waiters: VecDeque::from([Waiter { id: wait_id, tx }]),
                    });
                    (generation, true)
                }
            }
        };
        CORRELATION_PENDING.inc();

        let mut response = PendingResponse {
            registry: self.clone(),
            channel,
            generation,
            wait_id,
            rx,
            armed: true,
        };

        if needs_subscription {
            let handler = Arc::new(CorrelationHandler {
                pending: self.pending.clone(),
                generation,
            });
            match self.bus.subscribe(&response.channel, handler).await {
                Ok(subscription) => self.attach(&response.channel, generation, subscription).await,
                Err(e) => {
                    warn!(channel = %response.channel, "Correlation subscribe failed: {}", e);
                    // Dropping the entry closes every waiter that joined meanwhile.
                    self.remove_channel(&response.channel, generation);
                    response.disarm();
                    CORRELATION_WAIT_TOTAL.with_label_values(&["subscribe_error"]).inc();
                    return Err(e);
                }
            }
        }

        debug!(channel = %response.channel, wait_id, "Correlation wait registered");
        Ok(response)
    }

    /// Publish on the channel a waiter for `key` listens to
    pub async fn publish_correlated(&self, key: &ChannelKey, message: Message) -> Result<()> {
        let channel = key.channel();
        let message = match message.correlation_id {
            Some(_) => message,
            None => message.with_correlation_id(key.id()),
        };
        self.bus.publish(&channel, message).await?;
        debug!(channel = %channel, "Correlated message published");
        Ok(())
    }

    async fn attach(&self, channel: &str, generation: u64, subscription: SubscriptionId) {
        let orphaned = {
            let mut pending = self.pending.lock();
            match pending.get_mut(channel) {
                Some(entry) if entry.generation == generation => {
                    entry.subscription = Some(subscription);
                    false
                }
                _ => true,
            }
        };
        if orphaned {
            self.unsubscribe_quietly(channel, subscription).await;
        }
    }

    fn remove_channel(&self, channel: &str, generation: u64) {
        let mut pending = self.pending.lock();
        if pending
            .get(channel)
            .is_some_and(|entry| entry.generation == generation)
        {
            if let Some(entry) = pending.remove(channel) {
                CORRELATION_PENDING.sub(entry.waiters.len() as i64);
            }
        }
    }

    /// Drop one waiter; returns whether it was still queued and, if the
    /// channel went idle, the subscription to release.
    fn remove_waiter(
        &self,
        channel: &str,
        generation: u64,
        wait_id: u64,
    ) -> (bool, Option<SubscriptionId>) {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(channel) else {
            return (false, None);
        };
        if entry.generation != generation {
            return (false, None);
        }

        let before = entry.waiters.len();
        entry.waiters.retain(|waiter| waiter.id != wait_id);
        let found = entry.waiters.len() != before;
        if found {
            CORRELATION_PENDING.dec();
        }

        let release = if entry.waiters.is_empty() {
            pending.remove(channel).and_then(|entry| entry.subscription)
        } else {
            None
        };
        (found, release)
    }

    /// Tear the channel down if nobody is waiting on it any more
    fn take_idle_subscription(&self, channel: &str, generation: u64) -> Option<SubscriptionId> {
        let mut pending = self.pending.lock();
        match pending.get(channel) {
            Some(entry) if entry.generation == generation && entry.waiters.is_empty() => {
                pending.remove(channel).and_then(|entry| entry.subscription)
            }
            _ => None,
        }
    }

    async fn unsubscribe_quietly(&self, channel: &str, subscription: SubscriptionId) {
        if let Err(e) = self.bus.unsubscribe(channel, subscription).await {
            warn!(channel, subscription = %subscription, "Unsubscribe failed: {}", e);
        }
    }
}

/// Bus handler shared by all waiters of one channel generation
struct CorrelationHandler {
    pending: PendingMap,
    generation: u64,
}

#[async_trait]
impl MessageHandler for CorrelationHandler {
    async fn handle(&self, channel: &str, message: Message, subscription: SubscriptionId) {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(channel) else {
            debug!(channel, subscription = %subscription, "No pending wait; ignoring message");
            return;
        };
        if entry.generation != self.generation {
            debug!(channel, subscription = %subscription, "Stale subscription; ignoring message");
            return;
        }

        let mut message = message;
        while let Some(waiter) = entry.waiters.pop_front() {
            CORRELATION_PENDING.dec();
            match waiter.tx.send(message) {
                Ok(()) => {
                    debug!(channel, wait_id = waiter.id, "Correlated message delivered");
                    return;
                }
                // Receiver already gone; offer the message to the next waiter.
                Err(returned) => message = returned,
            }
        }
        debug!(channel, "Duplicate message after resolution; ignoring");
    }
}

/// A registered wait on one correlation channel
///
/// Dropping it before completion removes the waiter and releases the bus
/// subscription in the background.
pub struct PendingResponse {
    registry: CorrelationRegistry,
    channel: String,
    generation: u64,
    wait_id: u64,
    rx: oneshot::Receiver<Message>,
    armed: bool,
}

impl PendingResponse {
    /// Channel this wait listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Start the timer and wait for the correlated message
    pub async fn wait(mut self, timeout: Duration) -> Result<Message> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        self.disarm();

        let registry = self.registry.clone();
        let channel = std::mem::take(&mut self.channel);

        let (label, result) = match outcome {
            Ok(Ok(message)) => {
                if let Some(subscription) = registry.take_idle_subscription(&channel, self.generation) {
                    registry.unsubscribe_quietly(&channel, subscription).await;
                }
                ("resolved", Ok(message))
            }
            Ok(Err(_)) => (
                "closed",
                Err(Error::ChannelClosed(channel.clone())),
            ),
            Err(_) => {
                let (still_queued, release) =
                    registry.remove_waiter(&channel, self.generation, self.wait_id);
                if let Some(subscription) = release {
                    registry.unsubscribe_quietly(&channel, subscription).await;
                }

                // Delivery raced the timer and won: the message is already ours.
                let raced = if still_queued { None } else { self.rx.try_recv().ok() };
                match raced {
                    Some(message) => {
                        if let Some(subscription) = registry.take_idle_subscription(&channel, self.generation) {
                            registry.unsubscribe_quietly(&channel, subscription).await;
                        }
                        ("resolved", Ok(message))
                    }
                    None => {
                        info!(channel = %channel, timeout_ms = timeout.as_millis() as u64, "Correlated wait timed out");
                        (
                            "timeout",
                            Err(Error::Timeout {
                                channel: channel.clone(),
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        )
                    }
                }
            }
        };

        CORRELATION_WAIT_TOTAL.with_label_values(&[label]).inc();
        CORRELATION_WAIT_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (_, release) = self
            .registry
            .remove_waiter(&self.channel, self.generation, self.wait_id);
        CORRELATION_WAIT_TOTAL.with_label_values(&["cancelled"]).inc();

        let Some(subscription) = release else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let registry = self.registry.clone();
                let channel = std::mem::take(&mut self.channel);
                handle.spawn(async move {
                    registry.unsubscribe_quietly(&channel, subscription).await;
                });
            }
            Err(_) => warn!(
                channel = %self.channel,
                subscription = %subscription,
                "No runtime to release subscription of a dropped wait"
            ),
        }
    }
}
