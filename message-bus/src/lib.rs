//! Message bus and correlation layer
//!
//! Provides pub/sub messaging with:
//! - A transport-neutral [`MessageBus`] contract
//! - An in-process bus and a core NATS bus
//! - `{type}-{id}` channel keys for correlated legs
//! - A correlation registry that turns "subscribe, wait, unsubscribe" into a
//!   single awaitable with timeout
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bus;
pub mod channel;
pub mod client;
pub mod correlation;
pub mod error;
pub mod memory;
pub mod message;
pub mod metrics;

pub use bus::{MessageBus, MessageHandler, SubscriptionId};
pub use channel::{ChannelKey, ChannelType};
pub use client::{NatsBus, NatsConfig};
pub use correlation::{CorrelationRegistry, PendingResponse};
pub use error::{Error, Result};
pub use memory::InMemoryBus;
pub use message::Message;
