//! Messenger - the bus surface the services talk to.
//!
//! Two primitives: topic publish/subscribe and a flat key-value store.
//! Nothing here is durable; a subscriber only sees messages published after
//! it subscribed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use tracing::trace;

use crate::ProtoError;

/// Named-channel publish/subscribe plus a key-value store.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ProtoError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ProtoError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ProtoError>;

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ProtoError>;
}

/// Deliveries for one subscriber, in publish order.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next delivery, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// A delivery that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[derive(Default)]
struct MemoryBusInner {
    subscribers: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
    store: RwLock<HashMap<String, Bytes>>,
}

/// In-process messenger.
///
/// Every subscriber owns an unbounded queue, so a slow reader never loses
/// messages and never slows down the publisher. Publishing to a topic with
/// no subscribers drops the message.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriber count for a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let subscribers = self.inner.subscribers.read().await;
        subscribers
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Messenger for MemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ProtoError> {
        let mut subscribers = self.inner.subscribers.write().await;
        let Some(subs) = subscribers.get_mut(topic) else {
            trace!(topic, "no subscribers, dropping message");
            return Ok(());
        };

        // Dropped subscriptions are pruned lazily here
        subs.retain(|tx| tx.send(payload.clone()).is_ok());
        trace!(topic, delivered = subs.len(), bytes = payload.len(), "published");
        if subs.is_empty() {
            subscribers.remove(topic);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ProtoError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(topic, rx))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ProtoError> {
        Ok(self.inner.store.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ProtoError> {
        self.inner.store.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
