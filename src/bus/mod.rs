//! Generic channel-keyed event bus, the external interface durable
//! scheduling and cross-process dispatch build on.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily, with a
//! monotonic sequence number and a tracing warning rather than a hard error
//! when a publish finds no subscribers - nobody need be listening yet.
//! Channels are identified by an arbitrary `&str` key carrying an arbitrary
//! `serde_json::Value` payload, since topics here are dynamic rather than
//! known at compile time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

/// A handle returned by [`EventBus::subscribe`]; dropping or calling
/// [`unsubscribe`](Unsubscribe::unsubscribe) stops the handler from
/// receiving further messages.
pub struct Unsubscribe {
    handle: tokio::task::JoinHandle<()>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, message: Value);

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn Fn(Value) + Send + Sync>,
    ) -> Unsubscribe;
}

/// In-process reference implementation: one broadcast channel per topic,
/// created lazily on first publish or subscribe.
pub struct InMemoryEventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    capacity: usize,
    sequence: AtomicU64,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        Self { channels: RwLock::new(HashMap::new()), capacity, sequence: AtomicU64::new(0) }
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<Value> {
        if let Some(sender) = self.channels.read().await.get(channel) {
            return sender.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, channel: &str, message: Value) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender_for(channel).await;
        // No subscribers is not an error - the event simply has no audience yet.
        let _ = sender.send(message);
    }

    async fn subscribe(&self, channel: &str, handler: Arc<dyn Fn(Value) + Send + Sync>) -> Unsubscribe {
        let mut receiver = self.sender_for(channel).await.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => handler(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event bus subscriber lagged, messages were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Unsubscribe { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = InMemoryEventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let _sub = bus
            .subscribe("topic", Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        bus.publish("topic", serde_json::json!({"x": 1})).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryEventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = bus
            .subscribe("topic", Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        sub.unsubscribe();
        sleep(Duration::from_millis(20)).await;
        bus.publish("topic", Value::Null).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = InMemoryEventBus::default();
        bus.publish("empty-topic", Value::Null).await;
    }
}
