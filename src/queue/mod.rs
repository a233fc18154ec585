//! Generic work queue for worker processes: redelivers nacked messages up to
//! a retry cap, then parks them in a dead-letter queue.
//!
//! A plain FIFO deque guarded by a single mutex, with an `attempts` counter
//! on each message and a hard cap past which a message moves to the
//! dead-letter queue instead of being retried forever. Messages carry an
//! arbitrary `serde_json::Value` payload rather than a fixed task type.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::deps::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub payload: Value,
    pub attempts: u32,
}

pub type Handler = Arc<dyn Fn(QueueMessage) -> BoxFuture<'static, Ack> + Send + Sync>;

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, payload: Value) -> String;

    /// Runs `handler` against messages as they arrive until [`StopConsuming`]
    /// is used to stop it. A message whose handler returns `Ack::Nack` is
    /// requeued at the back, up to `max_attempts`; beyond that it moves to
    /// the dead-letter queue instead of being retried forever.
    async fn consume(self: Arc<Self>, handler: Handler) -> StopConsuming;

    async fn dead_letters(&self) -> Vec<QueueMessage>;
}

pub struct StopConsuming {
    handle: tokio::task::JoinHandle<()>,
}

impl StopConsuming {
    pub fn stop(self) {
        self.handle.abort();
    }
}

struct State {
    pending: VecDeque<QueueMessage>,
    dead_letters: Vec<QueueMessage>,
}

pub struct InMemoryQueue {
    state: Mutex<State>,
    max_attempts: u32,
    poll_interval: std::time::Duration,
}

impl InMemoryQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(State { pending: VecDeque::new(), dead_letters: Vec::new() }),
            max_attempts: max_attempts.max(1),
            poll_interval: std::time::Duration::from_millis(25),
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, payload: Value) -> String {
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.pending.push_back(QueueMessage { id: id.clone(), payload, attempts: 0 });
        id
    }

    async fn consume(self: Arc<Self>, handler: Handler) -> StopConsuming {
        let queue = self;
        let handle = tokio::spawn(async move {
            loop {
                let message = { queue.state.lock().await.pending.pop_front() };
                let Some(mut message) = message else {
                    tokio::time::sleep(queue.poll_interval).await;
                    continue;
                };

                match handler(message.clone()).await {
                    Ack::Ack => {}
                    Ack::Nack => {
                        message.attempts += 1;
                        let mut state = queue.state.lock().await;
                        if message.attempts >= queue.max_attempts {
                            tracing::warn!(message_id = %message.id, attempts = message.attempts, "message exhausted retries, moving to dead-letter queue");
                            state.dead_letters.push(message);
                        } else {
                            state.pending.push_back(message);
                        }
                    }
                }
            }
        });
        StopConsuming { handle }
    }

    async fn dead_letters(&self) -> Vec<QueueMessage> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn acked_message_is_not_redelivered() {
        let queue = Arc::new(InMemoryQueue::new(3));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        queue.enqueue(Value::Null).await;

        let consumer = queue
            .clone()
            .consume(Arc::new(move |_msg| {
                let seen = seen_clone.clone();
                Box::pin(async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ack::Ack
                })
            }))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        consumer.stop();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nacked_message_moves_to_dead_letters_after_max_attempts() {
        let queue = Arc::new(InMemoryQueue::new(2));
        queue.enqueue(Value::Null).await;

        let consumer = queue
            .clone()
            .consume(Arc::new(|_msg| Box::pin(async { Ack::Nack })))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        consumer.stop();

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
    }
}
