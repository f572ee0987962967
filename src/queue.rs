//! Per-category submission queues.
//!
//! Producers publish raw JSON submissions; each category's consumer receives
//! one message at a time and must `ack` it after processing or `nack` it to
//! have it redelivered. A message nacked `max_deliveries` times is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::QueueError;
use crate::scheduler::job::Category;

pub const DEFAULT_MAX_DELIVERIES: u32 = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Handle used to ack or nack this delivery.
    pub delivery_id: Uuid,
    /// Raw message body (JSON).
    pub body: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
    /// 1 on first delivery.
    pub attempt: u32,
}

#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError>;

    /// Wait for the next message. Returns `None` once the queue is closed and drained.
    async fn receive(&self) -> Option<QueueMessage>;

    async fn ack(&self, delivery_id: Uuid) -> Result<(), QueueError>;

    /// Return the message for redelivery.
    async fn nack(&self, delivery_id: Uuid) -> Result<(), QueueError>;

    /// Stop accepting publishes and wake waiting consumers.
    async fn close(&self);

    /// Messages waiting for delivery.
    async fn depth(&self) -> usize;
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    unacked: HashMap<Uuid, QueueMessage>,
    closed: bool,
}

/// In-process queue with at-least-once delivery.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    max_deliveries: u32,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limits(name, DEFAULT_QUEUE_CAPACITY, DEFAULT_MAX_DELIVERIES)
    }

    pub fn with_limits(name: impl Into<String>, capacity: usize, max_deliveries: u32) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity,
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Messages delivered but not yet acked or nacked.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.unacked.len()
    }
}

#[async_trait]
impl SubmissionQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed(self.name.clone()));
        }
        if state.ready.len() >= self.capacity {
            return Err(QueueError::Full {
                queue: self.name.clone(),
                capacity: self.capacity,
            });
        }
        state.ready.push_back(QueueMessage {
            delivery_id: Uuid::new_v4(),
            body,
            enqueued_at: Utc::now(),
            attempt: 0,
        });
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Option<QueueMessage> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(mut message) = state.ready.pop_front() {
                    message.attempt += 1;
                    state.unacked.insert(message.delivery_id, message.clone());
                    return Some(message);
                }
                if state.closed {
                    // Let any other waiter observe the close too.
                    self.notify.notify_one();
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<(), QueueError> {
        self.state
            .lock()
            .await
            .unacked
            .remove(&delivery_id)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(delivery_id))
    }

    async fn nack(&self, delivery_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let message = state
            .unacked
            .remove(&delivery_id)
            .ok_or(QueueError::UnknownDelivery(delivery_id))?;

        if message.attempt >= self.max_deliveries {
            tracing::warn!(
                queue = %self.name,
                delivery_id = %delivery_id,
                attempts = message.attempt,
                "Message exceeded max deliveries, dropping"
            );
            return Ok(());
        }

        state.ready.push_back(message);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_one();
    }

    async fn depth(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

/// Routes categories to their queues.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    queues: HashMap<Category, Arc<dyn SubmissionQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: Category, queue: Arc<dyn SubmissionQueue>) {
        self.queues.insert(category, queue);
    }

    /// One `MemoryQueue` per category, named `<category>-queue`.
    pub fn in_memory(categories: &[Category], capacity: usize, max_deliveries: u32) -> Self {
        let mut registry = Self::new();
        for category in categories {
            registry.insert(
                category.clone(),
                Arc::new(MemoryQueue::with_limits(
                    category.queue_name(),
                    capacity,
                    max_deliveries,
                )),
            );
        }
        registry
    }

    pub fn get(&self, category: &Category) -> Result<Arc<dyn SubmissionQueue>, QueueError> {
        self.queues
            .get(category)
            .cloned()
            .ok_or_else(|| QueueError::UnknownCategory(category.to_string()))
    }

    /// Registered categories in sorted order.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.queues.keys().cloned().collect();
        categories.sort();
        categories
    }

    pub async fn close_all(&self) {
        for queue in self.queues.values() {
            queue.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let queue = MemoryQueue::new("mail-queue");
        queue.publish(b"one".to_vec()).await.unwrap();
        queue.publish(b"two".to_vec()).await.unwrap();
        assert_eq!(queue.depth().await, 2);

        let first = queue.receive().await.unwrap();
        assert_eq!(first.body, b"one");
        assert_eq!(first.attempt, 1);
        queue.ack(first.delivery_id).await.unwrap();

        let second = queue.receive().await.unwrap();
        assert_eq!(second.body, b"two");
        assert_eq!(queue.in_flight().await, 1);
    }

    #[tokio::test]
    async fn nack_redelivers_until_max_deliveries() {
        let queue = MemoryQueue::with_limits("sms-queue", 10, 2);
        queue.publish(b"flaky".to_vec()).await.unwrap();

        let first = queue.receive().await.unwrap();
        queue.nack(first.delivery_id).await.unwrap();

        let second = queue.receive().await.unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.delivery_id, first.delivery_id);
        queue.nack(second.delivery_id).await.unwrap();

        // Dead-lettered: nothing left to deliver.
        assert_eq!(queue.depth().await, 0);
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn ack_unknown_delivery_fails() {
        let queue = MemoryQueue::new("mail-queue");
        let id = Uuid::new_v4();
        assert_eq!(queue.ack(id).await, Err(QueueError::UnknownDelivery(id)));
    }

    #[tokio::test]
    async fn receive_waits_for_publish() {
        let queue = Arc::new(MemoryQueue::new("mail-queue"));
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.publish(b"late".to_vec()).await.unwrap();
        });

        let message = tokio::time::timeout(Duration::from_secs(2), queue.receive())
            .await
            .expect("receive timed out")
            .unwrap();
        assert_eq!(message.body, b"late");
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = MemoryQueue::new("mail-queue");
        queue.publish(b"last".to_vec()).await.unwrap();
        queue.close().await;

        assert!(queue.publish(b"too late".to_vec()).await.is_err());
        assert!(queue.receive().await.is_some());
        assert!(queue.receive().await.is_none());
    }

    #[tokio::test]
    async fn publish_rejected_at_capacity() {
        let queue = MemoryQueue::with_limits("mail-queue", 1, 3);
        queue.publish(b"a".to_vec()).await.unwrap();
        assert!(matches!(
            queue.publish(b"b".to_vec()).await,
            Err(QueueError::Full { capacity: 1, .. })
        ));
    }

    #[test]
    fn registry_lists_sorted_categories() {
        let registry = QueueRegistry::in_memory(
            &[Category::from("sms"), Category::from("mail")],
            DEFAULT_QUEUE_CAPACITY,
            DEFAULT_MAX_DELIVERIES,
        );
        assert_eq!(
            registry.categories(),
            vec![Category::from("mail"), Category::from("sms")]
        );
        assert_eq!(
            registry.get(&Category::from("mail")).unwrap().name(),
            "mail-queue"
        );
        assert!(registry.get(&Category::from("push")).is_err());
    }
}
