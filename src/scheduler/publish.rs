use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::scheduler::job::{Category, ScheduleEntry};

/// A complete ordered schedule. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// 0 for the empty schedule present before the first publish.
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn empty() -> Self {
        Self {
            version: 0,
            computed_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn filtered(&self, category: Option<&Category>) -> Vec<ScheduleEntry> {
        match category {
            Some(category) => self
                .entries
                .iter()
                .filter(|entry| &entry.category == category)
                .cloned()
                .collect(),
            None => self.entries.clone(),
        }
    }
}

/// Fast-access store holding the single live schedule.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Swap in a new schedule in one step.
    async fn replace(&self, schedule: Schedule) -> Result<(), StoreError>;

    /// The schedule currently published.
    async fn read(&self) -> Result<Arc<Schedule>, StoreError>;

    /// Receiver notified on every replace.
    fn subscribe(&self) -> watch::Receiver<Arc<Schedule>>;
}

/// In-process schedule store built on a `watch` channel.
///
/// Replacing sends a fresh `Arc<Schedule>`; readers clone the current `Arc`
/// so they hold either the previous schedule or the new one, never a mix.
#[derive(Debug)]
pub struct MemoryScheduleStore {
    tx: watch::Sender<Arc<Schedule>>,
}

impl Default for MemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Schedule::empty()));
        Self { tx }
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn replace(&self, schedule: Schedule) -> Result<(), StoreError> {
        self.tx.send_replace(Arc::new(schedule));
        Ok(())
    }

    async fn read(&self) -> Result<Arc<Schedule>, StoreError> {
        Ok(self.tx.borrow().clone())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<Schedule>> {
        self.tx.subscribe()
    }
}

/// Acknowledgement returned after a schedule went live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishAck {
    pub version: u64,
    pub entries: usize,
}

/// Writes freshly computed schedules to the schedule store.
#[derive(Clone)]
pub struct SchedulePublisher {
    store: Arc<dyn ScheduleStore>,
    version: Arc<AtomicU64>,
}

impl SchedulePublisher {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the live schedule with `entries`.
    ///
    /// The version only advances once the store accepted the schedule, so a
    /// failed replace leaves no gap. Callers serialize publishes.
    pub async fn publish(&self, entries: Vec<ScheduleEntry>) -> Result<PublishAck, StoreError> {
        let version = self.version.load(Ordering::SeqCst) + 1;
        let ack = PublishAck {
            version,
            entries: entries.len(),
        };
        self.store
            .replace(Schedule {
                version,
                computed_at: Utc::now(),
                entries,
            })
            .await?;
        self.version.store(version, Ordering::SeqCst);
        tracing::info!(version, entries = ack.entries, "Schedule published");
        Ok(ack)
    }
}

/// Read side of the published schedule.
#[derive(Clone)]
pub struct ScheduleReader {
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleReader {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    pub async fn current(&self) -> Result<Arc<Schedule>, StoreError> {
        self.store.read().await
    }

    /// Entries of the live schedule, restricted to `category` when given.
    pub async fn query(
        &self,
        category: Option<&Category>,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(self.store.read().await?.filtered(category))
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Schedule>> {
        self.store.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, category: &str) -> ScheduleEntry {
        ScheduleEntry {
            name: name.to_string(),
            category: Category::from(category),
        }
    }

    #[tokio::test]
    async fn publish_replaces_previous_schedule() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryScheduleStore::new());
        let publisher = SchedulePublisher::new(store.clone());
        let reader = ScheduleReader::new(store);

        assert_eq!(reader.current().await.unwrap().version, 0);

        publisher
            .publish(vec![entry("a", "mail"), entry("b", "sms")])
            .await
            .unwrap();
        let ack = publisher.publish(vec![entry("c", "sms")]).await.unwrap();
        assert_eq!(ack, PublishAck { version: 2, entries: 1 });

        let current = reader.current().await.unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.entries, vec![entry("c", "sms")]);
    }

    #[tokio::test]
    async fn query_filters_by_category() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryScheduleStore::new());
        let publisher = SchedulePublisher::new(store.clone());
        let reader = ScheduleReader::new(store);
        publisher
            .publish(vec![entry("a", "mail"), entry("b", "sms"), entry("c", "mail")])
            .await
            .unwrap();

        let mail = reader.query(Some(&Category::from("mail"))).await.unwrap();
        assert_eq!(mail, vec![entry("a", "mail"), entry("c", "mail")]);

        let push = reader.query(Some(&Category::from("push"))).await.unwrap();
        assert!(push.is_empty());

        assert_eq!(reader.query(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn held_snapshot_survives_replace() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryScheduleStore::new());
        let publisher = SchedulePublisher::new(store.clone());
        let reader = ScheduleReader::new(store);

        publisher.publish(vec![entry("old", "mail")]).await.unwrap();
        let held = reader.current().await.unwrap();
        publisher.publish(vec![entry("new", "mail")]).await.unwrap();

        assert_eq!(held.entries, vec![entry("old", "mail")]);
        assert_eq!(reader.current().await.unwrap().entries, vec![entry("new", "mail")]);
    }

    /// Fails the first `failures` replaces, then delegates.
    struct FlakyStore {
        inner: MemoryScheduleStore,
        failures: AtomicU64,
    }

    #[async_trait]
    impl ScheduleStore for FlakyStore {
        async fn replace(&self, schedule: Schedule) -> Result<(), StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("replace refused".to_string()));
            }
            self.inner.replace(schedule).await
        }

        async fn read(&self) -> Result<Arc<Schedule>, StoreError> {
            self.inner.read().await
        }

        fn subscribe(&self) -> watch::Receiver<Arc<Schedule>> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn failed_replace_does_not_consume_a_version() {
        let store: Arc<dyn ScheduleStore> = Arc::new(FlakyStore {
            inner: MemoryScheduleStore::new(),
            failures: AtomicU64::new(1),
        });
        let publisher = SchedulePublisher::new(store.clone());
        let reader = ScheduleReader::new(store);

        assert!(publisher.publish(vec![entry("a", "mail")]).await.is_err());
        assert_eq!(reader.current().await.unwrap().version, 0);

        let ack = publisher.publish(vec![entry("a", "mail")]).await.unwrap();
        assert_eq!(ack.version, 1);
        assert_eq!(reader.current().await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn subscribers_see_new_versions() {
        let store: Arc<dyn ScheduleStore> = Arc::new(MemoryScheduleStore::new());
        let publisher = SchedulePublisher::new(store.clone());
        let mut rx = ScheduleReader::new(store).subscribe();

        publisher.publish(vec![entry("a", "mail")]).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().version, 1);
    }
}
