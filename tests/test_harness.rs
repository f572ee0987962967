//! Test harness for in-process scheduler tests.
//!
//! Provides a node with running consumers plus helpers for submitting raw
//! payloads and waiting on the published schedule.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tierline::config::{NodeConfig, QueueConfig};
use tierline::error::QueueError;
use tierline::node::Node;
use tierline::scheduler::{Category, Job, JobId, Priority};

/// Node config with the given categories and a low redelivery limit.
pub fn test_node_config(categories: &[&str]) -> NodeConfig {
    let mut config = NodeConfig::default().with_categories(categories.iter().copied());
    config.queue = QueueConfig {
        max_deliveries: 2,
        capacity: 1_000,
    };
    config
}

/// A stored job, built directly for seeding stores and pure ordering tests.
pub fn job(
    id: u64,
    name: &str,
    priority: Priority,
    dependency: Option<u64>,
    category: &str,
) -> Job {
    Job {
        id: JobId(id),
        name: name.to_string(),
        priority,
        submitted_at: id as i64,
        dependency: dependency.map(JobId),
        category: Category::from(category),
    }
}

/// A node whose consumers are running; no network listeners are bound.
pub struct TestNode {
    pub node: Node,
    pub shutdown: CancellationToken,
    consumers: Vec<JoinHandle<()>>,
}

impl TestNode {
    pub async fn start(categories: &[&str]) -> Self {
        Self::start_with(Node::new(test_node_config(categories))).await
    }

    pub async fn start_with(node: Node) -> Self {
        let shutdown = CancellationToken::new();
        let consumers = node.spawn_consumers(&shutdown);
        Self {
            node,
            shutdown,
            consumers,
        }
    }

    /// Publish a raw JSON body on a category queue, as a producer would.
    pub async fn submit(&self, category: &str, body: &str) -> Result<(), QueueError> {
        self.node
            .queues
            .get(&Category::from(category))?
            .publish(body.as_bytes().to_vec())
            .await
    }

    pub async fn job_count(&self) -> usize {
        self.node.jobs.len().await.expect("job store readable")
    }

    /// Names in the live schedule, optionally restricted to a category.
    pub async fn schedule_names(&self, category: Option<&str>) -> Vec<String> {
        let category = category.map(Category::from);
        self.node
            .reader
            .query(category.as_ref())
            .await
            .expect("schedule readable")
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    }

    /// Wait until every category queue is empty.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        wait_for(
            || async {
                for category in self.node.queues.categories() {
                    let queue = match self.node.queues.get(&category) {
                        Ok(queue) => queue,
                        Err(_) => return false,
                    };
                    if queue.depth().await > 0 {
                        return false;
                    }
                }
                true
            },
            timeout,
            Duration::from_millis(10),
        )
        .await
    }

    /// Wait until the live schedule holds exactly `count` entries.
    pub async fn wait_for_schedule_len(&self, count: usize, timeout: Duration) -> bool {
        wait_for(
            || async { self.schedule_names(None).await.len() == count },
            timeout,
            Duration::from_millis(10),
        )
        .await
    }

    /// Cancel the consumers and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.node.queues.close_all().await;
        for handle in self.consumers {
            let _ = handle.await;
        }
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
