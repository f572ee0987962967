use std::net::SocketAddr;

use crate::queue::{DEFAULT_MAX_DELIVERIES, DEFAULT_QUEUE_CAPACITY};
use crate::scheduler::Category;

/// Delivery policy for the per-category submission queues.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Deliveries attempted before a repeatedly nacked message is dropped
    pub max_deliveries: u32,
    /// Messages a queue holds before publishes are refused
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// gRPC listen address
    pub listen_addr: SocketAddr,
    /// HTTP API listen address; the API is disabled when unset
    pub http_addr: Option<SocketAddr>,
    /// One queue and one consumer is started per category
    pub categories: Vec<Category>,
    pub queue: QueueConfig,
    /// Job store capacity
    pub max_jobs: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 50051)),
            http_addr: None,
            categories: vec![Category::from("mail"), Category::from("sms")],
            queue: QueueConfig::default(),
            max_jobs: 100_000,
        }
    }
}

impl NodeConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = Some(addr);
        self
    }

    /// Replace the category list, dropping blanks and duplicates.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories.clear();
        for name in categories {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let category = Category::from(name);
            if !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_default() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.max_deliveries, 5);
        assert_eq!(cfg.capacity, 10_000);
    }

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:50051");
        assert!(cfg.http_addr.is_none());
        assert_eq!(
            cfg.categories,
            vec![Category::from("mail"), Category::from("sms")]
        );
        assert_eq!(cfg.max_jobs, 100_000);
    }

    #[test]
    fn node_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = NodeConfig::new(addr);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.categories.len(), 2);
    }

    #[test]
    fn node_config_with_http_addr() {
        let addr: SocketAddr = "0.0.0.0:3003".parse().unwrap();
        let cfg = NodeConfig::default().with_http_addr(addr);
        assert_eq!(cfg.http_addr, Some(addr));
    }

    #[test]
    fn node_config_with_categories_dedups_and_trims() {
        let cfg = NodeConfig::default().with_categories(["mail", " push ", "", "mail"]);
        assert_eq!(
            cfg.categories,
            vec![Category::from("mail"), Category::from("push")]
        );
    }
}
