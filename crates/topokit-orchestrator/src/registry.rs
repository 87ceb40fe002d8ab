//! Active node registry and join barrier.
//!
//! The registry records every node a provider launched during the run,
//! keyed by node name. It grows monotonically; nothing here removes an
//! entry. The multi-host provider writes to it from one task per node, so
//! all access goes through a single lock.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::container::NodeHandle;

#[derive(Debug, Default)]
struct Entries {
    handles: HashMap<String, NodeHandle>,
    failures: HashMap<String, String>,
    order: Vec<String>,
}

/// Registry of nodes launched by a provider.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Debug, Clone, Default)]
pub struct ActiveNodeRegistry {
    entries: Arc<RwLock<Entries>>,
}

impl ActiveNodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a launched node.
    pub async fn register(&self, name: impl Into<String>, handle: NodeHandle) {
        let name = name.into();
        let mut entries = self.entries.write().await;
        entries.failures.remove(&name);
        if entries.handles.insert(name.clone(), handle).is_none() {
            entries.order.push(name);
        }
    }

    /// Records a node whose launch failed, so waiters stop expecting it.
    pub async fn mark_failed(&self, name: impl Into<String>, reason: impl Into<String>) {
        let name = name.into();
        let mut entries = self.entries.write().await;
        if !entries.handles.contains_key(&name) {
            entries.failures.insert(name, reason.into());
        }
    }

    /// Gets the handle of a launched node.
    pub async fn get(&self, name: &str) -> Option<NodeHandle> {
        let entries = self.entries.read().await;
        entries.handles.get(name).cloned()
    }

    /// Gets the recorded launch failure of a node.
    pub async fn failure(&self, name: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.failures.get(name).cloned()
    }

    /// Returns the number of launched nodes.
    pub async fn len(&self) -> usize {
        self.entries.read().await.handles.len()
    }

    /// Returns true if no node has been launched.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.handles.is_empty()
    }

    /// Returns the names of launched nodes in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.order.clone()
    }

    /// Waits until every expected node has registered or failed.
    ///
    /// Polls on `config.poll_interval`. Gives up after `config.timeout` and
    /// reports the stragglers as missing.
    pub async fn wait_for(&self, expected: &[String], config: &BarrierConfig) -> BarrierOutcome {
        let deadline = Instant::now() + config.timeout;

        loop {
            let outcome = self.snapshot(expected).await;
            if outcome.missing.is_empty() {
                debug!(
                    registered = outcome.registered.len(),
                    failed = outcome.failed.len(),
                    "Join barrier released"
                );
                return outcome;
            }

            if Instant::now() >= deadline {
                warn!(
                    missing = ?outcome.missing,
                    timeout_secs = config.timeout.as_secs(),
                    "Join barrier timed out"
                );
                return outcome;
            }

            tokio::time::sleep(config.poll_interval).await;
        }
    }

    async fn snapshot(&self, expected: &[String]) -> BarrierOutcome {
        let entries = self.entries.read().await;
        let mut outcome = BarrierOutcome::default();

        for name in expected {
            if entries.handles.contains_key(name) {
                outcome.registered.push(name.clone());
            } else if let Some(reason) = entries.failures.get(name) {
                outcome.failed.insert(name.clone(), reason.clone());
            } else {
                outcome.missing.push(name.clone());
            }
        }
        outcome
    }
}

/// Polling parameters for [`ActiveNodeRegistry::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Interval between registry checks.
    pub poll_interval: Duration,

    /// Maximum time to wait.
    pub timeout: Duration,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Result of a join barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierOutcome {
    /// Nodes that registered, in expected order.
    pub registered: Vec<String>,

    /// Nodes whose launch failed, with the reason.
    pub failed: BTreeMap<String, String>,

    /// Nodes that neither registered nor failed before the timeout.
    pub missing: Vec<String>,
}

impl BarrierOutcome {
    /// Returns true if every expected node registered.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("node_{i}")).collect()
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ActiveNodeRegistry::new();
        assert!(registry.is_empty().await);

        registry
            .register("node_1", NodeHandle::new("c1", "/node_1"))
            .await;
        registry
            .register("node_2", NodeHandle::new("c2", "/node_2"))
            .await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get("node_1").await.unwrap().id, "c1");
        assert!(registry.get("node_3").await.is_none());
        assert_eq!(registry.names().await, vec!["node_1", "node_2"]);
    }

    #[tokio::test]
    async fn test_failure_is_cleared_by_registration() {
        let registry = ActiveNodeRegistry::new();
        registry.mark_failed("node_1", "boom").await;
        assert_eq!(registry.failure("node_1").await.as_deref(), Some("boom"));

        registry
            .register("node_1", NodeHandle::new("c1", "node_1"))
            .await;
        assert!(registry.failure("node_1").await.is_none());

        registry.mark_failed("node_1", "late").await;
        assert!(registry.failure("node_1").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_registration() {
        let registry = ActiveNodeRegistry::new();
        let expected = names(64);

        let tasks: Vec<_> = expected
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let registry = registry.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    registry
                        .register(name.clone(), NodeHandle::new(format!("c{i}"), name))
                        .await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, 64);
        let mut registered = registry.names().await;
        registered.sort();
        let mut want = expected.clone();
        want.sort();
        assert_eq!(registered, want);
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_waits_for_all() {
        let registry = ActiveNodeRegistry::new();
        let expected = names(3);

        for (i, name) in expected.iter().enumerate() {
            let registry = registry.clone();
            let name = name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2 * (i as u64 + 1))).await;
                registry.register(name.clone(), NodeHandle::new("c", name)).await;
            });
        }

        let start = Instant::now();
        let outcome = registry
            .wait_for(&expected, &BarrierConfig::default())
            .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.registered, expected);
        assert_eq!(registry.len().await, 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_releases_on_failure() {
        let registry = ActiveNodeRegistry::new();
        let expected = names(2);

        registry
            .register("node_1", NodeHandle::new("c1", "node_1"))
            .await;
        registry.mark_failed("node_2", "image missing").await;

        let outcome = registry
            .wait_for(&expected, &BarrierConfig::default())
            .await;
        assert_eq!(outcome.registered, vec!["node_1"]);
        assert_eq!(
            outcome.failed.get("node_2").map(String::as_str),
            Some("image missing")
        );
        assert!(outcome.missing.is_empty());
        assert!(!outcome.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_times_out_with_missing() {
        let registry = ActiveNodeRegistry::new();
        let expected = names(2);
        registry
            .register("node_1", NodeHandle::new("c1", "node_1"))
            .await;

        let config = BarrierConfig {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        };
        let start = Instant::now();
        let outcome = registry.wait_for(&expected, &config).await;

        assert_eq!(outcome.missing, vec!["node_2"]);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
