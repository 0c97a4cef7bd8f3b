//! Shared context for both controllers

use std::time::Duration;

use super::index::DependencyIndex;
use super::retry::RetryTracker;
use super::store::{KubeStore, ObjectStore};

/// Default deadline for a single reconciliation attempt
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default periodic resync after a successful reconciliation
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Requeue delay for errors that will not fix themselves
pub const INVALID_SPEC_REQUEUE: Duration = Duration::from_secs(600);

/// Runtime settings for the controllers
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Restrict watches to a single namespace, `None` for cluster-wide
    pub namespace: Option<String>,
    pub reconcile_timeout: Duration,
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// State shared by the RestApi and Redis controllers
pub struct Context<S: ObjectStore = KubeStore> {
    pub store: S,
    pub index: DependencyIndex,
    pub retries: RetryTracker,
    pub config: ControllerConfig,
}

impl<S: ObjectStore> Context<S> {
    /// Build the context, registering an empty dependency index
    pub fn new(store: S, config: ControllerConfig) -> Self {
        Self {
            store,
            index: DependencyIndex::new(),
            retries: RetryTracker::new(),
            config,
        }
    }
}
