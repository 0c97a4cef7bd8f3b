//! Controller module for RestApi and Redis reconciliation
//!
//! This module contains the two reconcilers, the dependency index that links
//! them, the child resource builders and the controller runtime wiring.

mod child;
pub mod conditions;
mod context;
pub mod index;
#[cfg(test)]
mod memory_store;
#[cfg(feature = "metrics")]
pub mod metrics;
mod redis_reconciler;
pub mod resources;
mod rest_api_reconciler;
mod retry;
mod runner;
mod status;
mod store;

pub use child::{controller_owner, owner_key, ChildObject};
pub use context::{
    Context, ControllerConfig, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_RESYNC_INTERVAL,
    INVALID_SPEC_REQUEUE,
};
pub use index::{dependency_of, DependencyIndex};
pub use redis_reconciler::{desired_children, reconcile_redis};
pub use rest_api_reconciler::{reconcile_rest_api, resolve_dependency};
pub use retry::{calculate_backoff, RetryTracker};
pub use runner::{
    backoff_for, forget_object, requests_for_child, requests_for_redis, run_attempt, run_controllers,
    scoped_api, REDIS_CONTROLLER, REST_API_CONTROLLER,
};
pub use status::{redis_status, rest_api_status, url_for_service};
pub use store::{KubeStore, ObjectKey, ObjectStore, StoredObject, FIELD_MANAGER};
