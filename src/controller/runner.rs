//! Controller wiring for RestApi and Redis
//!
//! Builds the two `kube::runtime` controllers, feeds the dependency index from
//! the RestApi watch stream and routes dependency and child events back to the
//! RestApis that need to be re-evaluated.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{predicates, reflector, watcher, Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::child::{owner_key, ChildObject};
use super::context::{Context, INVALID_SPEC_REQUEUE};
use super::index::DependencyIndex;
#[cfg(feature = "metrics")]
use super::metrics;
use super::redis_reconciler::reconcile_redis;
use super::resources::{MANAGED_BY, MANAGED_BY_LABEL};
use super::rest_api_reconciler::reconcile_rest_api;
use super::retry::calculate_backoff;
use super::store::{ObjectKey, ObjectStore};
use crate::crd::{Redis, RestApi};
use crate::error::{Error, Result};

/// Controller name used in logs, metrics and retry bookkeeping
pub const REST_API_CONTROLLER: &str = "restapi";
pub const REDIS_CONTROLLER: &str = "redis";

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Reflector-backed primary stream with status-only updates filtered out
fn filtered_stream<K, S>(
    writer: reflector::store::Writer<K>,
    events: S,
) -> impl Stream<Item = std::result::Result<K, watcher::Error>> + Send + 'static
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send + Sync,
    S: Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    reflector(writer, events)
        .applied_objects()
        .predicate_filter(predicates::generation)
}

/// RestApis to re-evaluate after a Redis changed
pub fn requests_for_redis(index: &DependencyIndex, redis: &Redis) -> Vec<ObjectRef<RestApi>> {
    let Some(key) = ObjectKey::from_resource(redis) else {
        return Vec::new();
    };
    let requests = index.requests_for(&key);
    debug!(redis = %key, dependents = requests.len(), "Fanning out Redis event");

    #[cfg(feature = "metrics")]
    metrics::inc_fanout_requests("Redis", requests.len());

    requests
}

/// RestApis to re-evaluate after one of the operator's children changed
///
/// Children of a RestApi map to that RestApi. Children of a Redis fan out to
/// every RestApi referencing the Redis. Anything else is ignored.
pub fn requests_for_child(
    index: &DependencyIndex,
    child: &ChildObject,
) -> Vec<ObjectRef<RestApi>> {
    let meta = child.meta();
    if let Some(owner) = owner_key::<RestApi>(meta) {
        return vec![ObjectRef::new(&owner.name).within(&owner.namespace)];
    }

    let Some(owner) = owner_key::<Redis>(meta) else {
        return Vec::new();
    };
    let requests = index.requests_for(&owner);
    debug!(
        child = child.name(),
        kind = child.kind(),
        redis = %owner,
        dependents = requests.len(),
        "Fanning out child event"
    );

    #[cfg(feature = "metrics")]
    metrics::inc_fanout_requests(child.kind(), requests.len());

    requests
}

/// Run one reconciliation attempt under the configured deadline
///
/// An attempt that outlives the deadline is cancelled and reported as a
/// retriable [`Error::Timeout`].
pub async fn run_attempt<S, F>(
    ctx: &Context<S>,
    controller: &'static str,
    key: &ObjectKey,
    attempt: F,
) -> Result<Action>
where
    S: ObjectStore,
    F: Future<Output = Result<Action>>,
{
    let started = Instant::now();
    let deadline = ctx.config.reconcile_timeout;

    let result = match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} reconciliation of {} exceeded {:?}", controller, key, deadline);
            Err(Error::Timeout(deadline))
        }
    };

    #[cfg(feature = "metrics")]
    metrics::observe_reconcile_duration_seconds(controller, started.elapsed().as_secs_f64());
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    if result.is_ok() {
        ctx.retries.reset(controller, key);
    }
    result
}

/// Requeue decision for a failed attempt
pub fn backoff_for<S: ObjectStore>(
    ctx: &Context<S>,
    controller: &'static str,
    key: Option<&ObjectKey>,
    error: &Error,
) -> Action {
    #[cfg(feature = "metrics")]
    metrics::inc_reconcile_error(controller, error.metric_label());

    if !error.is_retriable() {
        error!("{} reconciliation failed permanently: {}", controller, error);
        return Action::requeue(INVALID_SPEC_REQUEUE);
    }

    let delay = match key {
        Some(key) => ctx.retries.next_delay(controller, key),
        None => calculate_backoff(0, None, None),
    };
    warn!(
        "{} reconciliation failed, retrying in {:?}: {}",
        controller, delay, error
    );
    Action::requeue(delay)
}

fn object_key<K: Resource>(obj: &K) -> Result<ObjectKey> {
    ObjectKey::from_resource(obj)
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))
}

async fn reconcile_rest_api_object(api: Arc<RestApi>, ctx: Arc<Context>) -> Result<Action> {
    let ctx: &Context = &ctx;
    let key = object_key(api.as_ref())?;
    run_attempt(ctx, REST_API_CONTROLLER, &key, reconcile_rest_api(ctx, &key)).await
}

async fn reconcile_redis_object(redis: Arc<Redis>, ctx: Arc<Context>) -> Result<Action> {
    let ctx: &Context = &ctx;
    let key = object_key(redis.as_ref())?;
    run_attempt(ctx, REDIS_CONTROLLER, &key, reconcile_redis(ctx, &key)).await
}

fn rest_api_error_policy(api: Arc<RestApi>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::from_resource(api.as_ref());
    backoff_for(&ctx, REST_API_CONTROLLER, key.as_ref(), error)
}

fn redis_error_policy(redis: Arc<Redis>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::from_resource(redis.as_ref());
    backoff_for(&ctx, REDIS_CONTROLLER, key.as_ref(), error)
}

/// Fail early when a CRD has not been installed
async fn ensure_crd<K>(api: &Api<K>) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug,
{
    let kind = K::kind(&());
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => {
            info!("{} CRD is available", kind);
            Ok(())
        }
        Err(e) => {
            error!("{} CRD not found. Please install the CRD first: {:?}", kind, e);
            Err(Error::ConfigError(format!("{} CRD not installed", kind)))
        }
    }
}

type ControllerResult<K> = std::result::Result<
    (ObjectRef<K>, Action),
    kube::runtime::controller::Error<Error, watcher::Error>,
>;

/// Drop the retry history of an object that no longer exists
pub fn forget_object<S: ObjectStore, K: Resource>(
    ctx: &Context<S>,
    controller: &'static str,
    obj: &ObjectRef<K>,
) {
    let Some(namespace) = obj.namespace.as_deref() else {
        return;
    };
    ctx.retries
        .reset(controller, &ObjectKey::new(namespace, obj.name.as_str()));
}

fn log_result<K: Resource>(ctx: &Context, controller: &'static str, res: ControllerResult<K>) {
    match res {
        Ok((obj, _action)) => debug!("{} reconciled {}", controller, obj.name),
        Err(kube::runtime::controller::Error::ObjectNotFound(obj)) => {
            debug!("{} object no longer exists: {}", controller, obj.name);
            forget_object(ctx, controller, &obj);
        }
        Err(kube::runtime::controller::Error::ReconcilerFailed(err, obj)) if err.is_not_found() => {
            debug!("{} object {} deleted mid-reconcile: {}", controller, obj.name, err)
        }
        Err(e) => warn!("{} reconcile error: {}", controller, e),
    }
}

/// Run both controllers until a shutdown signal arrives
pub async fn run_controllers(ctx: Arc<Context>) -> Result<()> {
    let client = ctx.store.client().clone();
    let namespace = ctx.config.namespace.clone();
    let scope = namespace.as_deref();

    info!(
        "Starting guestbook controllers (scope: {})",
        scope.unwrap_or("cluster-wide")
    );

    let rest_apis: Api<RestApi> = scoped_api(client.clone(), scope);
    let redises: Api<Redis> = scoped_api(client.clone(), scope);
    ensure_crd(&rest_apis).await?;
    ensure_crd(&redises).await?;

    let watcher_config = WatcherConfig::default();
    let children_config =
        WatcherConfig::default().labels(&format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY));

    // The index sees every RestApi event before the controller does
    let index = ctx.index.clone();
    let (rest_api_reader, rest_api_writer) = reflector::store();
    let rest_api_events = watcher(rest_apis, watcher_config.clone())
        .default_backoff()
        .inspect_ok(move |event| index.observe(event));
    let rest_api_stream = filtered_stream(rest_api_writer, rest_api_events);

    let (redis_reader, redis_writer) = reflector::store();
    let redis_events = watcher(redises.clone(), watcher_config.clone()).default_backoff();
    let redis_stream = filtered_stream(redis_writer, redis_events);

    let redis_index = ctx.index.clone();
    let deployment_index = ctx.index.clone();
    let service_index = ctx.index.clone();
    let frontend_ctx = ctx.clone();
    let backend_ctx = ctx.clone();

    let frontend = Controller::for_stream(rest_api_stream, rest_api_reader)
        .watches(redises, watcher_config.clone(), move |redis: Redis| {
            requests_for_redis(&redis_index, &redis)
        })
        .watches(
            scoped_api::<Deployment>(client.clone(), scope),
            children_config.clone(),
            move |deployment: Deployment| {
                requests_for_child(&deployment_index, &ChildObject::from(deployment))
            },
        )
        .watches(
            scoped_api::<Service>(client.clone(), scope),
            children_config.clone(),
            move |service: Service| requests_for_child(&service_index, &ChildObject::from(service)),
        )
        .shutdown_on_signal()
        .run(reconcile_rest_api_object, rest_api_error_policy, ctx.clone())
        .for_each(|res| {
            log_result(&frontend_ctx, REST_API_CONTROLLER, res);
            futures::future::ready(())
        });

    let backend = Controller::for_stream(redis_stream, redis_reader)
        .owns(scoped_api::<Deployment>(client.clone(), scope), children_config.clone())
        .owns(scoped_api::<Service>(client, scope), children_config)
        .shutdown_on_signal()
        .run(reconcile_redis_object, redis_error_policy, ctx.clone())
        .for_each(|res| {
            log_result(&backend_ctx, REDIS_CONTROLLER, res);
            futures::future::ready(())
        });

    futures::join!(frontend, backend);

    ctx.index.clear();
    info!("Guestbook controllers stopped");

    Ok(())
}
