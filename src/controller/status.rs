//! Status derivation for RestApi and Redis

use k8s_openapi::api::core::v1::Service;

use super::conditions::{
    set_condition, CONDITION_TYPE_READY, REASON_AWAITING_EXTERNAL_ADDRESS,
    REASON_DEPENDENCY_PENDING, REASON_RECONCILED,
};
use crate::crd::{ConditionStatus, RedisStatus, RestApiStatus, StatusCondition};

/// Externally reachable URL of a Service
///
/// Returns an empty string until the load balancer reports an ingress point.
/// The first ingress wins; its hostname is preferred over its IP.
pub fn url_for_service(service: &Service, port: i32) -> String {
    let Some(ingress) = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
    else {
        return String::new();
    };

    let host = ingress
        .hostname
        .as_deref()
        .filter(|h| !h.is_empty())
        .or_else(|| ingress.ip.as_deref().filter(|ip| !ip.is_empty()));

    match host {
        Some(host) if host.contains(':') => format!("http://[{}]:{}", host, port),
        Some(host) => format!("http://{}:{}", host, port),
        None => String::new(),
    }
}

/// Status to publish for a RestApi after its children were applied
pub fn rest_api_status(
    previous: &[StatusCondition],
    url: String,
    dependency_ready: bool,
) -> RestApiStatus {
    let mut conditions = previous.to_vec();

    let (status, reason, message) = if !dependency_ready {
        (
            ConditionStatus::Unknown,
            REASON_DEPENDENCY_PENDING,
            "Redis has not published its service endpoints yet".to_string(),
        )
    } else if url.is_empty() {
        (
            ConditionStatus::Unknown,
            REASON_AWAITING_EXTERNAL_ADDRESS,
            "Service has no external address yet".to_string(),
        )
    } else {
        (
            ConditionStatus::Healthy,
            REASON_RECONCILED,
            format!("Serving at {}", url),
        )
    };
    set_condition(&mut conditions, CONDITION_TYPE_READY, status, reason, &message);

    RestApiStatus { url, conditions }
}

/// Status to publish for a Redis after its children were applied
pub fn redis_status(
    previous: &[StatusCondition],
    leader_service: String,
    follower_service: String,
) -> RedisStatus {
    let mut conditions = previous.to_vec();
    set_condition(
        &mut conditions,
        CONDITION_TYPE_READY,
        ConditionStatus::Healthy,
        REASON_RECONCILED,
        "Leader and follower resources applied",
    );

    RedisStatus {
        leader_service,
        follower_service,
        conditions,
    }
}
