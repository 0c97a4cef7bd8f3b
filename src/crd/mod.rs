//! Custom Resource Definitions for the guestbook operator
//!
//! `RestApi` is the frontend tier and `Redis` the replicated cache it depends on.

use kube::CustomResourceExt;

mod redis;
mod rest_api;
pub mod types;


pub use redis::{Redis, RedisSpec, RedisStatus, DEFAULT_FOLLOWER_REPLICAS};
pub use rest_api::{
    FrontendSpec, RestApi, RestApiSpec, RestApiStatus, DEFAULT_FRONTEND_REPLICAS,
    DEFAULT_SERVING_PORT,
};
pub use types::*;

/// Both CRDs as a multi-document YAML stream, ready for `kubectl apply -f -`
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let rest_api = serde_yaml::to_string(&RestApi::crd())?;
    let redis = serde_yaml::to_string(&Redis::crd())?;
    Ok(format!("{}---\n{}", rest_api, redis))
}
