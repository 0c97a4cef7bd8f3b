//! guestbook-operator: Kubernetes operator for the guestbook application
//!
//! This crate provides two cooperating controllers: one for the `Redis`
//! leader/follower cache and one for the `RestApi` frontend that depends on it.

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
