//! Application Layer
//!
//! Use cases that orchestrate domain services over the outbound ports.

mod reconciler;

pub use reconciler::{LoadBalancerReconciler, VipNetwork, DEFAULT_APPLICATION_PROFILE};
