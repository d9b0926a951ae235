//! vcloud-lb Library
//!
//! Load balancer reconciliation for vCloud Director edge gateways. Exposed
//! as a library for the binary and for integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::{VcdApi, VcdConfig};
pub use application::{LoadBalancerReconciler, VipNetwork};
pub use config::load_config;
pub use domain::entities::{LoadBalancerStatus, Node, Service};
pub use domain::errors::{ApiError, LbError};
pub use domain::ports::{Authenticator, LoadBalancerApi};
pub use domain::services::AddressAllocator;
pub use infrastructure::{KeyedLock, SessionCache};
