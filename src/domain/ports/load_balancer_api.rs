//! Load Balancer API Port
//!
//! Defines the contract the reconciliation engine needs from the remote
//! edge gateway. Implementations may talk to vCloud Director over HTTP or
//! keep everything in memory for tests.

use crate::domain::entities::{ApplicationProfile, FirewallRule, Pool, VirtualServer};
use crate::domain::errors::ApiError;
use crate::domain::value_objects::Lookup;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Remote load-balancer, firewall and address-allocation operations.
///
/// This is an outbound port. Lookups by name return `Lookup::NotFound`
/// for a missing resource; `Err` is reserved for real failures.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// List every virtual server on the edge gateway.
    async fn list_virtual_servers(&self) -> Result<Vec<VirtualServer>, ApiError>;

    /// Find a server pool by name.
    async fn get_pool(&self, name: &str) -> Result<Lookup<Pool>, ApiError>;

    /// Create a pool and return it with its remote id.
    async fn create_pool(&self, pool: &Pool) -> Result<Pool, ApiError>;

    /// Replace a pool (including its member list).
    async fn update_pool(&self, pool: &Pool) -> Result<Pool, ApiError>;

    async fn delete_pool(&self, id: &str) -> Result<(), ApiError>;

    /// Find an application profile by name.
    async fn find_application_profile(
        &self,
        name: &str,
    ) -> Result<Lookup<ApplicationProfile>, ApiError>;

    async fn create_virtual_server(
        &self,
        server: &VirtualServer,
    ) -> Result<VirtualServer, ApiError>;

    async fn delete_virtual_server(&self, id: &str) -> Result<(), ApiError>;

    /// List every firewall rule on the edge gateway.
    async fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>, ApiError>;

    async fn create_firewall_rule(&self, rule: &FirewallRule) -> Result<FirewallRule, ApiError>;

    async fn delete_firewall_rule(&self, id: &str) -> Result<(), ApiError>;

    /// Addresses already allocated on an org network.
    async fn list_allocated_addresses(
        &self,
        network: &str,
    ) -> Result<HashSet<Ipv4Addr>, ApiError>;
}
