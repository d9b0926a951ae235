//! Domain Entities - Core business objects
//!
//! Two families live here: the remote load-balancer resources we reconcile
//! (pools, members, virtual servers, firewall rules) and the cluster-side
//! projections that describe what should exist (services and nodes).

use crate::domain::value_objects::{Fingerprint, LbAlgorithm, LbProtocol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Label marking a node as eligible to receive load-balanced traffic.
pub const WORKER_NODE_LABEL: &str = "node-role.kubernetes.io/worker";

// ===== Credentials & Sessions =====

/// Credentials and target of the remote backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub org: String,
    /// Base URL of the vCloud Director endpoint
    pub href: String,
    pub vdc: String,
}

impl Credentials {
    /// Fingerprint used as the session cache key.
    ///
    /// Field order is part of the key: user, password, vdc, org, href.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&[
            &self.user,
            &self.password,
            &self.vdc,
            &self.org,
            &self.href,
        ])
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("org", &self.org)
            .field("href", &self.href)
            .field("vdc", &self.vdc)
            .finish()
    }
}

/// Opaque handle of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Value of the `x-vcloud-authorization` header
    pub token: String,
    /// API version negotiated for this session
    pub api_version: String,
}

// ===== Remote Load-Balancer Resources =====

/// A backend endpoint inside a pool.
///
/// Equality ignores `id`: the remote side assigns it, and a member we build
/// locally never has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub monitor_port: u16,
    pub weight: u32,
    pub min_conn: u32,
    pub max_conn: u32,
    pub condition: String,
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ip_address == other.ip_address
            && self.port == other.port
            && self.monitor_port == other.monitor_port
            && self.weight == other.weight
            && self.min_conn == other.min_conn
            && self.max_conn == other.max_conn
            && self.condition == other.condition
    }
}

impl Eq for Member {}

/// A named group of members behind one or more virtual servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub algorithm: LbAlgorithm,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Pool {
    /// True if an equal member (ignoring ids) is already part of the pool.
    pub fn contains_member(&self, member: &Member) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

/// Application profile referenced by virtual servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationProfile {
    pub id: String,
    pub name: String,
}

/// Load-balancer frontend binding address, port and protocol to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub ip_address: String,
    pub protocol: LbProtocol,
    pub port: u16,
    #[serde(default)]
    pub connection_limit: u32,
    #[serde(default)]
    pub connection_rate_limit: u32,
    pub application_profile_id: String,
    pub default_pool_id: String,
}

fn enabled_by_default() -> bool {
    true
}

/// Source or destination of a firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FirewallEndpoint {
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

impl FirewallEndpoint {
    pub fn any() -> Self {
        Self {
            ip_addresses: vec!["any".to_string()],
        }
    }

    pub fn address(ip: &str) -> Self {
        Self {
            ip_addresses: vec![ip.to_string()],
        }
    }
}

/// One protocol/port pair permitted by a firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallService {
    pub protocol: String,
    pub port: String,
    pub source_port: String,
}

impl FirewallService {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "TCP".to_string(),
            port: port.to_string(),
            source_port: "any".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FirewallApplication {
    #[serde(default)]
    pub services: Vec<FirewallService>,
}

/// Perimeter firewall rule on the edge gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub rule_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub logging_enabled: bool,
    #[serde(default)]
    pub source: FirewallEndpoint,
    #[serde(default)]
    pub destination: FirewallEndpoint,
    #[serde(default)]
    pub application: FirewallApplication,
}

// ===== Cluster Projections =====

/// A port declared by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default)]
    pub name: Option<String>,
    pub port: u16,
    pub node_port: u16,
    #[serde(default = "default_port_protocol")]
    pub protocol: String,
}

fn default_port_protocol() -> String {
    "TCP".to_string()
}

/// A cluster service of type LoadBalancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Service {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeAddressType {
    #[serde(rename = "InternalIP")]
    InternalIp,
    #[serde(rename = "ExternalIP")]
    ExternalIp,
    Hostname,
    #[serde(rename = "InternalDNS")]
    InternalDns,
    #[serde(rename = "ExternalDNS")]
    ExternalDns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: NodeAddressType,
    pub address: String,
}

/// A cluster node that may back a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

impl Node {
    /// Workers are labelled `node-role.kubernetes.io/worker=true`.
    pub fn is_worker(&self) -> bool {
        self.labels.get(WORKER_NODE_LABEL).map(String::as_str) == Some("true")
    }

    /// Host address of the node: the first internal IP, else the first
    /// external IP.
    pub fn host_ip(&self) -> Option<IpAddr> {
        self.first_address(NodeAddressType::InternalIp)
            .or_else(|| self.first_address(NodeAddressType::ExternalIp))
    }

    fn first_address(&self, kind: NodeAddressType) -> Option<IpAddr> {
        self.addresses
            .iter()
            .filter(|a| a.kind == kind)
            .find_map(|a| a.address.parse().ok())
    }
}

// ===== Status =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerIngress {
    pub ip: String,
}

/// Observed state of a load balancer, one ingress entry per service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoadBalancerStatus {
    pub ingress: Vec<LoadBalancerIngress>,
}
