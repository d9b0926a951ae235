//! Resource naming
//!
//! Remote resources are found again by name on every pass, so names must be
//! a pure function of cluster, namespace, service and port.

use std::net::IpAddr;

/// vCloud rejects names longer than this.
pub const MAX_NAME_LEN: usize = 255;

pub const POOL_DESCRIPTION: &str =
    "This Pool was automatically created and managed by vcloud-lb";
pub const VIRTUAL_SERVER_DESCRIPTION: &str =
    "This Service was automatically created and managed by vcloud-lb";

/// Cut `name` to at most `MAX_NAME_LEN` bytes on a character boundary.
pub fn truncate_name(name: String) -> String {
    truncate_to(name, MAX_NAME_LEN)
}

fn truncate_to(mut name: String, max: usize) -> String {
    if name.len() > max {
        let mut end = max;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Canonical load balancer name of a service.
pub fn load_balancer_name(cluster: &str, namespace: &str, service: &str) -> String {
    truncate_name(format!("kube_service_{}_{}_{}", cluster, namespace, service))
}

/// Name of the pool backing one service port.
pub fn pool_name(cluster: &str, namespace: &str, service: &str, node_port: u16) -> String {
    truncate_name(format!(
        "kube_pool_{}_{}_{}_{}",
        cluster, namespace, service, node_port
    ))
}

/// Name of the virtual server for one service port.
///
/// The load balancer name is shortened so the port suffix always survives.
pub fn virtual_server_name(load_balancer: &str, node_port: u16) -> String {
    let suffix = format!("-{}", node_port);
    let mut name = truncate_to(load_balancer.to_string(), MAX_NAME_LEN - suffix.len());
    name.push_str(&suffix);
    name
}

/// Member names may only hold letters, digits, dashes and underscores, and
/// must start with a letter.
pub fn member_name(ip: &IpAddr, node_port: u16) -> String {
    let compact: String = ip
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("member-{}-{}", compact, node_port)
}
