//! Pool membership
//!
//! Builds the members a pool should have and merges them into the remote
//! pool. Merging only appends: members are never removed here.

use crate::domain::entities::{Member, Node, Pool, ServicePort};
use crate::domain::errors::LbError;
use crate::domain::services::annotations::ServiceIntent;
use crate::domain::services::naming;

/// Build the member for one node and one service port.
///
/// Fails if the node has no usable host address.
pub fn build_member(
    port: &ServicePort,
    intent: &ServiceIntent,
    node: &Node,
) -> Result<Member, LbError> {
    let ip = node.host_ip().ok_or_else(|| LbError::NodeAddress {
        node: node.name.clone(),
    })?;

    Ok(Member {
        id: None,
        name: naming::member_name(&ip, port.node_port),
        ip_address: ip.to_string(),
        port: port.node_port,
        monitor_port: port.port,
        weight: 1,
        min_conn: intent.min_conn,
        max_conn: intent.max_conn,
        condition: "enabled".to_string(),
    })
}

/// Members for every worker node, in node order.
///
/// Non-worker nodes are skipped. A worker without an address aborts the
/// whole computation.
pub fn desired_members(
    port: &ServicePort,
    intent: &ServiceIntent,
    nodes: &[Node],
) -> Result<Vec<Member>, LbError> {
    nodes
        .iter()
        .filter(|n| n.is_worker())
        .map(|n| build_member(port, intent, n))
        .collect()
}

/// Append every desired member the pool lacks. Returns how many were added.
pub fn merge_members(pool: &mut Pool, desired: Vec<Member>) -> usize {
    let mut added = 0;
    for member in desired {
        if !pool.contains_member(&member) {
            pool.members.push(member);
            added += 1;
        }
    }
    added
}
