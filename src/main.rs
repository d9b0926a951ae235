//! vcloud-lb - Load balancer reconciliation for vCloud Director
//!
//! This is the composition root that wires together all the components and
//! runs one reconciliation request.

use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use vcloud_lb::config::load_config;
use vcloud_lb::{KeyedLock, LoadBalancerReconciler, Node, Service, SessionCache, VcdApi};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Ensure,
    Update,
    Delete,
    Get,
}

/// One reconciliation request, read from the file named on the command line.
#[derive(Debug, Deserialize)]
struct Request {
    action: Action,
    service: Service,
    #[serde(default)]
    nodes: Vec<Node>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting vcloud-lb cluster={} edge={} href={}",
        cfg.cluster_name,
        cfg.edge_gateway,
        cfg.href
    );

    let path = std::env::args()
        .nth(1)
        .context("usage: vcloud-lb <request.json>")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading request file {}", path))?;
    let request: Request =
        serde_json::from_str(&raw).with_context(|| format!("parsing request file {}", path))?;

    // ===== COMPOSITION ROOT =====

    let sessions = Arc::new(SessionCache::new(cfg.session_validity()));
    let api = Arc::new(VcdApi::new(cfg.vcd(), sessions.clone())?);
    api.connect()
        .await
        .context("failed to connect to vCloud Director")?;

    let reconciler = LoadBalancerReconciler::new(
        api.clone(),
        Arc::new(KeyedLock::new()),
        cfg.vip_network(),
    );

    let cluster = cfg.cluster_name.as_str();
    let service = &request.service;
    let name = reconciler.get_load_balancer_name(cluster, service);

    let status = match request.action {
        Action::Ensure => Some(
            reconciler
                .ensure_load_balancer(cluster, service, &request.nodes)
                .await?,
        ),
        Action::Update => {
            reconciler
                .update_load_balancer(cluster, service, &request.nodes)
                .await?;
            reconciler.get_load_balancer(cluster, service).await?
        }
        Action::Delete => {
            reconciler
                .ensure_load_balancer_deleted(cluster, service)
                .await?;
            None
        }
        Action::Get => reconciler.get_load_balancer(cluster, service).await?,
    };

    tracing::debug!("served {} requests from cached sessions", sessions.served_count());

    let output = serde_json::json!({
        "name": name,
        "exists": status.is_some(),
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
