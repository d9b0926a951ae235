//! Load Balancer Reconciler - Main application use case
//!
//! Drives the remote edge gateway towards the state a service asks for:
//! one pool and one virtual server per service port, plus a firewall rule
//! for externally exposed services. Every step is fetch-or-create or
//! append-only, so a failed pass converges when it is retried.

use crate::domain::entities::{
    FirewallApplication, FirewallEndpoint, FirewallRule, FirewallService, LoadBalancerIngress,
    LoadBalancerStatus, Member, Node, Pool, Service, VirtualServer,
};
use crate::domain::errors::{ApiError, LbError};
use crate::domain::ports::LoadBalancerApi;
use crate::domain::services::{membership, naming, AddressAllocator, ServiceIntent};
use crate::domain::value_objects::{ExposureMode, LbProtocol, Lookup};
use crate::infrastructure::KeyedLock;
use std::sync::Arc;

/// Application profile every virtual server is bound to.
pub const DEFAULT_APPLICATION_PROFILE: &str = "ingress";

/// Org network that internal virtual IPs are allocated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipNetwork {
    pub name: String,
    pub cidr: String,
}

/// Reconciliation engine for service load balancers.
pub struct LoadBalancerReconciler {
    api: Arc<dyn LoadBalancerApi>,
    locks: Arc<KeyedLock>,
    network: Option<VipNetwork>,
    application_profile: String,
}

/// Validated input of an ensure or update pass.
struct Plan {
    intent: ServiceIntent,
    /// Desired members, one entry per declared port
    members: Vec<Vec<Member>>,
}

impl LoadBalancerReconciler {
    pub fn new(
        api: Arc<dyn LoadBalancerApi>,
        locks: Arc<KeyedLock>,
        network: Option<VipNetwork>,
    ) -> Self {
        Self {
            api,
            locks,
            network,
            application_profile: DEFAULT_APPLICATION_PROFILE.to_string(),
        }
    }

    pub fn with_application_profile(mut self, name: impl Into<String>) -> Self {
        self.application_profile = name.into();
        self
    }

    /// Canonical load balancer name of a service.
    pub fn get_load_balancer_name(&self, cluster: &str, service: &Service) -> String {
        naming::load_balancer_name(cluster, &service.namespace, &service.name)
    }

    /// Create whatever is missing for `service` and return its status.
    ///
    /// All validation happens before the first remote call.
    pub async fn ensure_load_balancer(
        &self,
        cluster: &str,
        service: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus, LbError> {
        let plan = Self::plan(service, nodes)?;
        if plan.intent.exposure == ExposureMode::Internal && self.network.is_none() {
            return Err(missing_network());
        }
        let name = self.get_load_balancer_name(cluster, service);

        let _guard = self.locks.scoped(&name).await;
        tracing::info!(
            "ensuring load balancer {} ({} ports, {:?})",
            name,
            service.ports.len(),
            plan.intent.exposure
        );

        let mut virtual_ip: Option<String> = plan.intent.external_ip.map(|ip| ip.to_string());
        let mut profile_id: Option<String> = None;
        let mut status = LoadBalancerStatus::default();

        for (port, desired) in service.ports.iter().zip(plan.members) {
            let pool_name =
                naming::pool_name(cluster, &service.namespace, &service.name, port.node_port);
            let pool = self.ensure_pool(&pool_name, &plan.intent).await?;
            let pool = self.sync_members(pool, desired).await?;
            let pool_id = pool.id.ok_or_else(|| missing_id("pool", &pool_name))?;

            let server_name = naming::virtual_server_name(&name, port.node_port);
            let server = match self.find_virtual_server(&server_name).await? {
                Lookup::Found(server) => server,
                Lookup::NotFound => {
                    let ip = match &virtual_ip {
                        Some(ip) => ip.clone(),
                        None => self.allocate_virtual_ip().await?,
                    };
                    let profile = match &profile_id {
                        Some(id) => id.clone(),
                        None => self.application_profile_id().await?,
                    };
                    profile_id = Some(profile.clone());

                    tracing::info!("creating virtual server {} on {}:{}", server_name, ip, port.port);
                    self.api
                        .create_virtual_server(&VirtualServer {
                            id: None,
                            name: server_name.clone(),
                            description: naming::VIRTUAL_SERVER_DESCRIPTION.to_string(),
                            enabled: true,
                            ip_address: ip,
                            protocol: LbProtocol::Http,
                            port: port.port,
                            connection_limit: 0,
                            connection_rate_limit: 0,
                            application_profile_id: profile,
                            default_pool_id: pool_id,
                        })
                        .await
                        .map_err(LbError::remote(format!(
                            "creating virtual server {}",
                            server_name
                        )))?
                }
            };

            // Later ports share the address of the first virtual server
            virtual_ip.get_or_insert_with(|| server.ip_address.clone());
            status.ingress.push(LoadBalancerIngress {
                ip: server.ip_address,
            });
        }

        if plan.intent.exposure == ExposureMode::External {
            if let Some(last) = status.ingress.last() {
                self.ensure_firewall_rule(&name, service, &last.ip).await?;
            }
        }

        Ok(status)
    }

    /// Add members for new eligible nodes to every existing pool.
    ///
    /// Pools must already exist; virtual servers and firewall rules are
    /// left alone.
    pub async fn update_load_balancer(
        &self,
        cluster: &str,
        service: &Service,
        nodes: &[Node],
    ) -> Result<(), LbError> {
        let plan = Self::plan(service, nodes)?;
        let name = self.get_load_balancer_name(cluster, service);

        let _guard = self.locks.scoped(&name).await;
        tracing::info!("updating load balancer {}", name);

        for (port, desired) in service.ports.iter().zip(plan.members) {
            let pool_name =
                naming::pool_name(cluster, &service.namespace, &service.name, port.node_port);
            let pool = match self.get_pool(&pool_name).await? {
                Lookup::Found(pool) => pool,
                Lookup::NotFound => return Err(LbError::not_found("pool", pool_name)),
            };
            self.sync_members(pool, desired).await?;
        }

        Ok(())
    }

    /// Delete the virtual servers, pools and firewall rule of `service`.
    ///
    /// Virtual servers and pools must exist; a missing firewall rule is
    /// fine.
    pub async fn ensure_load_balancer_deleted(
        &self,
        cluster: &str,
        service: &Service,
    ) -> Result<(), LbError> {
        let name = self.get_load_balancer_name(cluster, service);

        let _guard = self.locks.scoped(&name).await;
        tracing::info!("deleting load balancer {}", name);

        for port in &service.ports {
            let server_name = naming::virtual_server_name(&name, port.node_port);
            let server = match self.find_virtual_server(&server_name).await? {
                Lookup::Found(server) => server,
                Lookup::NotFound => return Err(LbError::not_found("virtual server", server_name)),
            };
            let id = server.id.ok_or_else(|| missing_id("virtual server", &server_name))?;
            self.api
                .delete_virtual_server(&id)
                .await
                .map_err(LbError::remote(format!("deleting virtual server {}", server_name)))?;
            tracing::debug!("deleted virtual server {}", server_name);
        }

        for port in &service.ports {
            let pool_name =
                naming::pool_name(cluster, &service.namespace, &service.name, port.node_port);
            let pool = match self.get_pool(&pool_name).await? {
                Lookup::Found(pool) => pool,
                Lookup::NotFound => return Err(LbError::not_found("pool", pool_name)),
            };
            let id = pool.id.ok_or_else(|| missing_id("pool", &pool_name))?;
            self.api
                .delete_pool(&id)
                .await
                .map_err(LbError::remote(format!("deleting pool {}", pool_name)))?;
            tracing::debug!("deleted pool {}", pool_name);
        }

        if let Lookup::Found(rule) = self.find_firewall_rule(&name).await? {
            let id = rule.id.ok_or_else(|| missing_id("firewall rule", &name))?;
            self.api
                .delete_firewall_rule(&id)
                .await
                .map_err(LbError::remote(format!("deleting firewall rule {}", name)))?;
            tracing::debug!("deleted firewall rule {}", name);
        }

        Ok(())
    }

    /// Current status, or `None` if any port lacks its virtual server.
    pub async fn get_load_balancer(
        &self,
        cluster: &str,
        service: &Service,
    ) -> Result<Option<LoadBalancerStatus>, LbError> {
        if service.ports.is_empty() {
            return Ok(None);
        }

        let name = self.get_load_balancer_name(cluster, service);
        let servers = self
            .api
            .list_virtual_servers()
            .await
            .map_err(LbError::remote("listing virtual servers"))?;

        let mut status = LoadBalancerStatus::default();
        for port in &service.ports {
            let server_name = naming::virtual_server_name(&name, port.node_port);
            match servers.iter().find(|s| s.name == server_name) {
                Some(server) => status.ingress.push(LoadBalancerIngress {
                    ip: server.ip_address.clone(),
                }),
                None => {
                    tracing::debug!("virtual server {} not found", server_name);
                    return Ok(None);
                }
            }
        }

        Ok(Some(status))
    }

    // ===== Steps =====

    fn plan(service: &Service, nodes: &[Node]) -> Result<Plan, LbError> {
        if nodes.is_empty() {
            return Err(LbError::Configuration(format!(
                "there are no available nodes for LoadBalancer service {}/{}",
                service.namespace, service.name
            )));
        }
        if service.ports.is_empty() {
            return Err(LbError::Configuration(format!(
                "service {}/{} declares no ports",
                service.namespace, service.name
            )));
        }

        let intent = ServiceIntent::from_service(service)?;
        let members = service
            .ports
            .iter()
            .map(|port| membership::desired_members(port, &intent, nodes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plan { intent, members })
    }

    async fn get_pool(&self, name: &str) -> Result<Lookup<Pool>, LbError> {
        self.api
            .get_pool(name)
            .await
            .map_err(LbError::remote(format!("fetching pool {}", name)))
    }

    async fn ensure_pool(&self, name: &str, intent: &ServiceIntent) -> Result<Pool, LbError> {
        if let Lookup::Found(pool) = self.get_pool(name).await? {
            return Ok(pool);
        }

        tracing::info!("creating pool {} ({})", name, intent.algorithm);
        self.api
            .create_pool(&Pool {
                id: None,
                name: name.to_string(),
                description: naming::POOL_DESCRIPTION.to_string(),
                algorithm: intent.algorithm,
                transparent: false,
                members: Vec::new(),
            })
            .await
            .map_err(LbError::remote(format!("creating pool {}", name)))
    }

    /// Append missing members and push the pool only when it changed.
    async fn sync_members(&self, mut pool: Pool, desired: Vec<Member>) -> Result<Pool, LbError> {
        let added = membership::merge_members(&mut pool, desired);
        if added == 0 {
            return Ok(pool);
        }

        tracing::info!("adding {} members to pool {}", added, pool.name);
        let name = pool.name.clone();
        self.api
            .update_pool(&pool)
            .await
            .map_err(LbError::remote(format!("updating pool {}", name)))
    }

    async fn find_virtual_server(&self, name: &str) -> Result<Lookup<VirtualServer>, LbError> {
        let servers = self
            .api
            .list_virtual_servers()
            .await
            .map_err(LbError::remote("listing virtual servers"))?;
        Ok(Lookup::from_option(
            servers.into_iter().find(|s| s.name == name),
        ))
    }

    async fn find_firewall_rule(&self, name: &str) -> Result<Lookup<FirewallRule>, LbError> {
        let rules = self
            .api
            .list_firewall_rules()
            .await
            .map_err(LbError::remote("listing firewall rules"))?;
        Ok(Lookup::from_option(rules.into_iter().find(|r| r.name == name)))
    }

    async fn application_profile_id(&self) -> Result<String, LbError> {
        let lookup = self
            .api
            .find_application_profile(&self.application_profile)
            .await
            .map_err(LbError::remote("fetching application profiles"))?;
        match lookup {
            Lookup::Found(profile) => Ok(profile.id),
            Lookup::NotFound => Err(LbError::not_found(
                "application profile",
                self.application_profile.clone(),
            )),
        }
    }

    /// Lowest free address of the configured org network.
    async fn allocate_virtual_ip(&self) -> Result<String, LbError> {
        let network = self.network.as_ref().ok_or_else(missing_network)?;

        let allocated = self
            .api
            .list_allocated_addresses(&network.name)
            .await
            .map_err(LbError::remote(format!(
                "listing allocated addresses of {}",
                network.name
            )))?;
        let ip = AddressAllocator::next_free_address(&allocated, &network.cidr)?;
        tracing::debug!("allocated virtual IP {} from {}", ip, network.cidr);

        Ok(ip.to_string())
    }

    async fn ensure_firewall_rule(
        &self,
        name: &str,
        service: &Service,
        destination: &str,
    ) -> Result<(), LbError> {
        if self.find_firewall_rule(name).await?.is_found() {
            return Ok(());
        }

        tracing::info!("creating firewall rule {} for {}", name, destination);
        self.api
            .create_firewall_rule(&FirewallRule {
                id: None,
                name: name.to_string(),
                rule_type: "User".to_string(),
                action: "accept".to_string(),
                enabled: true,
                logging_enabled: false,
                source: FirewallEndpoint::any(),
                destination: FirewallEndpoint::address(destination),
                application: FirewallApplication {
                    services: service
                        .ports
                        .iter()
                        .map(|p| FirewallService::tcp(p.port))
                        .collect(),
                },
            })
            .await
            .map_err(LbError::remote(format!("creating firewall rule {}", name)))?;

        Ok(())
    }
}

fn missing_id(kind: &'static str, name: &str) -> LbError {
    LbError::Remote {
        context: format!("reading {} {}", kind, name),
        source: ApiError::Decode(format!("{} has no id", kind)),
    }
}

fn missing_network() -> LbError {
    LbError::Configuration(
        "VCLOUD_VDC_NETWORK_NAME and VCLOUD_VDC_NETWORK_IPNET must be set for internal load balancers"
            .to_string(),
    )
}
