//! vCloud Director Load Balancer API
//!
//! Implements LoadBalancerApi and Authenticator against the vCloud
//! Director REST API and the NSX edge gateway endpoints it proxies.
//! Sessions come from the shared SessionCache; a rejected session is
//! refreshed once per request.

use crate::domain::entities::{
    ApplicationProfile, Credentials, FirewallRule, Pool, SessionHandle, VirtualServer,
};
use crate::domain::errors::ApiError;
use crate::domain::ports::{Authenticator, LoadBalancerApi};
use crate::domain::value_objects::Lookup;
use crate::infrastructure::{Session, SessionCache};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const AUTH_HEADER: &str = "x-vcloud-authorization";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_API_VERSION: &str = "31.0";

// ===== Wire Types =====

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    record: Vec<QueryRecord>,
}

#[derive(Debug, Deserialize)]
struct QueryRecord {
    name: String,
    href: String,
}

// Listed entries stay raw until picked: the edge also holds resources this
// crate never created, and they need not match the domain types.

#[derive(Debug, Deserialize)]
struct PoolList {
    #[serde(default)]
    pool: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualServerList {
    #[serde(default)]
    virtual_server: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationProfileList {
    #[serde(default)]
    application_profile: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirewallRuleList<T> {
    #[serde(default)]
    firewall_rules: Vec<T>,
}

/// Decode every entry of a listing, skipping the ones that do not parse.
fn decode_entries<T: DeserializeOwned>(kind: &str, entries: Vec<Value>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry_name(&entry).unwrap_or("?").to_string();
            match serde_json::from_value(entry) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::debug!("skipping unreadable {} {}: {}", kind, name, e);
                    None
                }
            }
        })
        .collect()
}

/// Strictly decode the entry called `name`, ignoring every other entry.
fn decode_named<T: DeserializeOwned>(
    kind: &str,
    entries: Vec<Value>,
    name: &str,
) -> Result<Lookup<T>, ApiError> {
    match entries.into_iter().find(|e| entry_name(e) == Some(name)) {
        Some(entry) => serde_json::from_value(entry)
            .map(Lookup::Found)
            .map_err(|e| ApiError::Decode(format!("{} {}: {}", kind, name, e))),
        None => Ok(Lookup::NotFound),
    }
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocatedAddresses {
    #[serde(default)]
    ip_address: Vec<AllocatedAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocatedAddress {
    ip_address: String,
}

/// Connection settings for vCloud Director.
#[derive(Debug, Clone)]
pub struct VcdConfig {
    pub credentials: Credentials,
    /// Name of the edge gateway hosting the load balancer
    pub edge_gateway: String,
    pub api_version: String,
    /// Accept self-signed certificates
    pub insecure: bool,
}

/// vCloud Director backed load balancer API.
pub struct VcdApi {
    config: VcdConfig,
    client: reqwest::Client,
    sessions: Arc<SessionCache>,
    /// Edge gateway id, resolved on first use
    edge_id: OnceCell<String>,
}

impl VcdApi {
    pub fn new(config: VcdConfig, sessions: Arc<SessionCache>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            client,
            sessions,
            edge_id: OnceCell::new(),
        })
    }

    /// Log in and resolve the edge gateway. Call once at startup.
    pub async fn connect(&self) -> Result<(), ApiError> {
        self.session(false).await?;
        let edge = self.edge_id().await?;
        tracing::info!(
            "connected to {} (edge gateway {} = {})",
            self.config.credentials.href,
            self.config.edge_gateway,
            edge
        );
        Ok(())
    }

    fn base_url(&self) -> &str {
        self.config.credentials.href.trim_end_matches('/')
    }

    fn accept_header(version: &str) -> String {
        format!("application/*+json;version={}", version)
    }

    async fn session(&self, force_refresh: bool) -> Result<Session, ApiError> {
        self.sessions
            .get(&self.config.credentials, force_refresh, self)
            .await
    }

    /// Send an authenticated request, re-authenticating once on 401.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let session = self.session(false).await?;
        let response = self.dispatch(method.clone(), url, body, &session).await?;

        match Self::check(response).await {
            Err(e) if e.is_unauthorized() => {}
            checked => return checked,
        }

        tracing::warn!("session rejected on {} {}, re-authenticating", method, url);
        let session = self.session(true).await?;
        let response = self.dispatch(method, url, body, &session).await?;
        Self::check(response).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        session: &Session,
    ) -> Result<Response, ApiError> {
        tracing::debug!("{} {}", method, url);
        let mut builder = self
            .client
            .request(method, url)
            .header(AUTH_HEADER, &session.handle.token)
            .header(ACCEPT, Self::accept_header(&session.handle.api_version));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.request(Method::GET, url, None)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
        serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Id of a created resource: the last segment of `Location`, else the
    /// `id` field of the body.
    async fn created_id(response: Response) -> Result<String, ApiError> {
        let from_location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if let Some(id) = from_location {
            return Ok(id);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("created resource carries no id".to_string()))
    }

    /// Find records of `kind` named `name` through the query service.
    async fn query(&self, kind: &str, name: &str) -> Result<Vec<QueryRecord>, ApiError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/query", self.base_url()),
            &[
                ("type", kind.to_string()),
                ("format", "records".to_string()),
                ("filter", format!("name=={}", name)),
            ],
        )
        .map_err(|e| ApiError::Transport(e.to_string()))?;

        let result: QueryResult = self.get_json(url.as_str()).await?;
        Ok(result
            .record
            .into_iter()
            .filter(|r| r.name == name)
            .collect())
    }

    async fn edge_id(&self) -> Result<&str, ApiError> {
        self.edge_id
            .get_or_try_init(|| async {
                let edge = &self.config.edge_gateway;
                let record = self
                    .query("edgeGateway", edge)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::MissingResource {
                        kind: "edge gateway",
                        name: edge.clone(),
                    })?;
                let id = record
                    .href
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                tracing::debug!("resolved edge gateway {} to {}", edge, id);
                Ok::<_, ApiError>(id)
            })
            .await
            .map(String::as_str)
    }

    async fn load_balancer_url(&self, resource: &str) -> Result<String, ApiError> {
        Ok(format!(
            "{}/network/edges/{}/loadbalancer/config/{}",
            self.base_url(),
            self.edge_id().await?,
            resource
        ))
    }

    async fn firewall_url(&self, resource: &str) -> Result<String, ApiError> {
        Ok(format!(
            "{}/network/edges/{}/firewall/config/{}",
            self.base_url(),
            self.edge_id().await?,
            resource
        ))
    }
}

#[async_trait]
impl Authenticator for VcdApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionHandle, ApiError> {
        let url = format!("{}/api/sessions", credentials.href.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(
                format!("{}@{}", credentials.user, credentials.org),
                Some(&credentials.password),
            )
            .header(ACCEPT, Self::accept_header(&self.config.api_version))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Authentication(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token = response
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::Authentication(format!("response carries no {} header", AUTH_HEADER))
            })?;

        Ok(SessionHandle {
            token: token.to_string(),
            api_version: self.config.api_version.clone(),
        })
    }
}

#[async_trait]
impl LoadBalancerApi for VcdApi {
    async fn list_virtual_servers(&self) -> Result<Vec<VirtualServer>, ApiError> {
        let url = self.load_balancer_url("virtualservers").await?;
        let list: VirtualServerList = self.get_json(&url).await?;
        Ok(decode_entries("virtual server", list.virtual_server))
    }

    async fn get_pool(&self, name: &str) -> Result<Lookup<Pool>, ApiError> {
        let url = self.load_balancer_url("pools").await?;
        let list: PoolList = match self.get_json(&url).await {
            Ok(list) => list,
            Err(ApiError::Status { status: 404, .. }) => return Ok(Lookup::NotFound),
            Err(e) => return Err(e),
        };
        decode_named("pool", list.pool, name)
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let url = self.load_balancer_url("pools").await?;
        let response = self
            .request(Method::POST, &url, Some(&Self::encode(pool)?))
            .await?;

        let mut created = pool.clone();
        created.id = Some(Self::created_id(response).await?);
        Ok(created)
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let id = pool.id.as_deref().ok_or_else(|| ApiError::MissingResource {
            kind: "pool id",
            name: pool.name.clone(),
        })?;
        let url = self.load_balancer_url(&format!("pools/{}", id)).await?;
        self.request(Method::PUT, &url, Some(&Self::encode(pool)?))
            .await?;
        Ok(pool.clone())
    }

    async fn delete_pool(&self, id: &str) -> Result<(), ApiError> {
        let url = self.load_balancer_url(&format!("pools/{}", id)).await?;
        self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn find_application_profile(
        &self,
        name: &str,
    ) -> Result<Lookup<ApplicationProfile>, ApiError> {
        let url = self.load_balancer_url("applicationprofiles").await?;
        let list: ApplicationProfileList = self.get_json(&url).await?;
        decode_named("application profile", list.application_profile, name)
    }

    async fn create_virtual_server(
        &self,
        server: &VirtualServer,
    ) -> Result<VirtualServer, ApiError> {
        let url = self.load_balancer_url("virtualservers").await?;
        let response = self
            .request(Method::POST, &url, Some(&Self::encode(server)?))
            .await?;

        let mut created = server.clone();
        created.id = Some(Self::created_id(response).await?);
        Ok(created)
    }

    async fn delete_virtual_server(&self, id: &str) -> Result<(), ApiError> {
        let url = self
            .load_balancer_url(&format!("virtualservers/{}", id))
            .await?;
        self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>, ApiError> {
        let url = self.firewall_url("rules").await?;
        let list: FirewallRuleList<Value> = self.get_json(&url).await?;
        Ok(decode_entries("firewall rule", list.firewall_rules))
    }

    async fn create_firewall_rule(&self, rule: &FirewallRule) -> Result<FirewallRule, ApiError> {
        let url = self.firewall_url("rules").await?;
        let body = Self::encode(&FirewallRuleList {
            firewall_rules: vec![rule.clone()],
        })?;
        let response = self.request(Method::POST, &url, Some(&body)).await?;

        let mut created = rule.clone();
        created.id = Some(Self::created_id(response).await?);
        Ok(created)
    }

    async fn delete_firewall_rule(&self, id: &str) -> Result<(), ApiError> {
        let url = self.firewall_url(&format!("rules/{}", id)).await?;
        self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn list_allocated_addresses(
        &self,
        network: &str,
    ) -> Result<HashSet<Ipv4Addr>, ApiError> {
        let record = self
            .query("orgVdcNetwork", network)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::MissingResource {
                kind: "org network",
                name: network.to_string(),
            })?;

        let url = format!("{}/allocatedAddresses", record.href.trim_end_matches('/'));
        let allocated: AllocatedAddresses = self.get_json(&url).await?;

        // IPv6 entries cannot collide with an IPv4 virtual IP
        Ok(allocated
            .ip_address
            .iter()
            .filter_map(|a| a.ip_address.parse().ok())
            .collect())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::value_objects::{LbAlgorithm, LbProtocol};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EDGE_PATH: &str = "/network/edges/edge-42/loadbalancer/config";

    fn config(href: &str) -> VcdConfig {
        VcdConfig {
            credentials: Credentials {
                user: "admin".to_string(),
                password: "secret".to_string(),
                org: "acme".to_string(),
                href: href.to_string(),
                vdc: "vdc-1".to_string(),
            },
            edge_gateway: "edge-gw".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            insecure: false,
        }
    }

    fn api(server: &MockServer) -> VcdApi {
        VcdApi::new(config(&server.uri()), Arc::new(SessionCache::default())).unwrap()
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).insert_header(AUTH_HEADER, "token-1"))
            .mount(server)
            .await;
    }

    async fn mount_edge(server: &MockServer) {
        let body = serde_json::json!({
            "record": [
                {"name": "edge-gw", "href": format!("{}/api/admin/edgeGateway/edge-42", server.uri())}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "edgeGateway"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(server)
            .await;
    }

    fn pool(name: &str) -> Pool {
        Pool {
            id: None,
            name: name.to_string(),
            description: String::new(),
            algorithm: LbAlgorithm::RoundRobin,
            transparent: false,
            members: vec![],
        }
    }

    #[tokio::test]
    async fn test_authenticate_reads_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .and(header("accept", "application/*+json;version=31.0"))
            .respond_with(ResponseTemplate::new(200).insert_header(AUTH_HEADER, "abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server);
        let handle = api.authenticate(&api.config.credentials).await.unwrap();

        assert_eq!(handle.token, "abc123");
        assert_eq!(handle.api_version, "31.0");
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let api = api(&server);
        let err = api.authenticate(&api.config.credentials).await.unwrap_err();

        assert!(matches!(err, ApiError::Authentication(ref msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_authenticate_without_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let api = api(&server);
        let err = api.authenticate(&api.config.credentials).await.unwrap_err();

        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_edge_id_resolved_once() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        let body = serde_json::json!({
            "record": [{"name": "edge-gw", "href": "https://vcd/api/admin/edgeGateway/edge-42"}]
        });
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("filter", "name==edge-gw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server);
        api.connect().await.unwrap();

        assert_eq!(api.edge_id().await.unwrap(), "edge-42");
        assert_eq!(api.edge_id().await.unwrap(), "edge-42");
    }

    #[tokio::test]
    async fn test_connect_unknown_edge() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"record": []})))
            .mount(&server)
            .await;

        let err = api(&server).connect().await.unwrap_err();

        assert!(matches!(err, ApiError::MissingResource { kind: "edge gateway", .. }));
    }

    #[tokio::test]
    async fn test_get_pool_found_and_not_found() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        let body = serde_json::json!({
            "pool": [{"id": "pool-1", "name": "kube_pool_a", "algorithm": "ROUND_ROBIN", "members": []}]
        });
        Mock::given(method("GET"))
            .and(path(format!("{}/pools", EDGE_PATH)))
            .and(header(AUTH_HEADER, "token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let api = api(&server);

        let found = api.get_pool("kube_pool_a").await.unwrap();
        assert_eq!(found.found().and_then(|p| p.id), Some("pool-1".to_string()));
        assert_eq!(api.get_pool("kube_pool_b").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_get_pool_404_is_not_found() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{}/pools", EDGE_PATH)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(api(&server).get_pool("any").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_list_virtual_servers_skips_foreign_entries() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        let body = serde_json::json!({
            "virtualServer": [
                {"id": "virtualServer-9", "name": "hand-made", "protocol": "tcp", "port": 22, "ipAddress": "10.0.0.9"},
                {"id": "virtualServer-8", "name": "legacy", "protocol": "sctp", "port": 9},
                {
                    "id": "virtualServer-1",
                    "name": "kube_service_prod_default_web-30080",
                    "ipAddress": "10.0.0.2",
                    "protocol": "http",
                    "port": 80,
                    "applicationProfileId": "applicationProfile-3",
                    "defaultPoolId": "pool-1"
                }
            ]
        });
        Mock::given(method("GET"))
            .and(path(format!("{}/virtualservers", EDGE_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let servers = api(&server).list_virtual_servers().await.unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "kube_service_prod_default_web-30080");
        assert_eq!(servers[0].protocol, LbProtocol::Http);
        assert_eq!(servers[0].default_pool_id, "pool-1");
    }

    #[tokio::test]
    async fn test_get_pool_ignores_unreadable_neighbours() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        let body = serde_json::json!({
            "pool": [
                {"id": "pool-5", "name": "hand-made", "members": "none"},
                {"id": "pool-1", "name": "kube_pool_a", "algorithm": "round-robin", "members": []}
            ]
        });
        Mock::given(method("GET"))
            .and(path(format!("{}/pools", EDGE_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let api = api(&server);

        let found = api.get_pool("kube_pool_a").await.unwrap().found().unwrap();
        assert_eq!(found.id.as_deref(), Some("pool-1"));
        assert_eq!(found.algorithm, LbAlgorithm::RoundRobin);

        // The pool asked for by name must still decode
        let err = api.get_pool("hand-made").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(ref msg) if msg.contains("hand-made")));
    }

    #[tokio::test]
    async fn test_list_firewall_rules_skips_foreign_entries() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        let body = serde_json::json!({
            "firewallRules": [
                {"id": "131073", "name": "default", "source": "any"},
                {"id": "131074", "name": "kube_service_prod_default_web", "action": "accept"}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/network/edges/edge-42/firewall/config/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let rules = api(&server).list_firewall_rules().await.unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id.as_deref(), Some("131074"));
    }

    #[tokio::test]
    async fn test_create_pool_takes_id_from_location() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{}/pools", EDGE_PATH)))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", format!("{}/pools/pool-7", EDGE_PATH)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let created = api(&server).create_pool(&pool("kube_pool_a")).await.unwrap();

        assert_eq!(created.id.as_deref(), Some("pool-7"));
        assert_eq!(created.name, "kube_pool_a");
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status_and_body() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{}/virtualservers", EDGE_PATH)))
            .respond_with(ResponseTemplate::new(500).set_body_string("edge busy"))
            .mount(&server)
            .await;

        let err = api(&server).list_virtual_servers().await.unwrap_err();

        assert_eq!(
            err,
            ApiError::Status {
                status: 500,
                body: "edge busy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_find_application_profile() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_edge(&server).await;
        let body = serde_json::json!({
            "applicationProfile": [{"id": "applicationProfile-1", "name": "ingress"}]
        });
        Mock::given(method("GET"))
            .and(path(format!("{}/applicationprofiles", EDGE_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let api = api(&server);

        assert!(api.find_application_profile("ingress").await.unwrap().is_found());
        assert!(!api.find_application_profile("tcp").await.unwrap().is_found());
    }

    #[tokio::test]
    async fn test_list_allocated_addresses_skips_ipv6() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        let query = serde_json::json!({
            "record": [{"name": "internal", "href": format!("{}/api/network/net-1", server.uri())}]
        });
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "orgVdcNetwork"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&query))
            .mount(&server)
            .await;
        let allocated = serde_json::json!({
            "ipAddress": [
                {"ipAddress": "10.0.0.1"},
                {"ipAddress": "10.0.0.5"},
                {"ipAddress": "fd00::1"}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/api/network/net-1/allocatedAddresses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&allocated))
            .mount(&server)
            .await;

        let addresses = api(&server).list_allocated_addresses("internal").await.unwrap();

        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(addresses.contains(&Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[tokio::test]
    async fn test_unauthorized_retries_with_fresh_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).insert_header(AUTH_HEADER, "stale"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).insert_header(AUTH_HEADER, "fresh"))
            .mount(&server)
            .await;
        mount_edge(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{}/virtualservers", EDGE_PATH)))
            .and(header(AUTH_HEADER, "stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/virtualservers", EDGE_PATH)))
            .and(header(AUTH_HEADER, "fresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"virtualServer": []})),
            )
            .mount(&server)
            .await;

        let api = api(&server);
        let servers = api.list_virtual_servers().await.unwrap();

        assert!(servers.is_empty());
        assert_eq!(api.sessions.len(), 1);
    }
}
