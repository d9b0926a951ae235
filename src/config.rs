use crate::adapters::outbound::{VcdConfig, DEFAULT_API_VERSION};
use crate::application::VipNetwork;
use crate::domain::entities::Credentials;
use crate::infrastructure::DEFAULT_SESSION_VALIDITY;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
}

#[derive(Deserialize, Clone)]
pub struct Config {
    // vCloud Director connection
    pub user: String,
    pub password: String,
    pub org: String,
    pub href: String,
    pub vdc: String,
    pub insecure: bool,
    pub edge_gateway: String,
    pub api_version: String,

    // Internal virtual IP allocation
    pub network_name: Option<String>,
    pub network_cidr: Option<String>,

    pub cluster_name: String,
    pub session_validity_secs: u64,
    pub debug: bool,
}

impl Config {
    /// Build the configuration from a variable lookup.
    ///
    /// `load_config` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let flag = |var: &str| {
            lookup(var)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        Ok(Self {
            user: required("VCLOUD_USER")?,
            password: required("VCLOUD_PASSWORD")?,
            org: required("VCLOUD_ORG")?,
            href: required("VCLOUD_HREF")?,
            vdc: required("VCLOUD_VDC")?,
            insecure: flag("VCLOUD_INSECURE"),
            edge_gateway: required("VCLOUD_EDGE_GATEWAY")?,
            api_version: lookup("VCLOUD_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            network_name: lookup("VCLOUD_VDC_NETWORK_NAME").filter(|v| !v.is_empty()),
            network_cidr: lookup("VCLOUD_VDC_NETWORK_IPNET").filter(|v| !v.is_empty()),
            cluster_name: lookup("VCLOUD_CLUSTER_NAME")
                .unwrap_or_else(|| "kubernetes".to_string()),
            session_validity_secs: lookup("VCLOUD_SESSION_VALIDITY_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SESSION_VALIDITY.as_secs()),
            debug: lookup("DEBUG").is_some(),
        })
    }

    /// The subset that identifies a session.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
            org: self.org.clone(),
            href: self.href.clone(),
            vdc: self.vdc.clone(),
        }
    }

    pub fn vcd(&self) -> VcdConfig {
        VcdConfig {
            credentials: self.credentials(),
            edge_gateway: self.edge_gateway.clone(),
            api_version: self.api_version.clone(),
            insecure: self.insecure,
        }
    }

    /// Network for internal virtual IPs, when both name and CIDR are set.
    pub fn vip_network(&self) -> Option<VipNetwork> {
        match (&self.network_name, &self.network_cidr) {
            (Some(name), Some(cidr)) => Some(VipNetwork {
                name: name.clone(),
                cidr: cidr.clone(),
            }),
            _ => None,
        }
    }

    pub fn session_validity(&self) -> Duration {
        Duration::from_secs(self.session_validity_secs)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("org", &self.org)
            .field("href", &self.href)
            .field("vdc", &self.vdc)
            .field("insecure", &self.insecure)
            .field("edge_gateway", &self.edge_gateway)
            .field("api_version", &self.api_version)
            .field("network_name", &self.network_name)
            .field("network_cidr", &self.network_cidr)
            .field("cluster_name", &self.cluster_name)
            .field("session_validity_secs", &self.session_validity_secs)
            .field("debug", &self.debug)
            .finish()
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    Config::from_lookup(|var| std::env::var(var).ok())
}
