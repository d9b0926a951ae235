//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Result of a by-name lookup against the remote API.
///
/// A missing resource is a normal outcome (it usually means "create it"),
/// so it is kept apart from transport failures, which travel as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Build a lookup from an optional value.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Convert into an `Option`, dropping the distinction.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }
}

/// Balancing algorithm of a server pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LbAlgorithm {
    #[default]
    #[serde(rename = "ROUND_ROBIN", alias = "round-robin")]
    RoundRobin,
    #[serde(rename = "IP_HASH", alias = "ip-hash")]
    IpHash,
    #[serde(rename = "LEASTCONN", alias = "leastconn")]
    LeastConnections,
    #[serde(rename = "URI", alias = "uri")]
    Uri,
    #[serde(rename = "HTTPHEADER", alias = "httpheader")]
    HttpHeader,
    #[serde(rename = "URL", alias = "url")]
    Url,
}

impl LbAlgorithm {
    /// Parse an annotation value.
    ///
    /// Accepts the friendly names (`round-robin`, `least-connections`, ...)
    /// as well as the remote wire names (`ROUND_ROBIN`, `LEASTCONN`, ...).
    /// Matching is case-insensitive and treats `_` and `-` alike.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "round-robin" | "roundrobin" => Some(Self::RoundRobin),
            "ip-hash" | "iphash" => Some(Self::IpHash),
            "least-connections" | "leastconn" => Some(Self::LeastConnections),
            "uri" => Some(Self::Uri),
            "http-header" | "httpheader" => Some(Self::HttpHeader),
            "url" => Some(Self::Url),
            _ => None,
        }
    }

    /// Name used by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "ROUND_ROBIN",
            Self::IpHash => "IP_HASH",
            Self::LeastConnections => "LEASTCONN",
            Self::Uri => "URI",
            Self::HttpHeader => "HTTPHEADER",
            Self::Url => "URL",
        }
    }
}

impl std::fmt::Display for LbAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protocol of a virtual server.
///
/// Written in upper case; the edge itself reports lower case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LbProtocol {
    #[default]
    #[serde(alias = "http")]
    Http,
    #[serde(alias = "https")]
    Https,
    #[serde(alias = "tcp")]
    Tcp,
    #[serde(alias = "udp")]
    Udp,
}

impl LbProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl std::fmt::Display for LbProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a load balancer is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposureMode {
    /// Virtual IP allocated from the managed org network
    #[default]
    Internal,
    /// Virtual IP given by annotation, guarded by a perimeter firewall rule
    External,
}

impl ExposureMode {
    /// Only the exact value `external` (any case) selects external exposure.
    pub fn from_annotation(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("external") => Self::External,
            _ => Self::Internal,
        }
    }
}

/// Digest identifying a distinct credential/endpoint combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the given fields in order, separated by `#`.
    pub fn of(fields: &[&str]) -> Self {
        let raw = fields.join("#");
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
