//! Service annotations
//!
//! Parses the annotations that steer a load balancer into a validated
//! `ServiceIntent`. All configuration errors surface here, before any
//! remote call is made.

use crate::domain::entities::Service;
use crate::domain::errors::LbError;
use crate::domain::value_objects::{ExposureMode, LbAlgorithm};
use std::net::Ipv4Addr;

pub const LOAD_BALANCER_TYPE: &str = "mk.plus.io/load-balancer-type";
pub const LOAD_BALANCER_EXTERNAL_IP: &str = "mk.plus.io/load-balancer-external-ip";
pub const POOL_ALGORITHM: &str = "mk.plus.io/pool-algorithm";
pub const POOL_MIN_CONNECTIONS: &str = "mk.plus.io/pool-min-connections";
pub const POOL_MAX_CONNECTIONS: &str = "mk.plus.io/pool-max-connections";

// Older manifests use the short forms.
pub const LEGACY_POOL_MIN_CONNECTIONS: &str = "mk.plus.io/pool-min-con";
pub const LEGACY_POOL_MAX_CONNECTIONS: &str = "mk.plus.io/pool-max-con";

/// What a service asks of its load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIntent {
    pub exposure: ExposureMode,
    /// Set only for external exposure
    pub external_ip: Option<Ipv4Addr>,
    pub algorithm: LbAlgorithm,
    pub min_conn: u32,
    pub max_conn: u32,
}

impl ServiceIntent {
    /// Read and validate the load balancer annotations of `service`.
    pub fn from_service(service: &Service) -> Result<Self, LbError> {
        let exposure = ExposureMode::from_annotation(service.annotation(LOAD_BALANCER_TYPE));

        let external_ip = match exposure {
            ExposureMode::External => {
                let raw = service
                    .annotation(LOAD_BALANCER_EXTERNAL_IP)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        LbError::Configuration(format!(
                            "{} annotation is required for external type load balancers",
                            LOAD_BALANCER_EXTERNAL_IP
                        ))
                    })?;
                let ip = raw.parse::<Ipv4Addr>().map_err(|_| {
                    LbError::Configuration(format!(
                        "{} annotation '{}' is not an IPv4 address",
                        LOAD_BALANCER_EXTERNAL_IP, raw
                    ))
                })?;
                Some(ip)
            }
            ExposureMode::Internal => None,
        };

        let algorithm = match service.annotation(POOL_ALGORITHM) {
            Some(raw) => LbAlgorithm::parse(raw).ok_or_else(|| {
                LbError::Configuration(format!(
                    "{} annotation '{}' is not a supported algorithm",
                    POOL_ALGORITHM, raw
                ))
            })?,
            None => LbAlgorithm::default(),
        };

        Ok(Self {
            exposure,
            external_ip,
            algorithm,
            min_conn: connection_limit(service, POOL_MIN_CONNECTIONS, LEGACY_POOL_MIN_CONNECTIONS),
            max_conn: connection_limit(service, POOL_MAX_CONNECTIONS, LEGACY_POOL_MAX_CONNECTIONS),
        })
    }
}

/// Missing or unparsable limits mean "no limit" (0).
fn connection_limit(service: &Service, key: &str, legacy_key: &str) -> u32 {
    service
        .annotation(key)
        .or_else(|| service.annotation(legacy_key))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
