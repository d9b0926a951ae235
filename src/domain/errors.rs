//! Domain Errors
//!
//! `ApiError` is what the remote API ports report; `LbError` is what the
//! reconciliation engine surfaces to its caller.

use crate::domain::services::AllocationError;

/// Failure reported by a remote API port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("{kind} '{name}' does not exist")]
    MissingResource { kind: &'static str, name: String },
}

impl ApiError {
    /// True for a rejected or expired session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

/// Error surfaced by the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum LbError {
    /// Bad or incomplete input; retrying will not help.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A resource the operation requires is missing.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: ApiError,
    },
    #[error("no internal or external IP address on node {node}")]
    NodeAddress { node: String },
    #[error("virtual IP allocation failed: {0}")]
    Allocation(#[from] AllocationError),
}

impl LbError {
    /// Wrap an `ApiError` with the operation it interrupted.
    ///
    /// ```ignore
    /// api.list_virtual_servers().await.map_err(LbError::remote("listing virtual servers"))?;
    /// ```
    pub fn remote(context: impl Into<String>) -> impl FnOnce(ApiError) -> LbError {
        let context = context.into();
        move |source| LbError::Remote { context, source }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        LbError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LbError::Configuration(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LbError::NotFound { .. })
    }
}
