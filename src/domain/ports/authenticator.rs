//! Authenticator Port
//!
//! Creates sessions against the remote backend. The session cache calls
//! this on a miss.

use crate::domain::entities::{Credentials, SessionHandle};
use crate::domain::errors::ApiError;
use async_trait::async_trait;

/// Log in to the remote backend.
///
/// Authentication is expensive (a full round trip plus server-side session
/// setup), which is why callers go through the session cache.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionHandle, ApiError>;
}
