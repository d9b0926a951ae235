//! Session Cache
//!
//! Keeps authenticated sessions per credential fingerprint for a bounded
//! time, so reconciliation passes do not log in to the backend on every
//! remote call.

use crate::domain::entities::{Credentials, SessionHandle};
use crate::domain::errors::ApiError;
use crate::domain::ports::Authenticator;
use crate::domain::value_objects::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Sessions older than this are re-authenticated.
pub const DEFAULT_SESSION_VALIDITY: Duration = Duration::from_secs(20 * 60);

/// A cached, authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    pub fingerprint: Fingerprint,
    pub created_at: Instant,
    pub handle: SessionHandle,
}

impl Session {
    fn is_expired(&self, validity: Duration) -> bool {
        self.created_at.elapsed() > validity
    }
}

#[derive(Default)]
struct CacheState {
    sessions: HashMap<Fingerprint, Session>,
    /// How many lookups were answered from the cache
    served: u64,
}

/// Credential-scoped, time-bounded session cache.
///
/// The mutex is only held for map access. Authentication runs outside of
/// it, so two concurrent misses for the same fingerprint may both log in;
/// the later insert wins.
pub struct SessionCache {
    validity: Duration,
    state: Mutex<CacheState>,
}

impl SessionCache {
    pub fn new(validity: Duration) -> Self {
        Self {
            validity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return a live session for `credentials`, authenticating on a miss.
    ///
    /// `force_refresh` discards any cached session first.
    pub async fn get(
        &self,
        credentials: &Credentials,
        force_refresh: bool,
        authenticator: &dyn Authenticator,
    ) -> Result<Session, ApiError> {
        let fingerprint = credentials.fingerprint();

        let cached = self.state.lock().sessions.get(&fingerprint).cloned();
        if let Some(session) = cached {
            if !force_refresh && !session.is_expired(self.validity) {
                self.state.lock().served += 1;
                return Ok(session);
            }

            tracing::debug!(
                "cached session invalidated (age={:?} forced={})",
                session.created_at.elapsed(),
                force_refresh
            );
            let mut state = self.state.lock();
            // Leave a session another caller stored in the meantime alone
            if state
                .sessions
                .get(&fingerprint)
                .is_some_and(|s| s.created_at == session.created_at)
            {
                state.sessions.remove(&fingerprint);
            }
        }

        tracing::info!("authenticating against {} as {}", credentials.href, credentials.user);
        let handle = authenticator
            .authenticate(credentials)
            .await
            .map_err(|e| match e {
                ApiError::Authentication(_) => e,
                other => ApiError::Authentication(other.to_string()),
            })?;

        let session = Session {
            fingerprint: fingerprint.clone(),
            created_at: Instant::now(),
            handle,
        };
        self.state.lock().sessions.insert(fingerprint, session.clone());

        Ok(session)
    }

    /// Drop every session and zero the served counter.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.served = 0;
    }

    pub fn served_count(&self) -> u64 {
        self.state.lock().served
    }

    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_VALIDITY)
    }
}
