//! Infrastructure Layer
//!
//! Cross-cutting concerns shared by the adapters and the reconciler.

pub mod keyed_lock;
pub mod session_cache;

pub use keyed_lock::{KeyLockGuard, KeyedLock};
pub use session_cache::{Session, SessionCache, DEFAULT_SESSION_VALIDITY};
