//! Adapters Layer
//!
//! Implementations of the domain ports against external systems.

pub mod outbound;
