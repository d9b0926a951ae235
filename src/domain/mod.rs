//! Domain Layer
//!
//! Entities, value objects, ports and pure services. Nothing in here does
//! I/O; adapters implement the ports.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
