//! Tarn Core - Core abstractions shared by the tarn crates
//!
//! This crate defines the pieces the pool is built against:
//!
//! - `PhysicalConnection` - Trait for a raw database connection
//! - `ConnectionFactory` - Trait for opening physical connections
//! - `DataSourceSettings` - Where and as whom connections are opened
//! - `TypeSignature` - Fingerprint used to detect stale configuration
//! - `TarnError` - The shared error type

mod connection;
mod error;
mod settings;

pub use connection::*;
pub use error::*;
pub use settings::*;
