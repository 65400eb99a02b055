//! Liveness checks for pooled connections
//!
//! # Example
//!
//! ```ignore
//! use tarn_pool::health::ping_connection;
//!
//! let outcome = ping_connection(&*conn, idle_for, &config).await;
//! if !outcome.is_usable() {
//!     // discard the connection
//! }
//! ```

mod ping;

#[cfg(test)]
mod tests;

pub use ping::{PingOutcome, ping_connection, should_ping};
