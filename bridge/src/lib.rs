//! Runtime side of the queue settings: dials the configured connections,
//! reads the queue engine's Redis layout and reports on it.

pub mod connection;
pub mod constants;
pub mod engine;
pub mod metrics;
pub mod stats;
pub mod store;

#[cfg(test)]
mod test_support;

pub use connection::{ConnectionTarget, connect, redacted, resolve_target};
pub use engine::{ClassKind, Implementations, JobRegistryKind, QueueKind, StandardQueue};
pub use stats::{Statistics, collect};
pub use store::QueueStore;
