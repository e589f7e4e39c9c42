//! Queue settings for a Redis-backed job queue engine.
//!
//! Resolves the `[queues]` table of a settings file into a deduplicated,
//! deterministically ordered list of connections and assigns every queue
//! a stable index into it.

pub mod config;
pub mod connection;
pub mod defaults;
pub mod error;
pub mod queue;
pub mod registry;
pub mod settings;

pub use config::{
    DEFAULT_CONFIG_FILENAME, ENV_CONFIG_KEY, load_toml_settings, parse_toml_settings,
    resolve_config_source,
};
pub use connection::{
    CanonicalConnectionParams, ConnectionGroup, ConnectionKey, normalize,
    validate_connection_groups,
};
pub use defaults::*;
pub use error::{ConfigError, ConfigResult};
pub use queue::{QueueOptions, RawQueueConfig};
pub use registry::{ConnectionRegistry, assert_single_connection};
pub use settings::{CacheConfig, ClassSettings, RqSettings};
