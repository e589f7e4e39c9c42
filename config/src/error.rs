use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no queue configuration found: add a [queues] table to the settings file")]
    MissingConfiguration,

    #[error("index {index} is out of range (valid range 0..{len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(
        "queues {} do not share a single connection; a worker can only serve queues on one connection",
        quoted(.queues)
    )]
    InconsistentConnection { queues: Vec<String> },

    #[error(
        "queues {} use different queue classes; a worker can only serve queues of one class",
        quoted(.queues)
    )]
    InconsistentQueueClass { queues: Vec<String> },

    #[error("queue '{queue}' declares more than one connection strategy: {}", .groups.join(", "))]
    AmbiguousConnectionKeys { queue: String, groups: Vec<String> },

    #[error("queue '{0}' is not configured")]
    UnknownQueue(String),

    #[error("no queues requested")]
    NoQueuesRequested,

    #[error("queue '{queue}' uses cache '{cache}', which is not configured under [caches]")]
    UnknownCache { queue: String, cache: String },

    #[error("unknown {kind} implementation '{name}'")]
    UnknownImplementation { kind: String, name: String },

    #[error("queue '{queue}' has invalid {key}: expected {expected}")]
    InvalidValue {
        queue: String,
        key: String,
        expected: String,
    },
}

impl ConfigError {
    /// True for lookups that should surface as "not found" at a boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IndexOutOfRange { .. } | Self::UnknownQueue(_))
    }

    pub(crate) fn invalid_value(
        queue: impl Into<String>,
        key: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            queue: queue.into(),
            key: key.into(),
            expected: expected.into(),
        }
    }
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_connection_names_every_queue() {
        let err = ConfigError::InconsistentConnection {
            queues: vec!["x".to_string(), "y".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'x'"), "message was: {message}");
        assert!(message.contains("'y'"), "message was: {message}");
    }

    #[test]
    fn not_found_kinds() {
        assert!(ConfigError::IndexOutOfRange { index: 3, len: 1 }.is_not_found());
        assert!(ConfigError::UnknownQueue("missing".to_string()).is_not_found());
        assert!(!ConfigError::MissingConfiguration.is_not_found());
        assert!(!ConfigError::NoQueuesRequested.is_not_found());
    }
}
