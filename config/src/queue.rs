use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_TIMEOUT_KEY: &str = "DEFAULT_TIMEOUT";
pub const DEFAULT_RESULT_TTL_KEY: &str = "DEFAULT_RESULT_TTL";
pub const QUEUE_CLASS_KEY: &str = "QUEUE_CLASS";
pub const JOB_CLASS_KEY: &str = "JOB_CLASS";
pub const SERIALIZER_KEY: &str = "SERIALIZER";
pub const ASYNC_KEY: &str = "ASYNC";

/// One queue's settings exactly as the operator wrote them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawQueueConfig(BTreeMap<String, Value>);

impl RawQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawQueueConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Non-connection settings of a queue. None of these affect which
/// connection the queue is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueOptions {
    pub default_timeout: Option<i64>,
    pub default_result_ttl: Option<i64>,
    pub queue_class: Option<String>,
    pub job_class: Option<String>,
    pub serializer: Option<String>,
    pub is_async: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            default_timeout: None,
            default_result_ttl: None,
            queue_class: None,
            job_class: None,
            serializer: None,
            is_async: true,
        }
    }
}

impl QueueOptions {
    pub fn from_raw(queue: &str, raw: &RawQueueConfig) -> ConfigResult<Self> {
        Ok(Self {
            default_timeout: optional_int(queue, raw, DEFAULT_TIMEOUT_KEY)?,
            default_result_ttl: optional_int(queue, raw, DEFAULT_RESULT_TTL_KEY)?,
            queue_class: optional_string(queue, raw, QUEUE_CLASS_KEY)?,
            job_class: optional_string(queue, raw, JOB_CLASS_KEY)?,
            serializer: optional_string(queue, raw, SERIALIZER_KEY)?,
            is_async: match raw.get(ASYNC_KEY) {
                None | Some(Value::Null) => true,
                Some(Value::Bool(value)) => *value,
                Some(_) => return Err(ConfigError::invalid_value(queue, ASYNC_KEY, "a boolean")),
            },
        })
    }
}

fn optional_int(queue: &str, raw: &RawQueueConfig, key: &str) -> ConfigResult<Option<i64>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid_value(queue, key, "an integer number of seconds")),
    }
}

fn optional_string(queue: &str, raw: &RawQueueConfig, key: &str) -> ConfigResult<Option<String>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(Some(value.clone())),
        Some(_) => Err(ConfigError::invalid_value(queue, key, "a non-empty string")),
    }
}
