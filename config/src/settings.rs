use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_JOB_CLASS, DEFAULT_QUEUE_CLASS, DEFAULT_SERIALIZER, DEFAULT_WORKER_CLASS,
    default_worker_cmd,
};
use crate::error::{ConfigError, ConfigResult};
use crate::queue::{QueueOptions, RawQueueConfig};
use crate::registry::ConnectionRegistry;

/// A shared cache backend that queues can borrow with `USE_REDIS_CACHE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub location: String,
    pub db: Option<i64>,
}

/// Extra implementation identifiers accepted on top of the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct ClassSettings {
    pub queues: Vec<String>,
    pub jobs: Vec<String>,
    pub workers: Vec<String>,
    pub serializers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RqSettings {
    pub queues: Option<BTreeMap<String, RawQueueConfig>>,
    pub caches: BTreeMap<String, CacheConfig>,
    pub queue_class: String,
    pub job_class: String,
    pub worker_class: String,
    pub serializer: String,
    pub default_result_ttl: Option<i64>,
    pub worker_cmd: Vec<String>,
    pub classes: ClassSettings,
}

impl Default for RqSettings {
    fn default() -> Self {
        Self {
            queues: None,
            caches: BTreeMap::new(),
            queue_class: DEFAULT_QUEUE_CLASS.to_string(),
            job_class: DEFAULT_JOB_CLASS.to_string(),
            worker_class: DEFAULT_WORKER_CLASS.to_string(),
            serializer: DEFAULT_SERIALIZER.to_string(),
            default_result_ttl: None,
            worker_cmd: default_worker_cmd(),
            classes: ClassSettings::default(),
        }
    }
}

impl RqSettings {
    pub fn queues(&self) -> ConfigResult<&BTreeMap<String, RawQueueConfig>> {
        self.queues.as_ref().ok_or(ConfigError::MissingConfiguration)
    }

    pub fn queue(&self, name: &str) -> ConfigResult<&RawQueueConfig> {
        self.queues()?
            .get(name)
            .ok_or_else(|| ConfigError::UnknownQueue(name.to_string()))
    }

    pub fn registry(&self) -> ConfigResult<ConnectionRegistry> {
        Ok(ConnectionRegistry::build(self.queues()?))
    }

    /// Options for `name` with the global classes filled in.
    pub fn queue_options(&self, name: &str) -> ConfigResult<QueueOptions> {
        let mut options = QueueOptions::from_raw(name, self.queue(name)?)?;
        options
            .queue_class
            .get_or_insert_with(|| self.queue_class.clone());
        options.job_class.get_or_insert_with(|| self.job_class.clone());
        options
            .serializer
            .get_or_insert_with(|| self.serializer.clone());
        if options.default_result_ttl.is_none() {
            options.default_result_ttl = self.default_result_ttl;
        }
        Ok(options)
    }

    pub fn cache(&self, name: &str) -> Option<&CacheConfig> {
        self.caches.get(name)
    }
}
