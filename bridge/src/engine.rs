//! Typed stand-ins for the queue engine's pluggable classes.
//!
//! Settings name queue, job, worker and serializer classes by identifier.
//! Every identifier is resolved here once, at startup, so a typo fails
//! before any worker is launched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rqbridge_config::{ConfigError, ConfigResult, RqSettings};
use serde::Serialize;

use crate::constants::{
    CANCELED_REGISTRY_PREFIX, DEFAULT_JOB_CLASS, DEFAULT_QUEUE_CLASS, DEFAULT_SERIALIZER,
    DEFAULT_WORKER_CLASS, DEFERRED_REGISTRY_PREFIX, FAILED_REGISTRY_PREFIX,
    FINISHED_REGISTRY_PREFIX, QUEUE_KEY_PREFIX, QUEUE_WORKERS_KEY_PREFIX,
    SCHEDULED_REGISTRY_PREFIX, SCHEDULER_LOCK_KEY_PREFIX, STARTED_REGISTRY_PREFIX,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRegistryKind {
    Started,
    Finished,
    Failed,
    Deferred,
    Scheduled,
    Canceled,
}

impl JobRegistryKind {
    pub const ALL: [JobRegistryKind; 6] = [
        JobRegistryKind::Started,
        JobRegistryKind::Finished,
        JobRegistryKind::Failed,
        JobRegistryKind::Deferred,
        JobRegistryKind::Scheduled,
        JobRegistryKind::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobRegistryKind::Started => "started",
            JobRegistryKind::Finished => "finished",
            JobRegistryKind::Failed => "failed",
            JobRegistryKind::Deferred => "deferred",
            JobRegistryKind::Scheduled => "scheduled",
            JobRegistryKind::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobRegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a queue class keeps its data in Redis.
pub trait QueueKind: Send + Sync {
    /// Identifier forwarded to the engine (`--queue-class`).
    fn class_path(&self) -> &str;

    fn queue_key(&self, queue: &str) -> String {
        format!("{QUEUE_KEY_PREFIX}{queue}")
    }

    fn registry_key(&self, registry: JobRegistryKind, queue: &str) -> String {
        let prefix = match registry {
            JobRegistryKind::Started => STARTED_REGISTRY_PREFIX,
            JobRegistryKind::Finished => FINISHED_REGISTRY_PREFIX,
            JobRegistryKind::Failed => FAILED_REGISTRY_PREFIX,
            JobRegistryKind::Deferred => DEFERRED_REGISTRY_PREFIX,
            JobRegistryKind::Scheduled => SCHEDULED_REGISTRY_PREFIX,
            JobRegistryKind::Canceled => CANCELED_REGISTRY_PREFIX,
        };
        format!("{prefix}{queue}")
    }

    fn workers_key(&self, queue: &str) -> String {
        format!("{QUEUE_WORKERS_KEY_PREFIX}{queue}")
    }

    fn scheduler_lock_key(&self, queue: &str) -> String {
        format!("{SCHEDULER_LOCK_KEY_PREFIX}{queue}")
    }
}

/// The engine's stock key layout under a given class identifier.
#[derive(Debug, Clone)]
pub struct StandardQueue {
    class_path: String,
}

impl StandardQueue {
    pub fn new(class_path: impl Into<String>) -> Self {
        Self {
            class_path: class_path.into(),
        }
    }
}

impl QueueKind for StandardQueue {
    fn class_path(&self) -> &str {
        &self.class_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Job,
    Worker,
    Serializer,
}

impl ClassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassKind::Job => "job class",
            ClassKind::Worker => "worker class",
            ClassKind::Serializer => "serializer",
        }
    }
}

/// A job, worker or serializer identifier known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub kind: ClassKind,
    pub path: String,
}

#[derive(Clone)]
pub struct Implementations {
    queues: BTreeMap<String, Arc<dyn QueueKind>>,
    jobs: BTreeMap<String, ClassRef>,
    workers: BTreeMap<String, ClassRef>,
    serializers: BTreeMap<String, ClassRef>,
}

impl Default for Implementations {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Implementations {
    pub fn builtin() -> Self {
        let mut implementations = Self {
            queues: BTreeMap::new(),
            jobs: BTreeMap::new(),
            workers: BTreeMap::new(),
            serializers: BTreeMap::new(),
        };
        implementations.register_queue(Arc::new(StandardQueue::new(DEFAULT_QUEUE_CLASS)));
        implementations.register(ClassKind::Job, DEFAULT_JOB_CLASS);
        for worker in [
            DEFAULT_WORKER_CLASS,
            "rq.SimpleWorker",
            "rq.worker.SpawnWorker",
        ] {
            implementations.register(ClassKind::Worker, worker);
        }
        for serializer in [DEFAULT_SERIALIZER, "rq.serializers.JSONSerializer"] {
            implementations.register(ClassKind::Serializer, serializer);
        }
        implementations
    }

    /// Built-ins plus the operator-declared identifiers from `settings`.
    pub fn from_settings(settings: &RqSettings) -> Self {
        let mut implementations = Self::builtin();
        for queue in &settings.classes.queues {
            implementations.register_queue(Arc::new(StandardQueue::new(queue.clone())));
        }
        for job in &settings.classes.jobs {
            implementations.register(ClassKind::Job, job);
        }
        for worker in &settings.classes.workers {
            implementations.register(ClassKind::Worker, worker);
        }
        for serializer in &settings.classes.serializers {
            implementations.register(ClassKind::Serializer, serializer);
        }
        implementations
    }

    pub fn register_queue(&mut self, kind: Arc<dyn QueueKind>) -> &mut Self {
        self.queues.insert(kind.class_path().to_string(), kind);
        self
    }

    pub fn register(&mut self, kind: ClassKind, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        let class = ClassRef {
            kind,
            path: path.clone(),
        };
        match kind {
            ClassKind::Job => {
                self.jobs.insert(path, class);
            }
            ClassKind::Worker => {
                self.workers.insert(path, class);
            }
            ClassKind::Serializer => {
                self.serializers.insert(path, class);
            }
        }
        self
    }

    pub fn queue(&self, name: &str) -> ConfigResult<Arc<dyn QueueKind>> {
        self.queues
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownImplementation {
                kind: "queue class".to_string(),
                name: name.to_string(),
            })
    }

    pub fn class(&self, kind: ClassKind, name: &str) -> ConfigResult<&ClassRef> {
        let table = match kind {
            ClassKind::Job => &self.jobs,
            ClassKind::Worker => &self.workers,
            ClassKind::Serializer => &self.serializers,
        };
        table.get(name).ok_or_else(|| unknown(kind, name))
    }

    /// Resolves every class identifier the settings mention.
    pub fn validate(&self, settings: &RqSettings) -> ConfigResult<()> {
        self.class(ClassKind::Worker, &settings.worker_class)?;
        for name in settings.queues()?.keys() {
            let options = settings.queue_options(name)?;
            if let Some(queue_class) = options.queue_class.as_deref() {
                self.queue(queue_class)?;
            }
            if let Some(job_class) = options.job_class.as_deref() {
                self.class(ClassKind::Job, job_class)?;
            }
            if let Some(serializer) = options.serializer.as_deref() {
                self.class(ClassKind::Serializer, serializer)?;
            }
        }
        Ok(())
    }

    pub fn queue_for(&self, settings: &RqSettings, queue: &str) -> ConfigResult<Arc<dyn QueueKind>> {
        let options = settings.queue_options(queue)?;
        let class = options
            .queue_class
            .unwrap_or_else(|| settings.queue_class.clone());
        self.queue(&class)
    }
}

fn unknown(kind: ClassKind, name: &str) -> ConfigError {
    ConfigError::UnknownImplementation {
        kind: kind.as_str().to_string(),
        name: name.to_string(),
    }
}
