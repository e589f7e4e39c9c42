pub use rqbridge_config::defaults::{
    DEFAULT_JOB_CLASS, DEFAULT_JOB_TIMEOUT_SECONDS, DEFAULT_QUEUE_CLASS, DEFAULT_QUEUE_NAME,
    DEFAULT_REDIS_DB, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_RESULT_TTL_SECONDS,
    DEFAULT_SENTINEL_PORT, DEFAULT_SERIALIZER, DEFAULT_WORKER_CLASS,
};

// Key layout of the queue engine.
pub const QUEUE_KEY_PREFIX: &str = "rq:queue:";
pub const WORKERS_KEY: &str = "rq:workers";
pub const QUEUE_WORKERS_KEY_PREFIX: &str = "rq:workers:";
pub const SCHEDULER_LOCK_KEY_PREFIX: &str = "rq:scheduler-lock:";
pub const SUSPENDED_KEY: &str = "rq:suspended";

pub const STARTED_REGISTRY_PREFIX: &str = "rq:wip:";
pub const FINISHED_REGISTRY_PREFIX: &str = "rq:finished:";
pub const FAILED_REGISTRY_PREFIX: &str = "rq:failed:";
pub const DEFERRED_REGISTRY_PREFIX: &str = "rq:deferred:";
pub const SCHEDULED_REGISTRY_PREFIX: &str = "rq:scheduled:";
pub const CANCELED_REGISTRY_PREFIX: &str = "rq:canceled:";
