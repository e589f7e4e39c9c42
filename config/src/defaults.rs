pub const DEFAULT_QUEUE_NAME: &str = "default";

pub const DEFAULT_QUEUE_CLASS: &str = "rq.Queue";
pub const DEFAULT_JOB_CLASS: &str = "rq.job.Job";
pub const DEFAULT_WORKER_CLASS: &str = "rq.Worker";
pub const DEFAULT_SERIALIZER: &str = "rq.serializers.DefaultSerializer";

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DB: i64 = 0;
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

pub const DEFAULT_RESULT_TTL_SECONDS: i64 = 500;
pub const DEFAULT_JOB_TIMEOUT_SECONDS: i64 = 180;

pub fn default_worker_cmd() -> Vec<String> {
    vec!["rq".to_string(), "worker".to_string()]
}
