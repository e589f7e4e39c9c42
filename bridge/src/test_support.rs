use std::sync::OnceLock;

use anyhow::Result;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::connection::ConnectionTarget;
use crate::store::QueueStore;

pub const TEST_REDIS_URL_ENV: &str = "RQ_TEST_REDIS_URL";

static REDIS_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn redis_lock() -> &'static Mutex<()> {
    REDIS_LOCK.get_or_init(|| Mutex::new(()))
}

/// A flushed Redis database for tests; `None` when no test server is configured.
pub struct RedisTestContext {
    _guard: MutexGuard<'static, ()>,
    pub url: String,
    pub queue_name: String,
    pub store: QueueStore,
}

impl RedisTestContext {
    pub async fn new() -> Result<Option<Self>> {
        let Ok(url) = std::env::var(TEST_REDIS_URL_ENV) else {
            return Ok(None);
        };
        let guard = redis_lock().lock().await;
        let target = ConnectionTarget::Direct {
            url: url.clone(),
            socket_timeout: None,
        };
        let mut store = QueueStore::open(target).await?;
        redis::cmd("FLUSHDB")
            .query_async::<()>(store.connection())
            .await?;
        Ok(Some(Self {
            _guard: guard,
            url,
            queue_name: format!("test-queue-{}", Uuid::new_v4()),
            store,
        }))
    }

    /// Settings TOML pointing `queues` at the test server.
    pub fn settings_toml(&self, queues: &[&str]) -> String {
        queues
            .iter()
            .map(|queue| format!("[queues.{queue}]\nURL = \"{}\"\n\n", self.url))
            .collect()
    }
}
