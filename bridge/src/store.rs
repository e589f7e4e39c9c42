use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use redis::AsyncCommands;

use crate::connection::{ConnectionTarget, connect};
use crate::constants::{SUSPENDED_KEY, WORKERS_KEY};
use crate::engine::{JobRegistryKind, QueueKind};

/// Redis-side view of the queue engine's data for one connection.
#[derive(Clone)]
pub struct QueueStore {
    target: ConnectionTarget,
    conn: redis::aio::MultiplexedConnection,
}

impl QueueStore {
    pub async fn open(target: ConnectionTarget) -> Result<Self> {
        let conn = connect(&target).await?;
        Ok(Self::with_connection(target, conn))
    }

    pub fn with_connection(target: ConnectionTarget, conn: redis::aio::MultiplexedConnection) -> Self {
        Self { target, conn }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub async fn queue_length(&mut self, kind: &dyn QueueKind, queue: &str) -> Result<u64> {
        let key = kind.queue_key(queue);
        let len: u64 = self
            .conn
            .llen(&key)
            .await
            .with_context(|| format!("LLEN {key} failed"))?;
        Ok(len)
    }

    pub async fn registry_sizes(
        &mut self,
        kind: &dyn QueueKind,
        queue: &str,
    ) -> Result<BTreeMap<JobRegistryKind, u64>> {
        let mut pipe = redis::pipe();
        for registry in JobRegistryKind::ALL {
            pipe.zcard(kind.registry_key(registry, queue));
        }
        let sizes: Vec<u64> = pipe
            .query_async(&mut self.conn)
            .await
            .with_context(|| format!("failed to read job registries of '{queue}'"))?;
        Ok(JobRegistryKind::ALL.into_iter().zip(sizes).collect())
    }

    /// Every worker key registered on this connection.
    pub async fn workers(&mut self) -> Result<BTreeSet<String>> {
        let workers: BTreeSet<String> = self
            .conn
            .smembers(WORKERS_KEY)
            .await
            .with_context(|| format!("SMEMBERS {WORKERS_KEY} failed"))?;
        Ok(workers)
    }

    pub async fn queue_workers(&mut self, kind: &dyn QueueKind, queue: &str) -> Result<BTreeSet<String>> {
        let key = kind.workers_key(queue);
        let workers: BTreeSet<String> = self
            .conn
            .smembers(&key)
            .await
            .with_context(|| format!("SMEMBERS {key} failed"))?;
        Ok(workers)
    }

    pub async fn scheduler_running(&mut self, kind: &dyn QueueKind, queue: &str) -> Result<bool> {
        let key = kind.scheduler_lock_key(queue);
        let exists: bool = self
            .conn
            .exists(&key)
            .await
            .with_context(|| format!("EXISTS {key} failed"))?;
        Ok(exists)
    }

    pub async fn suspend(&mut self, ttl_seconds: Option<u64>) -> Result<()> {
        match ttl_seconds {
            Some(ttl) if ttl > 0 => {
                let _: () = self.conn.set_ex(SUSPENDED_KEY, 1, ttl).await?;
            }
            _ => {
                let _: () = self.conn.set(SUSPENDED_KEY, 1).await?;
            }
        }
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<()> {
        let _: () = self.conn.del(SUSPENDED_KEY).await?;
        Ok(())
    }

    pub async fn is_suspended(&mut self) -> Result<bool> {
        let exists: bool = self.conn.exists(SUSPENDED_KEY).await?;
        Ok(exists)
    }

    #[cfg(test)]
    pub(crate) fn connection(&mut self) -> &mut redis::aio::MultiplexedConnection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StandardQueue;
    use crate::test_support::RedisTestContext;

    #[tokio::test]
    async fn reads_engine_layout() -> Result<()> {
        let Some(mut ctx) = RedisTestContext::new().await? else {
            return Ok(());
        };
        let kind = StandardQueue::new("rq.Queue");
        let queue = ctx.queue_name.clone();
        let conn = ctx.store.connection();
        let _: () = conn.rpush(kind.queue_key(&queue), "job-1").await?;
        let _: () = conn.rpush(kind.queue_key(&queue), "job-2").await?;
        let _: () = conn
            .zadd(kind.registry_key(JobRegistryKind::Failed, &queue), "job-3", 1)
            .await?;
        let _: () = conn.sadd(WORKERS_KEY, "rq:worker:w1").await?;
        let _: () = conn.sadd(kind.workers_key(&queue), "rq:worker:w1").await?;

        assert_eq!(ctx.store.queue_length(&kind, &queue).await?, 2);
        let sizes = ctx.store.registry_sizes(&kind, &queue).await?;
        assert_eq!(sizes[&JobRegistryKind::Failed], 1);
        assert_eq!(sizes[&JobRegistryKind::Started], 0);
        assert!(ctx.store.workers().await?.contains("rq:worker:w1"));
        assert_eq!(ctx.store.queue_workers(&kind, &queue).await?.len(), 1);
        assert!(!ctx.store.scheduler_running(&kind, &queue).await?);
        Ok(())
    }

    #[tokio::test]
    async fn suspend_and_resume_toggle_flag() -> Result<()> {
        let Some(mut ctx) = RedisTestContext::new().await? else {
            return Ok(());
        };
        assert!(!ctx.store.is_suspended().await?);
        ctx.store.suspend(Some(60)).await?;
        assert!(ctx.store.is_suspended().await?);
        ctx.store.resume().await?;
        assert!(!ctx.store.is_suspended().await?);
        Ok(())
    }
}
