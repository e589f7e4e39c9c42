//! Queue statistics across every configured connection.
//!
//! Each unique connection is dialed once no matter how many queues share
//! it. Failures are recorded on the affected entries so one unreachable
//! server does not hide the others.

use std::collections::BTreeMap;

use anyhow::Result;
use rqbridge_config::{ConnectionRegistry, RqSettings};
use serde::Serialize;

use crate::connection::resolve_target;
use crate::engine::{Implementations, JobRegistryKind};
use crate::store::QueueStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub connection_index: usize,
    pub queue_class: String,
    pub jobs: u64,
    pub registries: BTreeMap<JobRegistryKind, u64>,
    pub workers: usize,
    pub scheduler_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueStats {
    pub fn registry(&self, kind: JobRegistryKind) -> u64 {
        self.registries.get(&kind).copied().unwrap_or(0)
    }

    fn failed(name: &str, connection_index: usize, queue_class: String, error: String) -> Self {
        Self {
            name: name.to_string(),
            connection_index,
            queue_class,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub index: usize,
    pub target: String,
    pub queues: Vec<String>,
    pub workers: usize,
    pub suspended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub queues: Vec<QueueStats>,
    pub connections: Vec<ConnectionStats>,
}

impl Statistics {
    /// Orders queues by name and connections by index.
    pub fn from_parts(mut queues: Vec<QueueStats>, mut connections: Vec<ConnectionStats>) -> Self {
        queues.sort_by(|a, b| a.name.cmp(&b.name));
        connections.sort_by_key(|connection| connection.index);
        Self {
            queues,
            connections,
        }
    }

    pub fn total_jobs(&self) -> u64 {
        self.queues.iter().map(|queue| queue.jobs).sum()
    }

    /// Workers summed per connection, so a worker serving several queues counts once.
    pub fn total_workers(&self) -> usize {
        self.connections.iter().map(|connection| connection.workers).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.queues.iter().any(|queue| queue.error.is_some())
            || self.connections.iter().any(|connection| connection.error.is_some())
    }
}

pub async fn collect(
    settings: &RqSettings,
    registry: &ConnectionRegistry,
    implementations: &Implementations,
) -> Result<Statistics> {
    let mut queues = Vec::with_capacity(registry.queue_count());
    let mut connections = Vec::with_capacity(registry.len());

    for (index, params) in registry.connections().iter().enumerate() {
        let names = registry.queues_for_index(index)?;
        let mut classes = Vec::with_capacity(names.len());
        for name in &names {
            let kind = implementations.queue_for(settings, name)?;
            classes.push(kind);
        }
        let mut connection = ConnectionStats {
            index,
            queues: names.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        };

        let store = match resolve_target(params, settings) {
            Ok(target) => {
                connection.target = target.redacted();
                QueueStore::open(target).await
            }
            Err(err) => Err(err),
        };
        let mut store = match store {
            Ok(store) => store,
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(index, error = %message, "connection unavailable");
                for (name, kind) in names.iter().zip(&classes) {
                    queues.push(QueueStats::failed(
                        name,
                        index,
                        kind.class_path().to_string(),
                        message.clone(),
                    ));
                }
                connection.error = Some(message);
                connections.push(connection);
                continue;
            }
        };

        match store.workers().await {
            Ok(workers) => connection.workers = workers.len(),
            Err(err) => connection.error = Some(format!("{err:#}")),
        }
        match store.is_suspended().await {
            Ok(suspended) => connection.suspended = suspended,
            Err(err) => connection.error = Some(format!("{err:#}")),
        }

        for (name, kind) in names.iter().zip(&classes) {
            let sample = async {
                let jobs = store.queue_length(kind.as_ref(), name).await?;
                let registries = store.registry_sizes(kind.as_ref(), name).await?;
                let workers = store.queue_workers(kind.as_ref(), name).await?.len();
                let scheduler_running = store.scheduler_running(kind.as_ref(), name).await?;
                anyhow::Ok(QueueStats {
                    name: name.to_string(),
                    connection_index: index,
                    queue_class: kind.class_path().to_string(),
                    jobs,
                    registries,
                    workers,
                    scheduler_running,
                    error: None,
                })
            }
            .await;
            queues.push(sample.unwrap_or_else(|err| {
                QueueStats::failed(name, index, kind.class_path().to_string(), format!("{err:#}"))
            }));
        }
        connections.push(connection);
    }

    Ok(Statistics::from_parts(queues, connections))
}
