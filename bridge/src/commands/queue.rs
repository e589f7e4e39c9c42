use anyhow::{Result, bail};
use serde::Serialize;

use rqbridge::constants::{DEFAULT_JOB_TIMEOUT_SECONDS, DEFAULT_RESULT_TTL_SECONDS};
use rqbridge::engine::JobRegistryKind;
use rqbridge::store::QueueStore;

use crate::cli_utils::{format_duration, yes_no};

use super::shared::{LoadedSettings, load_settings};

#[derive(Debug, Serialize)]
struct QueueDetails {
    index: usize,
    name: String,
    connection_index: usize,
    target: String,
    queue_class: String,
    job_class: String,
    serializer: String,
    default_timeout: i64,
    default_result_ttl: i64,
    is_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    live: Option<LiveCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LiveCounts {
    jobs: u64,
    started: u64,
    finished: u64,
    failed: u64,
    deferred: u64,
    scheduled: u64,
    canceled: u64,
    workers: usize,
}

fn describe(loaded: &LoadedSettings, index: usize) -> Result<QueueDetails> {
    let name = match loaded.registry.queue_for_index(index) {
        Ok(name) => name.to_string(),
        Err(err) if err.is_not_found() => bail!("Queue index {index} not found"),
        Err(err) => return Err(err.into()),
    };
    let options = loaded.settings.queue_options(&name)?;
    let (connection_index, target) = loaded.target_for_queue(&name)?;
    Ok(QueueDetails {
        index,
        connection_index,
        target: target.redacted(),
        queue_class: options.queue_class.unwrap_or_default(),
        job_class: options.job_class.unwrap_or_default(),
        serializer: options.serializer.unwrap_or_default(),
        default_timeout: options.default_timeout.unwrap_or(DEFAULT_JOB_TIMEOUT_SECONDS),
        default_result_ttl: options
            .default_result_ttl
            .unwrap_or(DEFAULT_RESULT_TTL_SECONDS),
        is_async: options.is_async,
        live: None,
        error: None,
        name,
    })
}

async fn live_counts(loaded: &LoadedSettings, name: &str) -> Result<LiveCounts> {
    let kind = loaded.implementations.queue_for(&loaded.settings, name)?;
    let (_, target) = loaded.target_for_queue(name)?;
    let mut store = QueueStore::open(target).await?;
    let jobs = store.queue_length(kind.as_ref(), name).await?;
    let sizes = store.registry_sizes(kind.as_ref(), name).await?;
    let workers = store.queue_workers(kind.as_ref(), name).await?.len();
    let size = |registry: JobRegistryKind| sizes.get(&registry).copied().unwrap_or(0);
    Ok(LiveCounts {
        jobs,
        started: size(JobRegistryKind::Started),
        finished: size(JobRegistryKind::Finished),
        failed: size(JobRegistryKind::Failed),
        deferred: size(JobRegistryKind::Deferred),
        scheduled: size(JobRegistryKind::Scheduled),
        canceled: size(JobRegistryKind::Canceled),
        workers,
    })
}

pub(crate) async fn queue_show(config: Option<String>, index: usize, json: bool) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let mut details = describe(&loaded, index)?;
    match live_counts(&loaded, &details.name).await {
        Ok(live) => details.live = Some(live),
        Err(err) => details.error = Some(format!("{err:#}")),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }
    println!("Queue [{}] {}", details.index, details.name);
    println!("  Connection:   [{}] {}", details.connection_index, details.target);
    println!("  Queue class:  {}", details.queue_class);
    println!("  Job class:    {}", details.job_class);
    println!("  Serializer:   {}", details.serializer);
    println!(
        "  Timeout:      {}",
        format_duration(Some(details.default_timeout as f64))
    );
    println!(
        "  Result TTL:   {}",
        format_duration(Some(details.default_result_ttl as f64))
    );
    println!("  Async:        {}", yes_no(details.is_async));
    match (&details.live, &details.error) {
        (Some(live), _) => {
            println!("  Queued:       {}", live.jobs);
            println!("  Started:      {}", live.started);
            println!("  Finished:     {}", live.finished);
            println!("  Failed:       {}", live.failed);
            println!("  Deferred:     {}", live.deferred);
            println!("  Scheduled:    {}", live.scheduled);
            println!("  Canceled:     {}", live.canceled);
            println!("  Workers:      {}", live.workers);
        }
        (None, Some(error)) => println!("  Redis:        unavailable ({error})"),
        (None, None) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TempConfig;

    const SETTINGS: &str = r#"
        default_result_ttl = 3600
        [queues.default]
        URL = "redis://127.0.0.1:1/0"
        SOCKET_TIMEOUT = 2
        [queues.high]
        URL = "redis://127.0.0.1:1/0"
        SOCKET_TIMEOUT = 2
        DEFAULT_TIMEOUT = 360
        ASYNC = false
        "#;

    #[test]
    fn describe_uses_sorted_queue_index() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let high = describe(&loaded, 1)?;
        assert_eq!(high.name, "high");
        assert_eq!(high.connection_index, 0);
        assert_eq!(high.default_timeout, 360);
        assert_eq!(high.default_result_ttl, 3600);
        assert!(!high.is_async);

        let default = describe(&loaded, 0)?;
        assert_eq!(default.default_timeout, DEFAULT_JOB_TIMEOUT_SECONDS);
        assert_eq!(default.queue_class, "rq.Queue");
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_index_is_not_found() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let err = queue_show(config.config_arg(), 7, false).await.unwrap_err();
        assert_eq!(err.to_string(), "Queue index 7 not found");
        Ok(())
    }

    #[tokio::test]
    async fn show_reports_unreachable_redis_inline() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        queue_show(config.config_arg(), 0, false).await?;
        queue_show(config.config_arg(), 1, true).await
    }
}
