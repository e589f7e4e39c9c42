use anyhow::Result;

use rqbridge::store::QueueStore;
use rqbridge_config::DEFAULT_QUEUE_NAME;

use super::shared::load_settings;

pub(crate) async fn suspend_workers(
    config: Option<String>,
    queue: Option<String>,
    duration: Option<u64>,
) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let queue = queue.unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
    let (index, target) = loaded.target_for_queue(&queue)?;
    let mut store = QueueStore::open(target).await?;
    store.suspend(duration).await?;
    tracing::info!(queue = %queue, index, duration, "workers suspended");
    match duration.filter(|seconds| *seconds > 0) {
        Some(seconds) => println!(
            "Suspending workers on connection [{index}] {} for {seconds} second(s). No new jobs will be started during that time.",
            store.target()
        ),
        None => println!(
            "Suspending workers on connection [{index}] {}. No new jobs will be started.",
            store.target()
        ),
    }
    Ok(())
}

pub(crate) async fn resume_workers(config: Option<String>, queue: Option<String>) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let queue = queue.unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
    let (index, target) = loaded.target_for_queue(&queue)?;
    let mut store = QueueStore::open(target).await?;
    store.resume().await?;
    tracing::info!(queue = %queue, index, "workers resumed");
    println!("Resuming workers on connection [{index}] {}.", store.target());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TempConfig;

    #[tokio::test]
    async fn unknown_queue_fails_before_connecting() -> Result<()> {
        let config = TempConfig::new(
            r#"
            [queues.default]
            URL = "redis://127.0.0.1:1/0"
            "#,
        )?;
        let err = suspend_workers(config.config_arg(), Some("missing".to_string()), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn suspend_round_trip_against_redis() -> Result<()> {
        let Ok(url) = std::env::var("RQ_TEST_REDIS_URL") else {
            return Ok(());
        };
        let config = TempConfig::new(&format!("[queues.default]\nURL = \"{url}\"\n"))?;
        suspend_workers(config.config_arg(), None, Some(30)).await?;
        let loaded = load_settings(config.path().to_str())?;
        let (_, target) = loaded.target_for_queue("default")?;
        let mut store = QueueStore::open(target).await?;
        assert!(store.is_suspended().await?);
        resume_workers(config.config_arg(), None).await?;
        assert!(!store.is_suspended().await?);
        Ok(())
    }
}
