use anyhow::{Context, Result};
use tokio::time::Duration;

use rqbridge::engine::JobRegistryKind;
use rqbridge::metrics;
use rqbridge::stats::{Statistics, collect};

use crate::cli_utils::{format_duration, truncate, yes_no};

use super::shared::{LoadedSettings, load_settings, wait_for_shutdown_signal};

pub(crate) async fn show_stats(config: Option<String>, json: bool, interval: Option<f64>) -> Result<()> {
    let period = match interval.filter(|seconds| *seconds > 0.0) {
        Some(seconds) => Some(
            Duration::try_from_secs_f64(seconds)
                .ok()
                .with_context(|| format!("--interval {seconds} is out of range"))?,
        ),
        None => None,
    };
    let loaded = load_settings(config.as_deref())?;
    let Some(period) = period else {
        let stats = gather(&loaded).await?;
        return print_stats(&stats, json);
    };

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        let stats = gather(&loaded).await?;
        if !json {
            print!("\x1b[2J\x1b[H");
            println!("Refreshing every {}. Press Ctrl+C to exit.\n", format_duration(Some(period.as_secs_f64())));
        }
        print_stats(&stats, json)?;
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(period) => {}
        }
    }
    Ok(())
}

pub(crate) async fn show_metrics(config: Option<String>) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let stats = gather(&loaded).await?;
    print!("{}", metrics::render(&stats));
    Ok(())
}

async fn gather(loaded: &LoadedSettings) -> Result<Statistics> {
    collect(&loaded.settings, &loaded.registry, &loaded.implementations).await
}

fn print_stats(stats: &Statistics, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(stats)?);
        return Ok(());
    }
    if stats.queues.is_empty() {
        println!("No queues configured");
        return Ok(());
    }
    println!(
        "{:<24} {:>4} {:>8} {:>8} {:>9} {:>8} {:>9} {:>9} {:>8} {:>9}",
        "Queue", "Conn", "Queued", "Started", "Finished", "Failed", "Deferred", "Scheduled",
        "Workers", "Scheduler"
    );
    for queue in &stats.queues {
        if let Some(error) = &queue.error {
            println!(
                "{:<24} {:>4} unavailable: {}",
                truncate(&queue.name, 24),
                queue.connection_index,
                truncate(error, 80)
            );
            continue;
        }
        println!(
            "{:<24} {:>4} {:>8} {:>8} {:>9} {:>8} {:>9} {:>9} {:>8} {:>9}",
            truncate(&queue.name, 24),
            queue.connection_index,
            queue.jobs,
            queue.registry(JobRegistryKind::Started),
            queue.registry(JobRegistryKind::Finished),
            queue.registry(JobRegistryKind::Failed),
            queue.registry(JobRegistryKind::Deferred),
            queue.registry(JobRegistryKind::Scheduled),
            queue.workers,
            yes_no(queue.scheduler_running)
        );
    }
    println!();
    for connection in &stats.connections {
        let state = match (&connection.error, connection.suspended) {
            (Some(error), _) => format!("error: {}", truncate(error, 80)),
            (None, true) => format!("{} worker(s), suspended", connection.workers),
            (None, false) => format!("{} worker(s)", connection.workers),
        };
        println!("[{}] {} - {state}", connection.index, connection.target);
    }
    println!(
        "\nTotal: {} queued job(s), {} worker(s)",
        stats.total_jobs(),
        stats.total_workers()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TempConfig;

    const UNREACHABLE: &str = r#"
        [queues.default]
        URL = "redis://127.0.0.1:1/0"
        SOCKET_TIMEOUT = 2
        "#;

    #[tokio::test]
    async fn stats_survive_unreachable_connection() -> Result<()> {
        let config = TempConfig::new(UNREACHABLE)?;
        show_stats(config.config_arg(), false, None).await?;
        show_stats(config.config_arg(), true, None).await
    }

    #[tokio::test]
    async fn unbounded_interval_is_rejected() -> Result<()> {
        let config = TempConfig::new(UNREACHABLE)?;
        for interval in [f64::INFINITY, 1e30] {
            let err = show_stats(config.config_arg(), true, Some(interval))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("--interval"), "{err}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn metrics_render_without_redis() -> Result<()> {
        let config = TempConfig::new(UNREACHABLE)?;
        show_metrics(config.config_arg()).await
    }

    #[test]
    fn print_stats_handles_empty_report() -> Result<()> {
        print_stats(&Statistics::default(), false)?;
        print_stats(&Statistics::default(), true)
    }
}
