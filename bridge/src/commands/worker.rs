use std::collections::BTreeSet;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tokio::time::Duration;

use rqbridge::engine::ClassKind;
use rqbridge_config::{ConfigError, DEFAULT_QUEUE_NAME, assert_single_connection};

use crate::cli_utils::join_names;

use super::shared::{LoadedSettings, load_settings, wait_for_shutdown_signal};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub(crate) struct WorkerOptions {
    pub config: Option<String>,
    pub queues: Vec<String>,
    pub burst: bool,
    pub name: Option<String>,
    pub with_scheduler: bool,
}

/// Argv for one engine worker serving `options.queues`.
fn worker_command(loaded: &LoadedSettings, options: &WorkerOptions) -> Result<Vec<String>> {
    let queues: Vec<String> = if options.queues.is_empty() {
        vec![DEFAULT_QUEUE_NAME.to_string()]
    } else {
        options.queues.clone()
    };
    let configs = loaded.settings.queues()?;
    assert_single_connection(configs, &queues)?;

    let mut queue_classes = BTreeSet::new();
    for queue in &queues {
        let options = loaded.settings.queue_options(queue)?;
        queue_classes.insert(options.queue_class.unwrap_or_default());
    }
    if queue_classes.len() > 1 {
        return Err(ConfigError::InconsistentQueueClass {
            queues: queues.clone(),
        }
        .into());
    }

    let first = loaded.settings.queue_options(&queues[0])?;
    let (index, target) = loaded.target_for_queue(&queues[0])?;
    let Some(url) = target.worker_url() else {
        bail!(
            "queues {} use connection [{index}] ({target}), which has no direct Redis URL to hand to the worker command",
            join_names(&queues)
        );
    };

    let implementations = &loaded.implementations;
    let worker_class = implementations.class(ClassKind::Worker, &loaded.settings.worker_class)?;
    let queue_class = implementations.queue_for(&loaded.settings, &queues[0])?;
    let job_class = first.job_class.unwrap_or_else(|| loaded.settings.job_class.clone());
    let job_class = implementations.class(ClassKind::Job, &job_class)?;
    let serializer = first
        .serializer
        .unwrap_or_else(|| loaded.settings.serializer.clone());
    let serializer = implementations.class(ClassKind::Serializer, &serializer)?;

    let mut argv = loaded.settings.worker_cmd.clone();
    argv.extend([
        "--url".to_string(),
        url.to_string(),
        "--worker-class".to_string(),
        worker_class.path.clone(),
        "--queue-class".to_string(),
        queue_class.class_path().to_string(),
        "--job-class".to_string(),
        job_class.path.clone(),
        "--serializer".to_string(),
        serializer.path.clone(),
    ]);
    if options.burst {
        argv.push("--burst".to_string());
    }
    if let Some(name) = &options.name {
        argv.push("--name".to_string());
        argv.push(name.clone());
    }
    if options.with_scheduler {
        argv.push("--with-scheduler".to_string());
    }
    argv.extend(queues);
    Ok(argv)
}

fn spawn(argv: &[String]) -> Result<Child> {
    let Some((program, args)) = argv.split_first() else {
        bail!("worker_cmd cannot be empty");
    };
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn worker command '{program}'"))
}

/// Waits for every child; on SIGINT/SIGTERM gives them a grace period, then kills them.
async fn supervise(children: Vec<Child>, grace: Duration) -> Result<()> {
    let mut running = JoinSet::new();
    for (slot, mut child) in children.into_iter().enumerate() {
        running.spawn(async move { (slot, child.wait().await) });
    }

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    let mut stopping = false;
    let mut aborted = false;
    let mut failures = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown, if !stopping => {
                tracing::info!("shutdown signal received; waiting for workers to exit");
                stopping = true;
                deadline.as_mut().reset(tokio::time::Instant::now() + grace);
            }
            _ = &mut deadline, if stopping && !aborted => {
                tracing::warn!(grace_seconds = grace.as_secs(), "workers did not exit in time; killing");
                aborted = true;
                running.abort_all();
            }
            joined = running.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok((slot, Ok(status))) => {
                        tracing::info!(slot, %status, "worker exited");
                        if !status.success() && !stopping {
                            failures.push(format!("worker {slot} exited with {status}"));
                        }
                    }
                    Ok((slot, Err(err))) => {
                        failures.push(format!("worker {slot} could not be awaited: {err}"));
                    }
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => failures.push(format!("worker task failed: {err}")),
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        bail!(failures.join("; "))
    }
}

pub(crate) async fn run_worker(options: WorkerOptions) -> Result<()> {
    let loaded = load_settings(options.config.as_deref())?;
    let argv = worker_command(&loaded, &options)?;
    tracing::info!(
        queues = ?options.queues,
        program = argv.first().map(String::as_str).unwrap_or_default(),
        "starting worker"
    );
    let child = spawn(&argv)?;
    supervise(vec![child], SHUTDOWN_GRACE).await
}

pub(crate) async fn run_worker_pool(options: WorkerOptions, num_workers: usize) -> Result<()> {
    if num_workers == 0 {
        bail!("--num-workers must be at least 1");
    }
    let loaded = load_settings(options.config.as_deref())?;
    let mut children = Vec::with_capacity(num_workers);
    for slot in 0..num_workers {
        let mut slot_options = options.clone();
        slot_options.name = options.name.as_ref().map(|name| format!("{name}-{slot}"));
        // Only the first worker runs the scheduler.
        slot_options.with_scheduler = options.with_scheduler && slot == 0;
        let argv = worker_command(&loaded, &slot_options)?;
        children.push(spawn(&argv)?);
    }
    tracing::info!(num_workers, queues = ?options.queues, "started worker pool");
    supervise(children, SHUTDOWN_GRACE).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TempConfig;

    const SETTINGS: &str = r#"
        worker_cmd = ["sh", "-c", "exit 0", "rq-worker"]
        [classes]
        queues = ["myapp.queues.Priority"]
        [queues.default]
        URL = "redis://localhost:6379/0"
        [queues.high]
        URL = "redis://localhost:6379/0"
        SERIALIZER = "rq.serializers.JSONSerializer"
        [queues.priority]
        URL = "redis://localhost:6379/0"
        QUEUE_CLASS = "myapp.queues.Priority"
        [queues.remote]
        URL = "redis://redis.internal:6379/0"
        [queues.sentinel]
        SENTINELS = [["s1", 26379]]
        MASTER_NAME = "mymaster"
        "#;

    fn options(queues: &[&str]) -> WorkerOptions {
        WorkerOptions {
            queues: queues.iter().map(|queue| queue.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_engine_command_line() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let mut opts = options(&["high", "default"]);
        opts.burst = true;
        opts.name = Some("w1".to_string());
        opts.with_scheduler = true;
        let argv = worker_command(&loaded, &opts)?;
        assert_eq!(
            argv,
            vec![
                "sh", "-c", "exit 0", "rq-worker",
                "--url", "redis://localhost:6379/0",
                "--worker-class", "rq.Worker",
                "--queue-class", "rq.Queue",
                "--job-class", "rq.job.Job",
                "--serializer", "rq.serializers.JSONSerializer",
                "--burst", "--name", "w1", "--with-scheduler",
                "high", "default",
            ]
        );
        Ok(())
    }

    #[test]
    fn no_queues_means_default_queue() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let argv = worker_command(&loaded, &WorkerOptions::default())?;
        assert_eq!(argv.last().map(String::as_str), Some("default"));
        Ok(())
    }

    #[test]
    fn queues_on_different_connections_are_rejected() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let err = worker_command(&loaded, &options(&["default", "remote"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'default'") && message.contains("'remote'"), "{message}");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InconsistentConnection { .. })
        ));
        Ok(())
    }

    #[test]
    fn queues_with_different_classes_are_rejected() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let err = worker_command(&loaded, &options(&["default", "priority"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InconsistentQueueClass { .. })
        ));
        Ok(())
    }

    #[test]
    fn sentinel_queues_cannot_be_handed_over() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        let loaded = load_settings(config.path().to_str())?;
        let err = worker_command(&loaded, &options(&["sentinel"])).unwrap_err();
        assert!(err.to_string().contains("sentinel"), "{err}");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervise_reports_failed_workers() -> Result<()> {
        let ok = spawn(&["sh".to_string(), "-c".to_string(), "exit 0".to_string()])?;
        supervise(vec![ok], Duration::from_secs(1)).await?;

        let failing = spawn(&["sh".to_string(), "-c".to_string(), "exit 3".to_string()])?;
        let err = supervise(vec![failing], Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("worker 0"), "{err}");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_worker_and_pool_launch_configured_command() -> Result<()> {
        let config = TempConfig::new(SETTINGS)?;
        run_worker(WorkerOptions {
            config: config.config_arg(),
            queues: vec!["default".to_string()],
            burst: true,
            ..Default::default()
        })
        .await?;
        run_worker_pool(
            WorkerOptions {
                config: config.config_arg(),
                queues: vec!["default".to_string(), "high".to_string()],
                name: Some("pool".to_string()),
                ..Default::default()
            },
            2,
        )
        .await
    }

    #[test]
    fn spawn_rejects_empty_command() {
        assert!(spawn(&[]).is_err());
    }
}
