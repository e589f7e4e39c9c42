use anyhow::Result;
use clap::{Parser, Subcommand};
mod cli_utils;
mod commands;
mod telemetry;

/// Initialize the rustls crypto provider (ring).
/// This must be called once before any TLS connections are made.
fn init_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

use commands::{
    WorkerOptions, check_settings, list_connections, queue_show, resume_workers, run_worker,
    run_worker_pool, show_metrics, show_stats, suspend_workers,
};

#[derive(Parser)]
#[command(name = "rqbridge")]
#[command(version)]
#[command(about = "Queue settings bridge for a Redis-backed job queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate settings and print the connection registry.
    Check {
        #[arg(long)]
        config: Option<String>,
    },
    /// List the unique Redis connections.
    Connections {
        /// Show a single connection by index.
        index: Option<usize>,
        #[arg(long)]
        config: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print queue statistics.
    Stats {
        #[arg(long)]
        config: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Refresh every SECS seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        interval: Option<f64>,
    },
    /// Print queue statistics in Prometheus text format.
    Metrics {
        #[arg(long)]
        config: Option<String>,
    },
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },
    /// Stop workers on a queue's connection from starting new jobs.
    Suspend {
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        queue: Option<String>,
        /// Resume automatically after SECS seconds.
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
    /// Lift a suspension.
    Resume {
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        queue: Option<String>,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Show a queue by its index in the sorted queue list.
    Show {
        index: usize,
        #[arg(long)]
        config: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct WorkerArgs {
    #[arg(long)]
    config: Option<String>,
    #[arg(long, action = clap::ArgAction::Append)]
    queue: Vec<String>,
    #[arg(long, default_value_t = false)]
    burst: bool,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value_t = false)]
    with_scheduler: bool,
}

impl From<WorkerArgs> for WorkerOptions {
    fn from(args: WorkerArgs) -> Self {
        WorkerOptions {
            config: args.config,
            queues: args.queue,
            burst: args.burst,
            name: args.name,
            with_scheduler: args.with_scheduler,
        }
    }
}

#[derive(Subcommand)]
enum WorkerCommand {
    /// Launch one engine worker for queues sharing a connection.
    Run {
        #[command(flatten)]
        args: WorkerArgs,
    },
    /// Launch several engine workers for the same queues.
    Pool {
        #[command(flatten)]
        args: WorkerArgs,
        #[arg(long, default_value_t = 1)]
        num_workers: usize,
    },
}

async fn dispatch_command(command: Commands) -> Result<()> {
    match command {
        Commands::Check { config } => {
            check_settings(config)?;
        }
        Commands::Connections {
            index,
            config,
            json,
        } => {
            list_connections(config, index, json)?;
        }
        Commands::Stats {
            config,
            json,
            interval,
        } => {
            show_stats(config, json, interval).await?;
        }
        Commands::Metrics { config } => {
            show_metrics(config).await?;
        }
        Commands::Queue { command } => match command {
            QueueCommand::Show {
                index,
                config,
                json,
            } => {
                queue_show(config, index, json).await?;
            }
        },
        Commands::Worker { command } => match command {
            WorkerCommand::Run { args } => {
                run_worker(args.into()).await?;
            }
            WorkerCommand::Pool { args, num_workers } => {
                run_worker_pool(args.into(), num_workers).await?;
            }
        },
        Commands::Suspend {
            config,
            queue,
            duration,
        } => {
            suspend_workers(config, queue, duration).await?;
        }
        Commands::Resume { config, queue } => {
            resume_workers(config, queue).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_crypto_provider();
    telemetry::init_tracing();
    let cli = Cli::parse();
    dispatch_command(cli.command).await
}
