pub(crate) mod check;
pub(crate) mod connections;
pub(crate) mod queue;
pub(crate) mod shared;
pub(crate) mod stats;
pub(crate) mod suspend;
pub(crate) mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub(crate) use check::check_settings;
pub(crate) use connections::list_connections;
pub(crate) use queue::queue_show;
pub(crate) use stats::{show_metrics, show_stats};
pub(crate) use suspend::{resume_workers, suspend_workers};
pub(crate) use worker::{WorkerOptions, run_worker, run_worker_pool};
