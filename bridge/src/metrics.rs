//! Prometheus exposition of queue statistics.

use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::engine::JobRegistryKind;
use crate::stats::Statistics;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS: &str = "rq_jobs";
    pub const WORKERS: &str = "rq_workers";
    pub const CONNECTION_UP: &str = "rq_connection_up";
}

/// Status label of jobs still waiting in the queue list.
pub const QUEUED_STATUS: &str = "queued";

fn record(stats: &Statistics) {
    for queue in &stats.queues {
        if queue.error.is_some() {
            continue;
        }
        let labels = [
            ("queue", queue.name.clone()),
            ("status", QUEUED_STATUS.to_string()),
        ];
        gauge!(names::JOBS, &labels).set(queue.jobs as f64);
        for registry in JobRegistryKind::ALL {
            let labels = [
                ("queue", queue.name.clone()),
                ("status", registry.as_str().to_string()),
            ];
            gauge!(names::JOBS, &labels).set(queue.registry(registry) as f64);
        }
    }
    for connection in &stats.connections {
        let labels = [("connection", connection.index.to_string())];
        let up = if connection.error.is_none() { 1.0 } else { 0.0 };
        gauge!(names::CONNECTION_UP, &labels).set(up);
        if connection.error.is_none() {
            gauge!(names::WORKERS, &labels).set(connection.workers as f64);
        }
    }
}

/// Renders `stats` as Prometheus text without installing a global recorder.
pub fn render(stats: &Statistics) -> String {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || record(stats));
    handle.render()
}
