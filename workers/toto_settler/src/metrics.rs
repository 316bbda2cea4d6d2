use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::orchestrator::CycleReport;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub invalid_records: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub matches_locked: u64,
    pub results_written: u64,
    pub points_written: u64,
    pub records_skipped: u64,
    pub last_cycle_ms: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Shared counters for the data-service client and the cycle loop.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<WorkerMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkerMetrics> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_request_start(&self) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        self.lock().rate_limiter_wait_time_ms = duration.as_millis() as f64;
    }

    pub fn record_error(&self, error: String) {
        let mut metrics = self.lock();
        metrics.last_error = Some(error);
        metrics.last_error_time = Some(Utc::now());
    }

    pub fn record_invalid_record(&self) {
        self.lock().invalid_records += 1;
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        let mut metrics = self.lock();
        metrics.last_cycle_ms = report.elapsed.as_millis() as u64;

        if report.skipped_for_auth {
            metrics.cycles_skipped += 1;
            return;
        }

        metrics.cycles_completed += 1;
        for stage in &report.stages {
            metrics.records_skipped += stage.skipped as u64;
        }
        metrics.matches_locked += report.locked() as u64;
        metrics.results_written += report.results_written() as u64;
        metrics.points_written += report.points_written() as u64;
    }

    pub fn get_metrics(&self) -> WorkerMetrics {
        self.lock().clone()
    }
}

pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, success: bool) {
        let duration = self.start_time.elapsed();
        let mut metrics = self.collector.lock();

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        // exponential moving average
        let alpha = 0.1;
        metrics.avg_response_time_ms =
            metrics.avg_response_time_ms * (1.0 - alpha) + duration.as_millis() as f64 * alpha;
    }
}
