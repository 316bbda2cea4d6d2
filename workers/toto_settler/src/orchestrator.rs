use chrono::{DateTime, Duration, Utc};
use std::time::Instant;
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    lock_stage::lock_started_matches,
    metrics::MetricsCollector,
    points_stage::settle_points,
    result_stage::derive_results,
    error::ServiceError,
    service::{Credentials, DataService, Session},
    stage::{Stage, StageReport},
};

pub const DEFAULT_SESSION_TTL_SECS: i64 = 12 * 60 * 60;

/// Outcome of one lock → result → points pass.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    /// No stage ran because authentication failed.
    pub skipped_for_auth: bool,
    /// The last login failure within the cycle, if any.
    pub auth_error: Option<ServiceError>,
    pub elapsed: std::time::Duration,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            stages: Vec::with_capacity(Stage::ORDER.len()),
            skipped_for_auth: false,
            auth_error: None,
            elapsed: std::time::Duration::ZERO,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    fn written(&self, stage: Stage) -> usize {
        self.stage(stage).map_or(0, |r| r.written)
    }

    pub fn locked(&self) -> usize {
        self.written(Stage::Lock)
    }

    pub fn results_written(&self) -> usize {
        self.written(Stage::Result)
    }

    pub fn points_written(&self) -> usize {
        self.written(Stage::Points)
    }

    pub fn total_written(&self) -> usize {
        self.stages.iter().map(|r| r.written).sum()
    }

    pub fn completed_all_stages(&self) -> bool {
        self.stages.len() == Stage::ORDER.len() && self.stages.iter().all(|r| r.aborted.is_none())
    }

    fn log(&self) {
        if self.skipped_for_auth {
            warn!("cycle skipped: not authenticated");
            return;
        }

        let skipped: usize = self.stages.iter().map(|r| r.skipped).sum();
        info!(
            locked = self.locked(),
            results = self.results_written(),
            points = self.points_written(),
            skipped,
            complete = self.completed_all_stages(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "cycle finished"
        );
    }
}

/// Drives the settlement stages on a fixed interval.
///
/// One cycle runs at a time. Authentication is checked at the start of each
/// cycle and retried at most once more within it when a stage is rejected.
pub struct Orchestrator<S, C> {
    service: S,
    clock: C,
    credentials: Credentials,
    session_ttl: Duration,
    session: Option<Session>,
    metrics: MetricsCollector,
}

impl<S, C> Orchestrator<S, C>
where
    S: DataService,
    C: Clock,
{
    pub fn new(service: S, clock: C, credentials: Credentials, metrics: MetricsCollector) -> Self {
        Self {
            service,
            clock,
            credentials,
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            session: None,
            metrics,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn session_valid(&self, now: DateTime<Utc>) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| !s.is_expired(now, self.session_ttl))
    }

    async fn authenticate(&mut self) -> Result<(), ServiceError> {
        match self.service.authenticate(&self.credentials).await {
            Ok(session) => {
                info!(identity = %self.credentials.identity, "authenticated with data service");
                // Expiry is tracked against our own clock.
                self.session = Some(Session {
                    issued_at: self.clock.now(),
                    ..session
                });
                Ok(())
            }
            Err(e) => {
                self.session = None;
                if e.is_transient() {
                    warn!("login unavailable, will retry next cycle: {}", e);
                } else {
                    error!("login rejected: {}", e);
                }
                self.metrics.record_error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stage(&self, stage: Stage, now: DateTime<Utc>) -> StageReport {
        match stage {
            Stage::Lock => lock_started_matches(&self.service, now).await,
            Stage::Result => derive_results(&self.service).await,
            Stage::Points => settle_points(&self.service).await,
        }
    }

    /// Runs lock, result and points once, in that order.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = CycleReport::new(now);
        let mut reauthenticated = false;

        if !self.session_valid(now) {
            if let Err(e) = self.authenticate().await {
                report.skipped_for_auth = true;
                report.auth_error = Some(e);
                return self.finish(report, started);
            }
            reauthenticated = true;
        }

        for stage in Stage::ORDER {
            let stage_report = self.run_stage(stage, now).await;
            let rejected = stage_report.aborted_by_auth();
            report.stages.push(stage_report);

            if rejected {
                self.session = None;
                if reauthenticated {
                    warn!(after = %stage, "remaining stages skipped until next cycle");
                    break;
                }
                reauthenticated = true;
                if let Err(e) = self.authenticate().await {
                    report.auth_error = Some(e);
                    warn!(after = %stage, "remaining stages skipped until next cycle");
                    break;
                }
            }
        }

        self.finish(report, started)
    }

    fn finish(&self, mut report: CycleReport, started: Instant) -> CycleReport {
        report.elapsed = started.elapsed();
        report.log();
        self.metrics.record_cycle(&report);
        debug!(metrics = ?self.metrics.get_metrics(), "worker metrics");
        report
    }

    /// Runs a cycle immediately and then every `poll_interval` until
    /// `shutdown` flips to true or its sender is dropped. A cycle still in
    /// flight at shutdown is abandoned; the next start re-derives its work.
    pub async fn run(&mut self, poll_interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = poll_interval.as_millis() as u64,
            "settlement loop started: lock -> result -> points"
        );

        let mut ticker = time::interval(poll_interval);
        // A cycle outlasting the interval swallows the ticks it missed.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.changed() => {
                    warn!("shutdown requested, abandoning in-flight cycle");
                    break;
                }
            }
        }

        info!("settlement loop stopped");
    }
}
