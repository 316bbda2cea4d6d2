use std::fmt;
use tracing::{error, warn};

use crate::{error::ServiceError, service::Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lock,
    Result,
    Points,
}

impl Stage {
    /// Execution order within a cycle.
    pub const ORDER: [Stage; 3] = [Stage::Lock, Stage::Result, Stage::Points];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Lock => "lock",
            Stage::Result => "result",
            Stage::Points => "points",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened during one run of a stage.
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    /// Records the stage looked at.
    pub examined: usize,
    /// Records it wrote back.
    pub written: usize,
    /// Records skipped because of a record-scoped failure.
    pub skipped: usize,
    /// Set when the remainder of the stage was abandoned.
    pub aborted: Option<ServiceError>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            examined: 0,
            written: 0,
            skipped: 0,
            aborted: None,
        }
    }

    pub fn abort(mut self, err: ServiceError) -> Self {
        match &err {
            ServiceError::Auth(_) => error!(stage = %self.stage, "stage abandoned, authentication rejected: {}", err),
            _ => warn!(stage = %self.stage, "stage abandoned: {}", err),
        }
        self.aborted = Some(err);
        self
    }

    pub fn aborted_by_auth(&self) -> bool {
        self.aborted.as_ref().map_or(false, ServiceError::is_auth)
    }

    /// Applies the error policy to a failure on a single record. Returns the
    /// error back when it must abandon the stage.
    pub fn record_failure(&mut self, record_id: &str, err: ServiceError) -> Option<ServiceError> {
        if err.aborts_stage() {
            return Some(err);
        }

        self.skip_record(record_id, err);
        None
    }

    /// Takes the records out of a listing, counting every rejected one as skipped.
    pub fn accept<T>(&mut self, listing: Listing<T>) -> Vec<T> {
        for err in listing.rejected {
            let id = err.record_id().unwrap_or_default().to_string();
            self.skip_record(&id, err);
        }
        listing.records
    }

    fn skip_record(&mut self, record_id: &str, err: ServiceError) {
        match &err {
            ServiceError::InvalidRecord { .. } => {
                error!(stage = %self.stage, record = record_id, "skipping record violating the data model: {}", err)
            }
            _ => warn!(stage = %self.stage, record = record_id, "skipping record: {}", err),
        }
        self.skipped += 1;
    }
}
