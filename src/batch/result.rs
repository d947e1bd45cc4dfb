use std::path::PathBuf;

use crate::foundation::core::{JobId, OperationKind};
use crate::foundation::error::MatflowError;
use crate::job::fingerprint::Fingerprint;
use crate::job::model::{Job, JobStatus};
use crate::output::layout::PlacedFile;

/// Error as recorded in reports.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct JobFailure {
    /// Job the failure belongs to.
    pub job_id: JobId,
    /// Stable error kind, see [`MatflowError::kind`].
    pub kind: String,
    /// Display form of the error.
    pub message: String,
}

impl JobFailure {
    /// Capture `err` for job `job_id`.
    pub fn new(job_id: JobId, err: &MatflowError) -> Self {
        Self {
            job_id,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// What one cook or render stage did.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct StageReport {
    /// Which tool ran.
    pub kind: OperationKind,
    /// Terminal status of the stage.
    pub status: JobStatus,
    /// Cache key, once computed.
    pub fingerprint: Option<Fingerprint>,
    /// Files placed into the output directory.
    pub files: Vec<PlacedFile>,
    /// Command line and captured tool output.
    pub log: String,
}

impl StageReport {
    /// Snapshot a finished job.
    pub fn from_job(job: &Job, files: Vec<PlacedFile>) -> Self {
        Self {
            kind: job.kind(),
            status: job.status,
            fingerprint: job.fingerprint,
            files,
            log: job.log.clone(),
        }
    }
}

/// Final state of one batch job (one input under one variant).
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct JobOutcome {
    /// Job id in expansion order.
    pub job_id: JobId,
    /// Source file of the job.
    pub input: PathBuf,
    /// Input file stem.
    pub material: String,
    /// Variant position, `None` when the batch had no variants.
    pub variant_index: Option<usize>,
    /// Overall status across stages.
    pub status: JobStatus,
    /// Reports of the stages that ran, in order.
    pub stages: Vec<StageReport>,
    /// Seed used for this variant when randomization ran.
    pub seed: Option<u64>,
    /// First error that ended the job.
    pub error: Option<JobFailure>,
}

impl JobOutcome {
    /// Placed files of every stage.
    pub fn files(&self) -> impl Iterator<Item = &PlacedFile> {
        self.stages.iter().flat_map(|s| s.files.iter())
    }
}

/// Overall state of a finished batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every job succeeded or hit the cache.
    Success,
    /// At least one job failed.
    CompletedWithErrors,
    /// Cancellation stopped jobs from starting.
    Cancelled,
}

/// Job counts by terminal status.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct BatchSummary {
    /// Number of jobs.
    pub total: usize,
    /// Jobs that ran a tool successfully.
    pub succeeded: usize,
    /// Jobs served entirely from the cache.
    pub cached: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Jobs never started.
    pub cancelled: usize,
    /// Percentage of jobs that succeeded or hit the cache.
    pub success_rate: f64,
}

/// Outcome of a whole batch, ordered by job id.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct BatchResult {
    /// Overall state.
    pub status: BatchStatus,
    /// Counts by status.
    pub summary: BatchSummary,
    /// Per-job outcomes ordered by id.
    pub outcomes: Vec<JobOutcome>,
    /// Failures of the failed jobs, ordered by id.
    pub errors: Vec<JobFailure>,
}

impl BatchResult {
    /// Fold outcomes (in any order) into a result.
    pub fn from_outcomes(mut outcomes: Vec<JobOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.job_id);

        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..BatchSummary::default()
        };
        for o in &outcomes {
            match o.status {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::CacheHit => summary.cached += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                JobStatus::Failed | JobStatus::Pending | JobStatus::Running => summary.failed += 1,
            }
        }
        summary.success_rate = if summary.total == 0 {
            0.0
        } else {
            (summary.succeeded + summary.cached) as f64 * 100.0 / summary.total as f64
        };

        let errors = outcomes.iter().filter_map(|o| o.error.clone()).collect();
        let status = if summary.cancelled > 0 {
            BatchStatus::Cancelled
        } else if summary.failed > 0 {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Success
        };

        Self {
            status,
            summary,
            outcomes,
            errors,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/batch/result.rs"]
mod tests;
