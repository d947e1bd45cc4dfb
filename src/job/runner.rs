use std::path::{Path, PathBuf};

use crate::cache::store::{CacheStore, Reservation};
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::{check_allowed, extension_lower, normalize_lexical};
use crate::job::fingerprint::fingerprint_job;
use crate::job::model::{Job, JobStatus};
use crate::output::layout::{LayoutPolicy, PlacedFile, place};
use crate::tool::classify::{ClassifiedFile, classify_dir};
use crate::tool::invoker::{ToolBackend, ToolOutcome};

/// Collaborators a job stage runs against.
#[derive(Clone, Copy)]
pub struct StageEnv<'a> {
    /// Tool executor.
    pub backend: &'a dyn ToolBackend,
    /// Output cache.
    pub cache: &'a CacheStore,
    /// Placement policy.
    pub layout: LayoutPolicy,
    /// Output allow-list; empty means unrestricted.
    pub allowed_dirs: &'a [PathBuf],
}

/// Run one job to a terminal state.
///
/// On failure the error is stored in `job.error` and an empty list is returned. Image
/// bindings are dropped (and their files deleted) before this returns, whatever the outcome.
#[tracing::instrument(level = "info", skip_all, fields(job = %job.id, kind = job.kind().as_str()))]
pub fn run_job(env: &StageEnv<'_>, job: &mut Job) -> Vec<PlacedFile> {
    job.status = JobStatus::Running;
    let result = execute_stage(env, job);
    job.bindings.clear();

    match result {
        Ok(placed) => {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Succeeded;
            }
            tracing::info!(status = ?job.status, files = placed.len(), "job finished");
            placed
        }
        Err(e) => {
            tracing::warn!(error = %e, "job failed");
            job.status = JobStatus::Failed;
            job.error = Some(e);
            Vec::new()
        }
    }
}

fn execute_stage(env: &StageEnv<'_>, job: &mut Job) -> MatflowResult<Vec<PlacedFile>> {
    job.output_dir = normalize_lexical(&job.output_dir)?;
    check_allowed(&job.output_dir, env.allowed_dirs)?;
    validate_inputs(job)?;

    let tool = env.backend.identity(job.kind())?;
    let fp = fingerprint_job(&tool, job)?;
    job.fingerprint = Some(fp);

    match env.cache.reserve(fp)? {
        Reservation::Hit(lease) | Reservation::WaitThenHit(lease) => {
            job.status = JobStatus::CacheHit;
            job.log = format!("cache hit: {fp}\n");
            let files = classify_dir(job.kind(), job.output_format(), lease.path())?;
            place(&files, job, env.layout)
        }
        Reservation::MustExecute(ticket) => {
            // Any early return drops the ticket, which releases the fingerprint.
            match env.backend.execute(job, ticket.staging_dir())? {
                ToolOutcome::Succeeded(files) => {
                    let lease = ticket.commit()?;
                    let files = rebase(files, lease.path());
                    let placed = place(&files, job, env.layout)?;
                    job.status = JobStatus::Succeeded;
                    Ok(placed)
                }
                ToolOutcome::Failed { code, stderr } => Err(MatflowError::ToolExecution {
                    code,
                    stderr,
                    log: job.log.clone(),
                }),
                ToolOutcome::TimedOut => Err(MatflowError::Timeout {
                    secs: job.timeout().as_secs(),
                    log: job.log.clone(),
                }),
            }
        }
    }
}

fn validate_inputs(job: &Job) -> MatflowResult<()> {
    if !job.input.is_file() {
        return Err(MatflowError::input_not_found(&job.input));
    }
    let expected = job.kind().input_extension();
    if extension_lower(&job.input).as_deref() != Some(expected) {
        return Err(MatflowError::validation(format!(
            "{} input must be a .{expected} file: '{}'",
            job.kind().as_str(),
            job.input.display()
        )));
    }
    for b in &job.bindings {
        if !b.path().is_file() {
            return Err(MatflowError::input_not_found(b.path()));
        }
    }
    Ok(())
}

/// Point classified staging files at their committed location.
fn rebase(files: Vec<ClassifiedFile>, dir: &Path) -> Vec<ClassifiedFile> {
    files
        .into_iter()
        .filter_map(|f| {
            let name = f.path.file_name()?.to_owned();
            Some(ClassifiedFile {
                channel: f.channel,
                path: dir.join(name),
            })
        })
        .collect()
}
