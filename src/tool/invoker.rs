use std::path::Path;
use std::time::Duration;

use crate::foundation::core::OperationKind;
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::tail_chars;
use crate::job::fingerprint::ToolIdentity;
use crate::job::model::Job;
use crate::tool::classify::{ClassifiedFile, classify_dir};
use crate::tool::command::{build_command, info_command};
use crate::tool::locate::identify_tool;
use crate::tool::process::{ProcessExit, run_process};

const INFO_TIMEOUT: Duration = Duration::from_secs(60);
const STDERR_TAIL_CHARS: usize = 4000;

/// Result of one tool execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Exit 0; the classified files left in the output directory.
    Succeeded(Vec<ClassifiedFile>),
    /// Nonzero exit (or exit 0 without the expected output).
    Failed {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// Killed after the job's timeout.
    TimedOut,
}

/// Executes cook and render jobs.
///
/// [`ProcessBackend`] drives the real executables; tests substitute in-process fakes.
pub trait ToolBackend: Send + Sync {
    /// Identity of the tool that runs `kind` jobs, or `ToolNotFound`.
    fn identity(&self, kind: OperationKind) -> MatflowResult<ToolIdentity>;

    /// Run `job` writing into `out_dir`, recording the captured log on the job.
    fn execute(&self, job: &mut Job, out_dir: &Path) -> MatflowResult<ToolOutcome>;

    /// Raw `info` listing of an archive.
    fn info(&self, archive: &Path) -> MatflowResult<String>;
}

/// Runs the external executables as child processes.
#[derive(Debug)]
pub struct ProcessBackend {
    cooker: Result<ToolIdentity, String>,
    renderer: Result<ToolIdentity, String>,
}

impl ProcessBackend {
    /// Backend over already identified tools.
    pub fn new(cooker: ToolIdentity, renderer: ToolIdentity) -> Self {
        Self {
            cooker: Ok(cooker),
            renderer: Ok(renderer),
        }
    }

    /// Locate both tools. A missing tool is only an error once a job needs it.
    pub fn discover(cooker: Option<&Path>, renderer: Option<&Path>) -> Self {
        Self {
            cooker: identify_tool(OperationKind::Cook, cooker).map_err(|e| e.to_string()),
            renderer: identify_tool(OperationKind::Render, renderer).map_err(|e| e.to_string()),
        }
    }
}

impl ToolBackend for ProcessBackend {
    fn identity(&self, kind: OperationKind) -> MatflowResult<ToolIdentity> {
        let slot = match kind {
            OperationKind::Cook => &self.cooker,
            OperationKind::Render => &self.renderer,
        };
        slot.clone().map_err(MatflowError::ToolNotFound)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(job = %job.id))]
    fn execute(&self, job: &mut Job, out_dir: &Path) -> MatflowResult<ToolOutcome> {
        let tool = self.identity(job.kind())?;
        let cmd = build_command(&tool.path, job, out_dir);
        tracing::debug!(command = %cmd.display(), "spawning tool");

        let run = run_process(&cmd, job.timeout())?;
        job.log = run.log(&cmd);

        match run.exit {
            ProcessExit::TimedOut => Ok(ToolOutcome::TimedOut),
            ProcessExit::Exited(Some(0)) => {
                let files = classify_dir(job.kind(), job.output_format(), out_dir)?;
                if job.kind() == OperationKind::Cook && files.is_empty() {
                    return Ok(ToolOutcome::Failed {
                        code: Some(0),
                        stderr: "cook finished but produced no .sbsar archive".to_string(),
                    });
                }
                Ok(ToolOutcome::Succeeded(files))
            }
            ProcessExit::Exited(code) => Ok(ToolOutcome::Failed {
                code,
                stderr: tail_chars(run.stderr.trim(), STDERR_TAIL_CHARS),
            }),
        }
    }

    fn info(&self, archive: &Path) -> MatflowResult<String> {
        let tool = self.identity(OperationKind::Render)?;
        let cmd = info_command(&tool.path, archive);
        tracing::debug!(command = %cmd.display(), "querying archive info");
        let run = run_process(&cmd, INFO_TIMEOUT)?;
        match run.exit {
            ProcessExit::Exited(Some(0)) => Ok(run.stdout),
            ProcessExit::TimedOut => Err(MatflowError::Timeout {
                secs: INFO_TIMEOUT.as_secs(),
                log: run.log(&cmd),
            }),
            ProcessExit::Exited(code) => Err(MatflowError::ToolExecution {
                code,
                stderr: tail_chars(run.stderr.trim(), STDERR_TAIL_CHARS),
                log: run.log(&cmd),
            }),
        }
    }
}
