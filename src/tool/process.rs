use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::foundation::error::{MatflowError, MatflowResult};
use crate::tool::command::ToolCommand;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Longest wait for the output pipes to close once the process has ended.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How a spawned process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exit code, `None` when killed by a signal.
    Exited(Option<i32>),
    /// Killed after the timeout elapsed.
    TimedOut,
}

/// Captured result of [`run_process`].
#[derive(Clone, Debug)]
pub struct ProcessRun {
    /// How the process ended.
    pub exit: ProcessExit,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessRun {
    /// True for a zero exit code.
    pub fn success(&self) -> bool {
        self.exit == ProcessExit::Exited(Some(0))
    }

    /// Combined log of the invocation.
    pub fn log(&self, cmd: &ToolCommand) -> String {
        let mut s = format!("$ {}\n", cmd.display());
        if !self.stdout.is_empty() {
            s.push_str("--- stdout ---\n");
            s.push_str(&self.stdout);
            if !self.stdout.ends_with('\n') {
                s.push('\n');
            }
        }
        if !self.stderr.is_empty() {
            s.push_str("--- stderr ---\n");
            s.push_str(&self.stderr);
            if !self.stderr.ends_with('\n') {
                s.push('\n');
            }
        }
        if self.exit == ProcessExit::TimedOut {
            s.push_str("--- killed after timeout ---\n");
        }
        s
    }
}

/// Spawn `cmd`, capture its output, and kill it (with its process group on Unix) once
/// `timeout` elapses.
///
/// Descendants still alive when the tool exits are killed with it, so a stray background
/// process cannot hold the output pipes open past the timeout.
pub fn run_process(cmd: &ToolCommand, timeout: Duration) -> MatflowResult<ProcessRun> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|e| {
        if matches!(
            e.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
        ) {
            MatflowError::tool_not_found(format!("{}: {e}", cmd.program.display()))
        } else {
            anyhow::Error::new(e)
                .context(format!("failed to spawn '{}'", cmd.program.display()))
                .into()
        }
    })?;

    let stdout_drain = drain(child.stdout.take());
    let stderr_drain = drain(child.stderr.take());

    let start = Instant::now();
    let status: Option<ExitStatus> = loop {
        let polled = child
            .try_wait()
            .with_context(|| format!("failed to poll '{}'", cmd.program.display()))?;
        if let Some(status) = polled {
            kill_group(&child);
            break Some(status);
        }
        if start.elapsed() >= timeout {
            kill_tree(&mut child);
            if let Err(e) = child.wait() {
                tracing::warn!(pid = child.id(), error = %e, "failed to reap killed tool");
            }
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    let stdout = join_drain(stdout_drain, deadline);
    let stderr = join_drain(stderr_drain, deadline);
    let exit = match status {
        Some(s) => ProcessExit::Exited(s.code()),
        None => ProcessExit::TimedOut,
    };
    Ok(ProcessRun {
        exit,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut r| {
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            r.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    })
}

fn join_drain(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>, deadline: Instant) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("tool output pipe still open after exit; dropping its output");
            return String::new();
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    match handle.join() {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to read tool output");
            String::new()
        }
        Err(_) => {
            tracing::warn!("tool output drain thread panicked");
            String::new()
        }
    }
}

/// Kill the whole process group led by `child`. Reaping stays with the caller.
#[cfg(unix)]
fn kill_group(child: &std::process::Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // `process_group(0)` made the child its own group leader.
    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = raw, error = %e, "failed to kill tool process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &std::process::Child) {}

fn kill_tree(child: &mut std::process::Child) {
    kill_group(child);
    if let Err(e) = child.kill()
        && e.kind() != std::io::ErrorKind::InvalidInput
    {
        tracing::warn!(pid = child.id(), error = %e, "failed to kill tool process");
    }
}

#[cfg(all(test, unix))]
#[path = "../../tests/unit/tool/process.rs"]
mod tests;
