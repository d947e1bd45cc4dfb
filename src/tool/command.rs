use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::job::model::{CookSettings, Job, JobSettings, RenderSettings};

/// A fully built tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable.
    pub program: PathBuf,
    /// Arguments in order.
    pub args: Vec<OsString>,
}

impl ToolCommand {
    fn new(program: &Path, subcommand: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            args: vec![subcommand.into()],
        }
    }

    fn arg(&mut self, a: impl Into<OsString>) -> &mut Self {
        self.args.push(a.into());
        self
    }

    fn flag(&mut self, name: &str, value: impl Into<OsString>) -> &mut Self {
        self.arg(name).arg(value)
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            let a = a.to_string_lossy();
            s.push(' ');
            if a.contains(char::is_whitespace) {
                s.push('"');
                s.push_str(&a);
                s.push('"');
            } else {
                s.push_str(&a);
            }
        }
        s
    }
}

/// Build the command line for `job`, writing its outputs to `out_dir`.
pub fn build_command(program: &Path, job: &Job, out_dir: &Path) -> ToolCommand {
    match &job.settings {
        JobSettings::Cook(c) => cook_command(program, &job.input, out_dir, c),
        JobSettings::Render(r) => render_command(program, job, out_dir, r),
    }
}

fn cook_command(program: &Path, input: &Path, out_dir: &Path, c: &CookSettings) -> ToolCommand {
    let mut cmd = ToolCommand::new(program, "cook");
    cmd.flag("--inputs", input).flag("--output-path", out_dir);
    if c.merge_graphs {
        cmd.arg("--merge");
    }
    if c.enable_icons {
        cmd.arg("--enable-icons");
    }
    for a in optimization_flags(c.optimization_level) {
        cmd.arg(*a);
    }
    cmd.arg("--quiet");
    cmd
}

/// Cook flags for an optimization level; levels above 3 clamp to 3.
pub fn optimization_flags(level: u8) -> &'static [&'static str] {
    match level {
        0 => &["--crc", "1", "--full", "0"],
        1 => &["--full", "1"],
        2 => &["--full", "1", "--merge-graph", "1"],
        _ => &[
            "--full",
            "1",
            "--merge-graph",
            "1",
            "--merge-data",
            "1",
            "--reordering",
            "1",
        ],
    }
}

fn render_command(program: &Path, job: &Job, out_dir: &Path, r: &RenderSettings) -> ToolCommand {
    let mut cmd = ToolCommand::new(program, "render");
    cmd.flag("--input", &job.input)
        .flag("--output-path", out_dir)
        .flag("--output-format", r.output_format.as_str())
        .flag("--output-bit-depth", r.bit_depth.as_str());
    if let Some(res) = r.resolution {
        cmd.flag("--output-size", format!("{res},{res}"));
    }
    if let Some(mb) = r.memory_budget_mb {
        cmd.flag("--memory-budget", mb.to_string());
    }
    if let Some(n) = r.cpu_count {
        cmd.flag("--cpu-count", n.to_string());
    }
    if let Some(g) = &r.graph {
        cmd.flag("--input-graph", g);
    }
    if let Some(o) = &r.graph_output {
        cmd.flag("--input-graph-output", o);
    }
    for (name, value) in job.params.iter() {
        cmd.flag("--set-value", format!("{name}@{}", value.to_arg()));
    }
    if let Some(p) = &job.preset {
        cmd.flag("--use-preset", p);
    }
    let mut bindings: Vec<_> = job.bindings.iter().collect();
    bindings.sort_by(|a, b| a.name().cmp(b.name()));
    for b in bindings {
        let mut entry = OsString::from(format!("{}@", b.name()));
        entry.push(b.path());
        cmd.flag("--set-entry", entry);
    }
    cmd.arg("--quiet");
    cmd
}

/// `render info <archive>`.
pub fn info_command(program: &Path, archive: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(program, "info");
    cmd.arg(archive);
    cmd
}

#[cfg(test)]
#[path = "../../tests/unit/tool/command.rs"]
mod tests;
