use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::core::OperationKind;
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::job::fingerprint::ToolIdentity;
use crate::tool::command::ToolCommand;
use crate::tool::process::run_process;

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Well-known install locations of the automation toolkit binaries.
#[cfg(windows)]
const INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Adobe\Adobe Substance 3D Automation Toolkit\bin",
    r"C:\Program Files (x86)\Adobe\Adobe Substance 3D Automation Toolkit\bin",
];
#[cfg(target_os = "macos")]
const INSTALL_DIRS: &[&str] = &[
    "/Applications/Adobe Substance 3D Automation Toolkit/bin",
    "/usr/local/bin",
];
#[cfg(not(any(windows, target_os = "macos")))]
const INSTALL_DIRS: &[&str] = &[
    "/opt/Adobe/Adobe_Substance_3D_Automation_Toolkit/bin",
    "/usr/local/bin",
    "/usr/bin",
];

/// Executable base name for each tool.
pub fn tool_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Cook => "sbscooker",
        OperationKind::Render => "sbsrender",
    }
}

/// Find the executable for `kind`: `explicit` when given, else `PATH`, else the install dirs.
pub fn locate_tool(kind: OperationKind, explicit: Option<&Path>) -> MatflowResult<PathBuf> {
    let name = tool_name(kind);
    if let Some(p) = explicit {
        return if p.is_file() {
            Ok(p.to_path_buf())
        } else {
            Err(MatflowError::tool_not_found(format!(
                "{name} not found at configured path '{}'",
                p.display()
            )))
        };
    }

    which::which(name)
        .ok()
        .or_else(|| find_executable(name, INSTALL_DIRS.iter().map(PathBuf::from)))
        .ok_or_else(|| {
            MatflowError::tool_not_found(format!(
                "could not find {name}; install the Substance 3D Automation Toolkit or set tool_paths.{}",
                config_key(kind)
            ))
        })
}

/// First executable named `name` in `dirs`, skipping files without execute permission.
pub(crate) fn find_executable(
    name: &str,
    dirs: impl IntoIterator<Item = PathBuf>,
) -> Option<PathBuf> {
    let search = std::env::join_paths(dirs).ok()?;
    which::which_in(name, Some(search), Path::new(".")).ok()
}

fn config_key(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Cook => "cooker",
        OperationKind::Render => "renderer",
    }
}

/// Locate the tool and ask it for its version.
pub fn identify_tool(kind: OperationKind, explicit: Option<&Path>) -> MatflowResult<ToolIdentity> {
    let path = locate_tool(kind, explicit)?;
    let version = query_version(&path);
    tracing::info!(tool = tool_name(kind), path = %path.display(), %version, "located tool");
    Ok(ToolIdentity { path, version })
}

/// First non-empty line of `<tool> --version`, or `"unknown"` when the query fails.
pub fn query_version(path: &Path) -> String {
    let cmd = ToolCommand {
        program: path.to_path_buf(),
        args: vec!["--version".into()],
    };
    match run_process(&cmd, VERSION_QUERY_TIMEOUT) {
        Ok(run) if run.success() => run
            .stdout
            .lines()
            .chain(run.stderr.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map_or_else(|| "unknown".to_string(), str::to_string),
        Ok(run) => {
            tracing::warn!(path = %path.display(), exit = ?run.exit, "version query failed");
            "unknown".to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "version query failed");
            "unknown".to_string()
        }
    }
}

#[cfg(all(test, unix))]
#[path = "../../tests/unit/tool/locate.rs"]
mod tests;
