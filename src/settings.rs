use std::path::{Path, PathBuf};

use crate::foundation::core::OperationKind;
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::job::model::{CookSettings, RenderSettings};
use crate::output::layout::LayoutPolicy;
use crate::tool::invoker::ProcessBackend;
use crate::tool::locate::locate_tool;

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "MATFLOW_CONFIG";

const APP_DIR: &str = "matflow";
const CONFIG_FILE: &str = "config.json";

/// Engine configuration.
///
/// Every section defaults independently, so a partial JSON file only overrides the keys
/// it names.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit tool locations.
    pub tool_paths: ToolPaths,
    /// Default cook options.
    pub cook: CookSettings,
    /// Default render options.
    pub render: RenderSettings,
    /// Batch defaults.
    pub batch: BatchSettings,
    /// Cache location and budget.
    pub cache: CacheSettings,
    /// Output allow-list.
    pub security: SecuritySettings,
    /// Log filter.
    pub logging: LoggingSettings,
}

/// Explicit executable locations; unset entries are searched for.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Path to `sbscooker`.
    pub cooker: Option<PathBuf>,
    /// Path to `sbsrender`.
    pub renderer: Option<PathBuf>,
}

impl ToolPaths {
    fn explicit(&self, kind: OperationKind) -> Option<&Path> {
        match kind {
            OperationKind::Cook => self.cooker.as_deref(),
            OperationKind::Render => self.renderer.as_deref(),
        }
    }

    /// Resolve the executable for `kind`.
    pub fn locate(&self, kind: OperationKind) -> MatflowResult<PathBuf> {
        locate_tool(kind, self.explicit(kind))
    }

    /// Locate both tools and read their versions.
    pub fn backend(&self) -> ProcessBackend {
        ProcessBackend::discover(
            self.explicit(OperationKind::Cook),
            self.explicit(OperationKind::Render),
        )
    }
}

/// Batch defaults.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads.
    pub max_workers: usize,
    /// Place outputs under per-material folders.
    pub organize_by_material: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_workers: 2,
            organize_by_material: true,
        }
    }
}

impl BatchSettings {
    /// Placement policy implied by `organize_by_material`.
    pub fn layout(&self) -> LayoutPolicy {
        LayoutPolicy::from_organize_flag(self.organize_by_material)
    }
}

/// Cache location and budget.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Size budget in mebibytes.
    pub max_size_mb: u64,
    /// Defaults to `<config dir>/matflow/cache`.
    pub directory: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size_mb: 1024,
            directory: None,
        }
    }
}

impl CacheSettings {
    /// Size budget in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Store directory.
    pub fn root(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => app_dir().join("cache"),
        }
    }
}

/// Output restrictions.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Output allow-list; empty means unrestricted.
    pub restrict_to_directories: Vec<PathBuf>,
}

/// Logging options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Settings {
    /// Settings file consulted when none is given explicitly.
    pub fn default_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => app_dir().join(CONFIG_FILE),
        }
    }

    /// Load from `explicit`, else [`Settings::default_path`].
    ///
    /// A missing file yields defaults. The result is validated.
    pub fn load(explicit: Option<&Path>) -> MatflowResult<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_json_str(&text).map_err(|e| {
                MatflowError::validation(format!("settings '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file; using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(MatflowError::validation(format!(
                    "read settings '{}': {e}",
                    path.display()
                )));
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from JSON without validating them.
    pub fn from_json_str(s: &str) -> MatflowResult<Self> {
        serde_json::from_str(s).map_err(|e| MatflowError::validation(e.to_string()))
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> MatflowResult<()> {
        if self.batch.max_workers == 0 {
            return Err(MatflowError::validation("batch.max_workers must be >= 1"));
        }
        if self.cook.optimization_level > 3 {
            return Err(MatflowError::validation(format!(
                "cook.optimization_level must be 0-3, got {}",
                self.cook.optimization_level
            )));
        }
        if self.cook.timeout_secs == 0 || self.render.timeout_secs == 0 {
            return Err(MatflowError::validation("tool timeouts must be > 0"));
        }
        if self.render.resolution == Some(0) {
            return Err(MatflowError::validation("render.resolution must be > 0"));
        }
        if self.render.cpu_count == Some(0) {
            return Err(MatflowError::validation("render.cpu_count must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/settings.rs"]
mod tests;
