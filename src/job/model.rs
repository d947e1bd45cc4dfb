use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::core::{BitDepth, JobId, OperationKind, OutputFormat};
use crate::foundation::error::MatflowError;
use crate::job::fingerprint::Fingerprint;
use crate::params::binding::ImageBinding;
use crate::params::resolve::ParameterSet;

/// Options for the cook tool.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CookSettings {
    /// 0 (fastest) to 3 (most aggressive).
    pub optimization_level: u8,
    /// Embed graph icons in the archive.
    pub enable_icons: bool,
    /// Merge all graphs into one archive.
    pub merge_graphs: bool,
    /// Kill the cooker after this many seconds.
    pub timeout_secs: u64,
}

impl Default for CookSettings {
    fn default() -> Self {
        Self {
            optimization_level: 1,
            enable_icons: true,
            merge_graphs: false,
            timeout_secs: 300,
        }
    }
}

/// Options for the render tool.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Image format to keep.
    pub output_format: OutputFormat,
    /// Per-channel bit depth.
    pub bit_depth: BitDepth,
    /// Square output size in pixels; `None` lets the archive decide.
    pub resolution: Option<u32>,
    /// `None` lets the renderer pick.
    pub cpu_count: Option<u32>,
    /// Renderer memory budget; `None` lets the renderer pick.
    pub memory_budget_mb: Option<u32>,
    /// Graph to render; `None` renders every graph.
    pub graph: Option<String>,
    /// Graph output to render; `None` renders every output.
    pub graph_output: Option<String>,
    /// Kill the renderer after this many seconds.
    pub timeout_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Png,
            bit_depth: BitDepth::U8,
            resolution: Some(1024),
            cpu_count: None,
            memory_budget_mb: Some(2000),
            graph: None,
            graph_output: None,
            timeout_secs: 600,
        }
    }
}

/// Tool-specific options of a [`Job`].
#[derive(Clone, Debug, PartialEq)]
pub enum JobSettings {
    /// Cook options.
    Cook(CookSettings),
    /// Render options.
    Render(RenderSettings),
}

/// Lifecycle state of a [`Job`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not started.
    #[default]
    Pending,
    /// Executing or waiting on the cache.
    Running,
    /// Outputs reused from the cache.
    CacheHit,
    /// Tool ran and its outputs were placed.
    Succeeded,
    /// Ended with an error.
    Failed,
    /// Never started because the batch was cancelled first.
    Cancelled,
}

impl JobStatus {
    /// True once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// True for `CacheHit` and `Succeeded`.
    pub fn is_success(self) -> bool {
        matches!(self, Self::CacheHit | Self::Succeeded)
    }
}

/// One cook or render invocation, owned by the worker that runs it.
#[derive(Debug)]
pub struct Job {
    /// Id within its batch, 0 for single jobs.
    pub id: JobId,
    /// Source file.
    pub input: PathBuf,
    /// Base directory for placed outputs.
    pub output_dir: PathBuf,
    /// Input file stem, used for output layout.
    pub material: String,
    /// Position of the parameter variant within the originating batch, when it had variants.
    pub variant_index: Option<usize>,
    /// Resolved render parameters; empty for cooks.
    pub params: ParameterSet,
    /// Preset forwarded to the renderer.
    pub preset: Option<String>,
    /// Tool options.
    pub settings: JobSettings,
    /// Staged image inputs, removed when the job drops.
    pub bindings: Vec<ImageBinding>,
    /// Cache key, once computed.
    pub fingerprint: Option<Fingerprint>,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Command line and captured tool output.
    pub log: String,
    /// Error that ended the job.
    pub error: Option<MatflowError>,
}

impl Job {
    /// A cook job.
    pub fn cook(
        id: JobId,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        settings: CookSettings,
    ) -> Self {
        Self::new(id, input.into(), output_dir.into(), JobSettings::Cook(settings))
    }

    /// A render job with already resolved parameters.
    pub fn render(
        id: JobId,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        params: ParameterSet,
        settings: RenderSettings,
    ) -> Self {
        let mut job = Self::new(id, input.into(), output_dir.into(), JobSettings::Render(settings));
        job.params = params;
        job
    }

    fn new(id: JobId, input: PathBuf, output_dir: PathBuf, settings: JobSettings) -> Self {
        Self {
            id,
            material: material_name(&input),
            input,
            output_dir,
            variant_index: None,
            params: ParameterSet::default(),
            preset: None,
            settings,
            bindings: Vec::new(),
            fingerprint: None,
            status: JobStatus::Pending,
            log: String::new(),
            error: None,
        }
    }

    /// Set the variant position.
    pub fn with_variant(mut self, index: Option<usize>) -> Self {
        self.variant_index = index;
        self
    }

    /// Set the preset forwarded to the renderer.
    pub fn with_preset(mut self, preset: Option<String>) -> Self {
        self.preset = preset;
        self
    }

    /// Attach staged image inputs.
    pub fn with_bindings(mut self, bindings: Vec<ImageBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Which tool the job drives.
    pub fn kind(&self) -> OperationKind {
        match self.settings {
            JobSettings::Cook(_) => OperationKind::Cook,
            JobSettings::Render(_) => OperationKind::Render,
        }
    }

    /// Time limit for the tool.
    pub fn timeout(&self) -> Duration {
        let secs = match &self.settings {
            JobSettings::Cook(c) => c.timeout_secs,
            JobSettings::Render(r) => r.timeout_secs,
        };
        Duration::from_secs(secs)
    }

    /// Output format the produced files are expected to carry (render jobs only).
    pub fn output_format(&self) -> Option<OutputFormat> {
        match &self.settings {
            JobSettings::Cook(_) => None,
            JobSettings::Render(r) => Some(r.output_format),
        }
    }
}

/// File stem of `path`, or `"material"` when it has none.
pub fn material_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("material")
        .to_string()
}
