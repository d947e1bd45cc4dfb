use std::fmt;
use std::str::FromStr;

use crate::foundation::error::{MatflowError, MatflowResult};

/// Stable job identifier, assigned in batch expansion order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which external tool a job drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Compile a material-graph source (`.sbs`) into an archive (`.sbsar`).
    Cook,
    /// Evaluate an archive into raster outputs.
    Render,
}

impl OperationKind {
    /// Extension (lowercase, no dot) of the files this operation consumes.
    pub fn input_extension(self) -> &'static str {
        match self {
            Self::Cook => "sbs",
            Self::Render => "sbsar",
        }
    }

    /// Lowercase name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cook => "cook",
            Self::Render => "render",
        }
    }
}

/// What a batch does with each input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Cook every input.
    CookOnly,
    /// Render archives given as inputs.
    RenderOnly,
    /// Cook every input, then render the archive it produced.
    #[default]
    CookAndRender,
}

impl OperationMode {
    /// Extension the batch inputs must carry.
    pub fn input_extension(self) -> &'static str {
        match self {
            Self::CookOnly | Self::CookAndRender => OperationKind::Cook.input_extension(),
            Self::RenderOnly => OperationKind::Render.input_extension(),
        }
    }

    /// True when the cook tool runs.
    pub fn cooks(self) -> bool {
        matches!(self, Self::CookOnly | Self::CookAndRender)
    }

    /// True when the render tool runs.
    pub fn renders(self) -> bool {
        matches!(self, Self::RenderOnly | Self::CookAndRender)
    }
}

/// Raster output format requested from the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG.
    #[default]
    Png,
    /// TIFF.
    Tiff,
    /// OpenEXR.
    Exr,
    /// JPEG.
    Jpg,
}

impl OutputFormat {
    /// File extension, also the renderer's format name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Exr => "exr",
            Self::Jpg => "jpg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = MatflowError;

    fn from_str(s: &str) -> MatflowResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "tif" | "tiff" => Ok(Self::Tiff),
            "exr" => Ok(Self::Exr),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            other => Err(MatflowError::validation(format!(
                "unsupported output format '{other}'"
            ))),
        }
    }
}

/// Per-channel bit depth requested from the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BitDepth {
    /// 8-bit integer.
    #[default]
    #[serde(rename = "8")]
    U8,
    /// 16-bit integer.
    #[serde(rename = "16")]
    U16,
    /// 16-bit float.
    #[serde(rename = "16f")]
    F16,
    /// 32-bit float.
    #[serde(rename = "32f")]
    F32,
}

impl BitDepth {
    /// Value passed to the renderer's bit depth option.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "8",
            Self::U16 => "16",
            Self::F16 => "16f",
            Self::F32 => "32f",
        }
    }
}

impl FromStr for BitDepth {
    type Err = MatflowError;

    fn from_str(s: &str) -> MatflowResult<Self> {
        match s {
            "8" => Ok(Self::U8),
            "16" => Ok(Self::U16),
            "16f" => Ok(Self::F16),
            "32f" => Ok(Self::F32),
            other => Err(MatflowError::validation(format!(
                "unsupported bit depth '{other}' (expected 8, 16, 16f or 32f)"
            ))),
        }
    }
}

/// Current wall-clock time as whole seconds since the Unix epoch.
pub(crate) fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
