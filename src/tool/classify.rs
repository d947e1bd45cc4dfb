use std::path::{Path, PathBuf};

use crate::foundation::core::{OperationKind, OutputFormat};
use crate::foundation::error::MatflowResult;
use crate::foundation::fs::{extension_lower, list_files};

/// Material channel a produced file was recognised as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Base color.
    Diffuse,
    /// Normal map.
    Normal,
    /// Roughness.
    Roughness,
    /// Metallic.
    Metallic,
    /// Height or displacement.
    Height,
    /// Ambient occlusion.
    AmbientOcclusion,
    /// Emission.
    Emission,
    /// Opacity.
    Opacity,
    /// No keyword matched.
    Other,
    /// A cooked archive.
    Archive,
}

/// Ordered keyword table; the first channel with a keyword contained in the stem wins.
const PATTERNS: &[(Channel, &[&str])] = &[
    (Channel::Diffuse, &["diffuse", "albedo", "basecolor", "color"]),
    (Channel::Normal, &["normal", "normalmap"]),
    (Channel::Roughness, &["roughness", "rough"]),
    (Channel::Metallic, &["metallic", "metal"]),
    (Channel::Height, &["height", "displacement", "disp"]),
    (Channel::AmbientOcclusion, &["ao", "ambient", "occlusion"]),
    (Channel::Emission, &["emission", "emissive"]),
    (Channel::Opacity, &["opacity", "alpha", "transparency"]),
];

impl Channel {
    /// Name used for placed files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Normal => "normal",
            Self::Roughness => "roughness",
            Self::Metallic => "metallic",
            Self::Height => "height",
            Self::AmbientOcclusion => "ambient_occlusion",
            Self::Emission => "emission",
            Self::Opacity => "opacity",
            Self::Other => "other",
            Self::Archive => "archive",
        }
    }

    /// Classify a render output by its file name.
    pub fn from_file_name(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        PATTERNS
            .iter()
            .find(|(_, keys)| keys.iter().any(|k| stem.contains(k)))
            .map_or(Self::Other, |(c, _)| *c)
    }
}

/// A produced file and its channel.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ClassifiedFile {
    /// Recognised channel.
    pub channel: Channel,
    /// Location of the file.
    pub path: PathBuf,
}

/// Classify the files a tool left in `dir`.
///
/// Cook runs keep only `.sbsar` files (as [`Channel::Archive`]); render runs keep only files
/// whose extension matches `format`. Anything else (logs, sidecars) is ignored.
pub fn classify_dir(
    kind: OperationKind,
    format: Option<OutputFormat>,
    dir: &Path,
) -> MatflowResult<Vec<ClassifiedFile>> {
    let mut out = Vec::new();
    for path in list_files(dir)? {
        let Some(ext) = extension_lower(&path) else {
            continue;
        };
        let channel = match kind {
            OperationKind::Cook if ext == "sbsar" => Channel::Archive,
            OperationKind::Render if format.is_some_and(|f| extension_matches(f, &ext)) => {
                Channel::from_file_name(&path)
            }
            _ => continue,
        };
        out.push(ClassifiedFile { channel, path });
    }
    Ok(out)
}

fn extension_matches(format: OutputFormat, ext: &str) -> bool {
    match format {
        OutputFormat::Tiff => ext == "tif" || ext == "tiff",
        OutputFormat::Jpg => ext == "jpg" || ext == "jpeg",
        other => ext == other.as_str(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tool/classify.rs"]
mod tests;
