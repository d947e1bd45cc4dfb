use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::MatflowResult;
use crate::foundation::fs::ensure_dir;
use crate::job::model::Job;
use crate::tool::classify::{Channel, ClassifiedFile};

/// Where placed outputs go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPolicy {
    /// `base/<material>[/variation_NNN]/<channel>.<ext>`.
    #[default]
    ByMaterial,
    /// Original file names directly under the job's output directory.
    Flat,
}

impl LayoutPolicy {
    /// `ByMaterial` when `organize_by_material`, else `Flat`.
    pub fn from_organize_flag(organize_by_material: bool) -> Self {
        if organize_by_material {
            Self::ByMaterial
        } else {
            Self::Flat
        }
    }

    /// Directory a job's files land in.
    pub fn job_dir(self, base: &Path, material: &str, variant_index: Option<usize>) -> PathBuf {
        match self {
            Self::Flat => base.to_path_buf(),
            Self::ByMaterial => {
                let dir = base.join(material);
                match variant_index {
                    Some(i) => dir.join(format!("variation_{i:03}")),
                    None => dir,
                }
            }
        }
    }
}

/// A file copied into its final location.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PlacedFile {
    /// Channel the file was classified as.
    pub channel: Channel,
    /// Final location.
    pub path: PathBuf,
}

/// Copy `files` into the job's final directory under `policy`.
///
/// Sources are left in place (they belong to the cache). Archives are always named after the
/// material; under [`LayoutPolicy::ByMaterial`] recognised channels are renamed to the channel
/// name, with `_2`, `_3`, ... for repeats.
pub fn place(
    files: &[ClassifiedFile],
    job: &Job,
    policy: LayoutPolicy,
) -> MatflowResult<Vec<PlacedFile>> {
    let dir = policy.job_dir(&job.output_dir, &job.material, job.variant_index);
    ensure_dir(&dir)?;

    let mut seen: HashMap<Channel, usize> = HashMap::new();
    let mut placed = Vec::with_capacity(files.len());
    for f in files {
        let name = target_name(f, &job.material, policy, &mut seen);
        let dest = dir.join(name);
        std::fs::copy(&f.path, &dest).with_context(|| {
            format!(
                "failed to place '{}' at '{}'",
                f.path.display(),
                dest.display()
            )
        })?;
        placed.push(PlacedFile {
            channel: f.channel,
            path: dest,
        });
    }
    tracing::debug!(job = %job.id, dir = %dir.display(), files = placed.len(), "placed outputs");
    Ok(placed)
}

fn target_name(
    f: &ClassifiedFile,
    material: &str,
    policy: LayoutPolicy,
    seen: &mut HashMap<Channel, usize>,
) -> String {
    let original = f
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = f
        .path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    match (f.channel, policy) {
        (Channel::Archive, _) => format!("{material}.sbsar"),
        (Channel::Other, _) | (_, LayoutPolicy::Flat) => original,
        (channel, LayoutPolicy::ByMaterial) => {
            let n = seen.entry(channel).or_insert(0);
            *n += 1;
            let stem = if *n == 1 {
                channel.as_str().to_string()
            } else {
                format!("{}_{}", channel.as_str(), n)
            };
            if ext.is_empty() {
                stem
            } else {
                format!("{stem}.{ext}")
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/layout.rs"]
mod tests;
