use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::foundation::core::{JobId, OperationMode};
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::{extension_lower, list_files, wildcard_match};
use crate::job::model::{CookSettings, RenderSettings};
use crate::output::layout::LayoutPolicy;
use crate::params::resolve::Randomization;
use crate::params::schema::{ParamSchema, ParamValue};

/// Parameter overrides for one variant.
pub type Variant = BTreeMap<String, ParamValue>;

/// Many inputs times many parameter variants.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    /// Source files; all must carry the mode's input extension.
    pub inputs: Vec<PathBuf>,
    /// Parameter variants; empty runs each input once with no overrides.
    pub variants: Vec<Variant>,
    /// Which tools each job runs.
    pub mode: OperationMode,
    /// Worker threads; must be at least 1.
    pub max_workers: usize,
    /// How placed files are arranged under `output_dir`.
    pub layout: LayoutPolicy,
    /// Base directory for placed outputs.
    pub output_dir: PathBuf,
    /// Options for the cook stage.
    pub cook: CookSettings,
    /// Options for the render stage.
    pub render: RenderSettings,
    /// Preset applied before every variant's overrides.
    pub preset: Option<String>,
    /// Seeded randomization applied to every variant.
    pub randomization: Option<Randomization>,
    /// Declarations used to validate every variant; `None` passes all names through.
    pub schema: Option<ParamSchema>,
    /// Entry name to host-provided image, staged per render job.
    pub image_inputs: BTreeMap<String, PathBuf>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            variants: Vec::new(),
            mode: OperationMode::CookAndRender,
            max_workers: 2,
            layout: LayoutPolicy::ByMaterial,
            output_dir: PathBuf::from("output"),
            cook: CookSettings::default(),
            render: RenderSettings::default(),
            preset: None,
            randomization: None,
            schema: None,
            image_inputs: BTreeMap::new(),
        }
    }
}

/// One expanded unit of work.
#[derive(Clone, Debug, PartialEq)]
pub struct JobPlan {
    /// Id in expansion order.
    pub id: JobId,
    /// Source file of this job.
    pub input: PathBuf,
    /// `None` when the request carried no variants.
    pub variant_index: Option<usize>,
    /// Parameter overrides of the variant.
    pub overrides: Variant,
}

impl BatchRequest {
    /// Expand into job plans, ids assigned in order.
    ///
    /// No variants gives one plan per input. Equal, non-zero counts pair input `i` with
    /// variant `i`. Anything else is the cartesian product, input-major.
    pub fn expand(&self) -> MatflowResult<Vec<JobPlan>> {
        if self.inputs.is_empty() {
            return Err(MatflowError::validation("batch has no inputs"));
        }
        let mut plans = Vec::new();
        let mut push = |input: &Path, variant_index: Option<usize>, overrides: Variant| {
            plans.push(JobPlan {
                id: JobId(plans.len() as u32),
                input: input.to_path_buf(),
                variant_index,
                overrides,
            });
        };

        if self.variants.is_empty() {
            for input in &self.inputs {
                push(input, None, Variant::new());
            }
        } else if self.variants.len() == self.inputs.len() {
            for (i, (input, v)) in self.inputs.iter().zip(&self.variants).enumerate() {
                push(input, Some(i), v.clone());
            }
        } else {
            for input in &self.inputs {
                for (j, v) in self.variants.iter().enumerate() {
                    push(input, Some(j), v.clone());
                }
            }
        }
        Ok(plans)
    }
}

/// Files directly in `dir` whose names match `pattern` and whose extension suits `mode`,
/// sorted by path.
pub fn discover_inputs(
    dir: &Path,
    pattern: &str,
    mode: OperationMode,
) -> MatflowResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MatflowError::input_not_found(dir));
    }
    let ext = mode.input_extension();
    let found: Vec<PathBuf> = list_files(dir)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| wildcard_match(pattern, n))
        })
        .filter(|p| extension_lower(p).as_deref() == Some(ext))
        .collect();
    if found.is_empty() {
        return Err(MatflowError::validation(format!(
            "no .{ext} files matching '{pattern}' in '{}'",
            dir.display()
        )));
    }
    tracing::info!(count = found.len(), dir = %dir.display(), "discovered inputs");
    Ok(found)
}

#[cfg(test)]
#[path = "../../tests/unit/batch/request.rs"]
mod tests;
