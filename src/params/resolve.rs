use std::collections::BTreeMap;

use rand::{Rng as _, SeedableRng as _};

use crate::foundation::error::{MatflowError, MatflowResult};
use crate::params::binding::ImageBinding;
use crate::params::schema::{ParamRange, ParamSchema, ParamType, ParamValue};

/// Seed choice for randomized resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seed {
    /// Use this seed.
    Explicit(u64),
    /// Draw a fresh seed; the drawn value is reported back in [`ResolvedParams::seed`].
    #[default]
    Unspecified,
}

impl Seed {
    /// Negative values mean "unspecified", matching the `-1` convention of the CLI.
    pub fn from_i64(v: i64) -> Self {
        u64::try_from(v).map_or(Self::Unspecified, Self::Explicit)
    }

    /// Seed for variant `index` of a batch: explicit seeds advance by index.
    pub fn for_variant(self, index: usize) -> Self {
        match self {
            Self::Explicit(s) => Self::Explicit(s.wrapping_add(index as u64)),
            Self::Unspecified => Self::Unspecified,
        }
    }
}

/// Seeded sampling of ranged parameters.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Randomization {
    /// Seed for the sampler.
    pub seed: Seed,
    /// Blend factor in `[0, 1]` between default (0) and sampled value (1).
    pub strength: f64,
}

/// Caller input to [`ParameterResolver::resolve`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamRequest {
    /// Named preset applied after defaults.
    #[serde(default)]
    pub preset: Option<String>,
    /// Values applied last.
    #[serde(default)]
    pub overrides: BTreeMap<String, ParamValue>,
    /// Sampling applied between the preset and the overrides.
    #[serde(default)]
    pub randomization: Option<Randomization>,
}

/// One resolved value and its declared range.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ParamEntry {
    /// Resolved value.
    pub value: ParamValue,
    /// Declared range, when the declaration had both bounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<ParamRange>,
}

/// Validated parameter values, ordered by name.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: BTreeMap<String, ParamEntry>,
}

impl ParameterSet {
    /// Value of `name`.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name).map(|e| &e.value)
    }

    /// Declared range of `name`.
    pub fn range(&self, name: &str) -> Option<ParamRange> {
        self.entries.get(name).and_then(|e| e.range)
    }

    /// `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), &e.value))
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no value is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    /// Build an unvalidated set (no ranges). Used for schema-less renders.
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, value)| (k, ParamEntry { value, range: None }))
                .collect(),
        }
    }
}

/// Output of [`ParameterResolver::resolve`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ResolvedParams {
    /// Final values.
    pub values: ParameterSet,
    /// Preset name forwarded to the renderer.
    pub preset: Option<String>,
    /// Seed actually used, when randomization ran.
    pub seed: Option<u64>,
    /// Strength used, when randomization ran.
    pub strength: Option<f64>,
    /// Raw samples drawn per randomized parameter, before blending.
    pub sampled: BTreeMap<String, f64>,
    /// Names passed through without a declaration.
    pub unknown: Vec<String>,
}

/// Merges defaults, preset, randomization and overrides against one archive's schema.
pub struct ParameterResolver<'a> {
    schema: &'a ParamSchema,
}

impl<'a> ParameterResolver<'a> {
    /// Resolver for `schema`.
    pub fn new(schema: &'a ParamSchema) -> Self {
        Self { schema }
    }

    /// Resolve `req` into a validated [`ParameterSet`].
    ///
    /// Later sources win: schema defaults, preset values, randomized values (skipping
    /// explicitly overridden names), explicit overrides. Every resulting value is checked
    /// against its declaration before returning; `bindings` are checked for existence only.
    pub fn resolve(
        &self,
        req: &ParamRequest,
        bindings: &[ImageBinding],
    ) -> MatflowResult<ResolvedParams> {
        let mut merged: BTreeMap<String, ParamValue> = self
            .schema
            .parameters
            .iter()
            .filter_map(|(name, spec)| spec.default.clone().map(|d| (name.clone(), d)))
            .collect();

        if let Some(preset) = &req.preset {
            match self.schema.presets.get(preset) {
                Some(values) => {
                    for (k, v) in values {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                None => {
                    tracing::warn!(preset = %preset, "preset not declared in schema; passing through");
                }
            }
        }

        let mut out = ResolvedParams {
            preset: req.preset.clone(),
            ..ResolvedParams::default()
        };

        if let Some(rnd) = &req.randomization {
            if !(0.0..=1.0).contains(&rnd.strength) {
                return Err(MatflowError::invalid_parameter(
                    "randomization_strength",
                    rnd.strength.to_string(),
                    "must be within [0, 1]",
                ));
            }
            let seed = match rnd.seed {
                Seed::Explicit(s) => s,
                Seed::Unspecified => rand::random::<u64>(),
            };
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

            for (name, spec) in &self.schema.parameters {
                let Some(range) = spec.range().filter(|_| spec.is_randomizable()) else {
                    continue;
                };
                if req.overrides.contains_key(name) {
                    continue;
                }
                let sampled = sample(&mut rng, spec.kind, range, name)?;
                let base = merged
                    .get(name)
                    .and_then(ParamValue::as_f64)
                    .unwrap_or(range.min);
                let blended = sampled * rnd.strength + base * (1.0 - rnd.strength);
                let value = match spec.kind {
                    ParamType::Int => ParamValue::Int(blended.round() as i64),
                    _ => ParamValue::Float(blended),
                };
                out.sampled.insert(name.clone(), sampled);
                merged.insert(name.clone(), value);
            }
            tracing::debug!(seed, strength = rnd.strength, count = out.sampled.len(), "randomized parameters");
            out.seed = Some(seed);
            out.strength = Some(rnd.strength);
        }

        for (k, v) in &req.overrides {
            merged.insert(k.clone(), v.clone());
        }

        let mut entries = BTreeMap::new();
        for (name, value) in merged {
            let entry = match self.schema.get(&name) {
                Some(spec) => ParamEntry {
                    value: spec.check(&name, &value)?,
                    range: spec.range(),
                },
                None => {
                    tracing::warn!(parameter = %name, "parameter not declared in schema; passing through");
                    out.unknown.push(name.clone());
                    ParamEntry { value, range: None }
                }
            };
            entries.insert(name, entry);
        }
        out.values = ParameterSet { entries };

        for b in bindings {
            if !b.path().is_file() {
                return Err(MatflowError::input_not_found(b.path()));
            }
        }

        Ok(out)
    }
}

fn sample(
    rng: &mut rand::rngs::StdRng,
    kind: ParamType,
    range: ParamRange,
    name: &str,
) -> MatflowResult<f64> {
    if !(range.min.is_finite() && range.max.is_finite() && range.min <= range.max) {
        return Err(MatflowError::invalid_parameter(
            name,
            format!("[{}, {}]", range.min, range.max),
            "cannot randomize over this range",
        ));
    }
    match kind {
        ParamType::Int => {
            let lo = range.min.ceil() as i64;
            let hi = range.max.floor() as i64;
            if lo > hi {
                return Err(MatflowError::invalid_parameter(
                    name,
                    format!("[{}, {}]", range.min, range.max),
                    "range contains no integer",
                ));
            }
            Ok(rng.gen_range(lo..=hi) as f64)
        }
        _ => Ok(rng.gen_range(range.min..=range.max)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/resolve.rs"]
mod tests;
