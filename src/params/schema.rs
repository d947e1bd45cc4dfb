use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{MatflowError, MatflowResult};

/// A single parameter value as passed to the renderer.
///
/// Deserialization is untagged: JSON `true`, `3`, `0.5` and `"x"` map to `Bool`, `Int`, `Float`
/// and `Str` respectively.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(String),
}

impl ParamValue {
    /// Numeric view of the value (`Int` widens to `f64`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    /// Name of the value's type as used in schemas.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }

    /// Text used on the renderer command line (`--set-value name@<text>`).
    pub fn to_arg(&self) -> String {
        match self {
            Self::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(v) => v.clone(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(v) => write!(f, "\"{v}\""),
            other => f.write_str(&other.to_arg()),
        }
    }
}

/// Declared parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Floating point.
    Float,
    /// Integer.
    Int,
    /// Boolean.
    Bool,
    /// String.
    String,
}

/// Inclusive numeric range `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamRange {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl ParamRange {
    /// True when `v` lies within the bounds.
    pub fn contains(self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }
}

/// Declaration of one archive parameter.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamSpec {
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Value used when nothing else sets the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    /// Lower bound for numeric types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for numeric types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ParamSpec {
    /// Declared range, present only when both bounds are.
    pub fn range(&self) -> Option<ParamRange> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(ParamRange { min, max }),
            _ => None,
        }
    }

    /// Numeric parameters with a full range may be randomized.
    pub fn is_randomizable(&self) -> bool {
        matches!(self.kind, ParamType::Float | ParamType::Int) && self.range().is_some()
    }

    /// Check `value` against the declared type and range, returning the (possibly coerced)
    /// value to store.
    ///
    /// `Int` is accepted for `float` parameters, and integral `Float`s for `int` parameters.
    pub fn check(&self, name: &str, value: &ParamValue) -> MatflowResult<ParamValue> {
        let wrong_type = || {
            MatflowError::invalid_parameter(
                name,
                value.to_string(),
                format!("expected {:?}, got {}", self.kind, value.type_name()).to_lowercase(),
            )
        };

        let coerced = match (self.kind, value) {
            (ParamType::Float, ParamValue::Float(v)) => ParamValue::Float(*v),
            (ParamType::Float, ParamValue::Int(v)) => ParamValue::Float(*v as f64),
            (ParamType::Int, ParamValue::Int(v)) => ParamValue::Int(*v),
            (ParamType::Int, ParamValue::Float(v)) if v.is_finite() && v.fract() == 0.0 => {
                ParamValue::Int(*v as i64)
            }
            (ParamType::Bool, ParamValue::Bool(v)) => ParamValue::Bool(*v),
            (ParamType::String, ParamValue::Str(v)) => ParamValue::Str(v.clone()),
            _ => return Err(wrong_type()),
        };

        if let Some(v) = coerced.as_f64() {
            if !v.is_finite() {
                return Err(MatflowError::invalid_parameter(
                    name,
                    value.to_string(),
                    "value must be finite",
                ));
            }
            if let Some(min) = self.min.filter(|&min| v < min) {
                return Err(MatflowError::invalid_parameter(
                    name,
                    value.to_string(),
                    format!("below declared minimum {min}"),
                ));
            }
            if let Some(max) = self.max.filter(|&max| v > max) {
                return Err(MatflowError::invalid_parameter(
                    name,
                    value.to_string(),
                    format!("above declared maximum {max}"),
                ));
            }
        }
        Ok(coerced)
    }
}

/// Parameter declarations and named presets for one archive.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamSchema {
    /// Declarations by name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
    /// Presets by name, each a set of values.
    #[serde(default)]
    pub presets: BTreeMap<String, BTreeMap<String, ParamValue>>,
}

impl ParamSchema {
    /// Parse and validate a JSON schema.
    pub fn from_json_str(s: &str) -> MatflowResult<Self> {
        let schema: Self = serde_json::from_str(s)
            .map_err(|e| MatflowError::validation(format!("invalid parameter schema: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Read, parse and validate a JSON schema file.
    pub fn from_path(path: &Path) -> MatflowResult<Self> {
        if !path.is_file() {
            return Err(MatflowError::input_not_found(path));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Declaration of `name`.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.get(name)
    }

    /// Reject inverted ranges and defaults that violate their own declaration.
    pub fn validate(&self) -> MatflowResult<()> {
        for (name, spec) in &self.parameters {
            if let Some(r) = spec.range().filter(|r| !(r.min <= r.max)) {
                return Err(MatflowError::invalid_parameter(
                    name,
                    format!("[{}, {}]", r.min, r.max),
                    "declared min is greater than max",
                ));
            }
            if let Some(default) = &spec.default {
                spec.check(name, default)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/schema.rs"]
mod tests;
