use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{MatflowError, MatflowResult};
use crate::params::schema::{ParamSchema, ParamSpec, ParamType, ParamValue};
use crate::tool::classify::Channel;

/// Filesystem facts about an archive.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FileFacts {
    /// Archive path.
    pub path: PathBuf,
    /// File name.
    pub name: String,
    /// File name without extension.
    pub stem: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Seconds since the Unix epoch, when the platform reports it.
    pub modified_secs: Option<u64>,
}

impl FileFacts {
    /// Stat `path`.
    pub fn read(path: &Path) -> MatflowResult<Self> {
        if !path.is_file() {
            return Err(MatflowError::input_not_found(path));
        }
        let meta = std::fs::metadata(path)
            .with_context(|| format!("failed to stat '{}'", path.display()))?;
        let modified_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        let lossy = |s: Option<&std::ffi::OsStr>| {
            s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            name: lossy(path.file_name()),
            stem: lossy(path.file_stem()),
            size_bytes: meta.len(),
            modified_secs,
        })
    }
}

/// A parameter listed by `info`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ParamDescriptor {
    /// Parameter name.
    pub name: String,
    /// `key=value` attributes as reported (`type`, `default`, `min`, `max`, ...).
    pub attributes: BTreeMap<String, String>,
}

/// An output listed by `info`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct OutputDescriptor {
    /// Output name.
    pub name: String,
    /// Channel guessed from the name.
    pub channel: Channel,
    /// `key=value` attributes as reported.
    pub attributes: BTreeMap<String, String>,
}

/// Structured view of `render info` output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveInfo {
    /// Filesystem facts.
    pub file: FileFacts,
    /// Graph identifiers.
    pub graphs: Vec<String>,
    /// Parameters in listing order.
    pub parameters: Vec<ParamDescriptor>,
    /// Outputs in listing order.
    pub outputs: Vec<OutputDescriptor>,
    /// Parameter count per declared type.
    pub parameter_types: BTreeMap<String, usize>,
    /// Output count per channel.
    pub output_types: BTreeMap<String, usize>,
    /// One-line description.
    pub summary: String,
    /// Unparsed listing.
    pub raw: String,
}

impl ArchiveInfo {
    /// Parse the renderer's `info` listing.
    ///
    /// Lines containing `Graph:`, `Parameter:`/`Input:` or `Output:` (any case) are recognised;
    /// everything else is ignored.
    pub fn parse(file: FileFacts, stdout: &str) -> Self {
        let mut graphs = Vec::new();
        let mut parameters = Vec::new();
        let mut outputs = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            let lower = line.to_ascii_lowercase();
            if let Some(rest) = after_tag(line, &lower, &["graph:"]) {
                if !rest.is_empty() {
                    graphs.push(rest.to_string());
                }
            } else if let Some(rest) = after_tag(line, &lower, &["output:"]) {
                if let Some((name, attributes)) = split_descriptor(rest) {
                    let channel = Channel::from_file_name(Path::new(&name));
                    outputs.push(OutputDescriptor {
                        name,
                        channel,
                        attributes,
                    });
                }
            } else if let Some(rest) = after_tag(line, &lower, &["parameter:", "input:"]) {
                if let Some((name, attributes)) = split_descriptor(rest) {
                    parameters.push(ParamDescriptor { name, attributes });
                }
            }
        }

        let mut parameter_types = BTreeMap::new();
        for p in &parameters {
            let t = p.attributes.get("type").map_or("unknown", String::as_str);
            *parameter_types.entry(t.to_string()).or_insert(0) += 1;
        }
        let mut output_types = BTreeMap::new();
        for o in &outputs {
            *output_types.entry(o.channel.as_str().to_string()).or_insert(0) += 1;
        }

        let mut info = Self {
            file,
            graphs,
            parameters,
            outputs,
            parameter_types,
            output_types,
            summary: String::new(),
            raw: stdout.to_string(),
        };
        info.summary = info.render_summary();
        info
    }

    /// Parameter schema derived from the descriptors.
    ///
    /// Descriptors with an unsupported type are skipped; unparsable or inconsistent defaults
    /// and ranges are dropped rather than failing the whole schema.
    pub fn schema(&self) -> ParamSchema {
        let mut schema = ParamSchema::default();
        for p in &self.parameters {
            let Some(kind) = p.attributes.get("type").and_then(|t| parse_type(t)) else {
                continue;
            };
            let num = |k: &str| p.attributes.get(k).and_then(|v| v.parse::<f64>().ok());
            let (mut min, mut max) = (num("min"), num("max"));
            if let (Some(lo), Some(hi)) = (min, max)
                && lo > hi
            {
                (min, max) = (None, None);
            }
            let mut spec = ParamSpec {
                kind,
                default: None,
                min,
                max,
            };
            spec.default = p
                .attributes
                .get("default")
                .and_then(|d| parse_value(kind, d))
                .filter(|d| spec.check(&p.name, d).is_ok());
            schema.parameters.insert(p.name.clone(), spec);
        }
        schema
    }

    fn render_summary(&self) -> String {
        let mut s = String::new();
        let mb = self.file.size_bytes as f64 / (1024.0 * 1024.0);
        let _ = writeln!(s, "archive: {} ({mb:.2} MB)", self.file.name);
        let _ = writeln!(s, "graphs: {}", self.graphs.len());
        for g in &self.graphs {
            let _ = writeln!(s, "  - {g}");
        }
        let _ = writeln!(s, "parameters: {}", self.parameters.len());
        for (t, n) in &self.parameter_types {
            let _ = writeln!(s, "  - {t}: {n}");
        }
        let _ = writeln!(s, "outputs: {}", self.outputs.len());
        for (t, n) in &self.output_types {
            let _ = writeln!(s, "  - {t}: {n}");
        }
        s
    }
}

/// Text following the first of `tags` found in `lower` (the lowercased `line`).
fn after_tag<'a>(line: &'a str, lower: &str, tags: &[&str]) -> Option<&'a str> {
    tags.iter()
        .find_map(|t| lower.find(t).map(|i| line[i + t.len()..].trim()))
}

fn split_descriptor(rest: &str) -> Option<(String, BTreeMap<String, String>)> {
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?.to_string();
    let attributes = tokens
        .filter_map(|t| t.split_once('='))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();
    Some((name, attributes))
}

fn parse_type(t: &str) -> Option<ParamType> {
    match t.to_ascii_lowercase().as_str() {
        "float" | "float1" | "double" => Some(ParamType::Float),
        "int" | "int1" | "integer" => Some(ParamType::Int),
        "bool" | "boolean" => Some(ParamType::Bool),
        "string" => Some(ParamType::String),
        _ => None,
    }
}

fn parse_value(kind: ParamType, s: &str) -> Option<ParamValue> {
    match kind {
        ParamType::Float => s.parse().ok().map(ParamValue::Float),
        ParamType::Int => s.parse().ok().map(ParamValue::Int),
        ParamType::Bool => match s.to_ascii_lowercase().as_str() {
            "1" | "true" => Some(ParamValue::Bool(true)),
            "0" | "false" => Some(ParamValue::Bool(false)),
            _ => None,
        },
        ParamType::String => Some(ParamValue::Str(s.to_string())),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tool/info.rs"]
mod tests;
