use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::file_sha256;
use crate::job::model::{Job, JobSettings};
use crate::params::schema::ParamValue;

const XXH3_SEED: u64 = 0x6d61_7466_6c6f_7731;
const FORMAT_TAG: &str = "matflow-job-v1";

/// Cache key of a job: a 128-bit digest over everything that affects its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

impl FromStr for Fingerprint {
    type Err = MatflowError;

    fn from_str(s: &str) -> MatflowResult<Self> {
        let bad = || MatflowError::cache(format!("malformed fingerprint '{s}'"));
        if s.len() != 32 || !s.is_ascii() {
            return Err(bad());
        }
        let hi = u64::from_str_radix(&s[..16], 16).map_err(|_| bad())?;
        let lo = u64::from_str_radix(&s[16..], 16).map_err(|_| bad())?;
        Ok(Self { hi, lo })
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolved executable plus the version it reported.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ToolIdentity {
    /// Executable path.
    pub path: PathBuf,
    /// First line of `--version`, or `unknown`.
    pub version: String,
}

/// Fingerprint `job` as executed by `tool`.
///
/// Covers the tool identity, operation kind, input content (not its path), every parameter
/// in name order, the preset, image bindings by name and content, and the output-affecting
/// settings. Memory budget, cpu count and timeouts are left out.
pub fn fingerprint_job(tool: &ToolIdentity, job: &Job) -> MatflowResult<Fingerprint> {
    let mut h = StableHasher::new();
    h.write_str(FORMAT_TAG);
    h.write_str(&tool.path.to_string_lossy());
    h.write_str(&tool.version);
    h.write_str(job.kind().as_str());
    h.write_bytes(&file_sha256(&job.input)?);

    match &job.settings {
        JobSettings::Cook(c) => {
            h.write_u8(c.optimization_level);
            h.write_bool(c.enable_icons);
            h.write_bool(c.merge_graphs);
        }
        JobSettings::Render(r) => {
            h.write_str(r.output_format.as_str());
            h.write_str(r.bit_depth.as_str());
            write_opt_u32(&mut h, r.resolution);
            write_opt_str(&mut h, r.graph.as_deref());
            write_opt_str(&mut h, r.graph_output.as_deref());
        }
    }

    h.write_u32(job.params.len() as u32);
    for (name, value) in job.params.iter() {
        h.write_str(name);
        write_value(&mut h, value);
    }
    write_opt_str(&mut h, job.preset.as_deref());

    let mut bindings: Vec<_> = job.bindings.iter().collect();
    bindings.sort_by(|a, b| a.name().cmp(b.name()));
    h.write_u32(bindings.len() as u32);
    for b in bindings {
        h.write_str(b.name());
        h.write_bytes(&file_sha256(b.path())?);
    }

    Ok(h.finish())
}

fn write_value(h: &mut StableHasher, v: &ParamValue) {
    match v {
        ParamValue::Bool(b) => {
            h.write_u8(0);
            h.write_bool(*b);
        }
        ParamValue::Int(i) => {
            h.write_u8(1);
            h.write_u64(*i as u64);
        }
        ParamValue::Float(f) => {
            h.write_u8(2);
            // Fold -0.0 onto 0.0 so equal values hash equally.
            h.write_f64(if *f == 0.0 { 0.0 } else { *f });
        }
        ParamValue::Str(s) => {
            h.write_u8(3);
            h.write_str(s);
        }
    }
}

fn write_opt_u32(h: &mut StableHasher, v: Option<u32>) {
    match v {
        Some(v) => {
            h.write_u8(1);
            h.write_u32(v);
        }
        None => h.write_u8(0),
    }
}

fn write_opt_str(h: &mut StableHasher, v: Option<&str>) {
    match v {
        Some(v) => {
            h.write_u8(1);
            h.write_str(v);
        }
        None => h.write_u8(0),
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/fingerprint.rs"]
mod tests;
