//! Matflow runs material cook and render jobs through external tools, caching their outputs.
//!
//! A [`Session`] owns the configuration, the located tools and the content-addressed
//! [`CacheStore`]:
//!
//! - Resolve a render's parameters with [`ParameterResolver`]
//! - Cook (`.sbs` to `.sbsar`) or render (`.sbsar` to images) single jobs
//! - Run a [`BatchRequest`] of inputs times variants on a bounded worker pool
//!
//! Identical work is executed once: every job is fingerprinted before it runs, and
//! concurrent jobs with the same fingerprint wait for the first one to finish.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Batch requests, scheduling and results.
pub mod batch;
/// Fingerprint-keyed output cache.
pub mod cache;
/// Errors, core types and filesystem helpers.
pub mod foundation;
/// Jobs, fingerprints and single-stage execution.
pub mod job;
/// Output placement.
pub mod output;
/// Parameter schemas, resolution and image bindings.
pub mod params;
/// Session facade.
pub mod session;
/// Engine configuration.
pub mod settings;
/// External tool discovery, invocation and output classification.
pub mod tool;

pub use crate::foundation::core::{BitDepth, JobId, OperationKind, OperationMode, OutputFormat};
pub use crate::foundation::error::{MatflowError, MatflowResult};

pub use crate::batch::request::{BatchRequest, JobPlan, Variant, discover_inputs};
pub use crate::batch::result::{
    BatchResult, BatchStatus, BatchSummary, JobFailure, JobOutcome, StageReport,
};
pub use crate::batch::scheduler::BatchScheduler;
pub use crate::cache::store::{CacheLease, CacheStats, CacheStore, CacheTicket, Reservation};
pub use crate::job::fingerprint::{Fingerprint, ToolIdentity};
pub use crate::job::model::{CookSettings, Job, JobStatus, RenderSettings};
pub use crate::output::layout::{LayoutPolicy, PlacedFile};
pub use crate::params::binding::ImageBinding;
pub use crate::params::resolve::{
    ParamRequest, ParameterResolver, ParameterSet, Randomization, ResolvedParams, Seed,
};
pub use crate::params::schema::{ParamSchema, ParamSpec, ParamType, ParamValue};
pub use crate::session::{RenderOutput, RenderRequest, Session};
pub use crate::settings::Settings;
pub use crate::tool::classify::{Channel, ClassifiedFile};
pub use crate::tool::info::ArchiveInfo;
pub use crate::tool::invoker::{ProcessBackend, ToolBackend, ToolOutcome};
