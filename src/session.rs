use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::batch::request::BatchRequest;
use crate::batch::result::{BatchResult, StageReport};
use crate::batch::scheduler::BatchScheduler;
use crate::cache::store::CacheStore;
use crate::foundation::core::{JobId, OperationMode};
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::check_allowed;
use crate::job::model::Job;
use crate::job::runner::{StageEnv, run_job};
use crate::output::layout::PlacedFile;
use crate::params::binding::ImageBinding;
use crate::params::resolve::{ParamRequest, ParameterResolver, ResolvedParams};
use crate::params::schema::ParamSchema;
use crate::settings::Settings;
use crate::tool::info::{ArchiveInfo, FileFacts};
use crate::tool::invoker::{ProcessBackend, ToolBackend};

/// One render of one archive.
#[derive(Clone, Debug, Default)]
pub struct RenderRequest {
    /// Archive to render.
    pub input: PathBuf,
    /// Base directory for placed outputs.
    pub output_dir: PathBuf,
    /// Preset, overrides and randomization.
    pub params: ParamRequest,
    /// Declarations to validate against; `None` passes every name through.
    pub schema: Option<ParamSchema>,
    /// Entry name to host-provided image.
    pub image_inputs: BTreeMap<String, PathBuf>,
}

/// Result of [`Session::render`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RenderOutput {
    /// Parameters the render ran with.
    pub params: ResolvedParams,
    /// What the render stage did.
    pub stage: StageReport,
}

/// Entry point owning configuration, tools, the cache and the cancellation flag.
///
/// All operations take `&self`; a session may be shared across threads.
pub struct Session<B: ToolBackend = ProcessBackend> {
    settings: Settings,
    backend: B,
    cache: CacheStore,
    cancel: Arc<AtomicBool>,
    staging_seq: AtomicU32,
}

impl Session<ProcessBackend> {
    /// Discover the external tools and open the cache described by `settings`.
    pub fn open(settings: Settings) -> MatflowResult<Self> {
        let backend = settings.tool_paths.backend();
        Self::with_backend(settings, backend)
    }
}

impl<B: ToolBackend> Session<B> {
    /// Open the cache described by `settings` and run tools through `backend`.
    pub fn with_backend(settings: Settings, backend: B) -> MatflowResult<Self> {
        settings.validate()?;
        let cache = CacheStore::open(settings.cache.root(), settings.cache.budget_bytes())?;
        Ok(Self {
            settings,
            backend,
            cache,
            cancel: Arc::new(AtomicBool::new(false)),
            staging_seq: AtomicU32::new(0),
        })
    }

    /// Configuration the session was opened with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Tool executor.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Output cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Flag that, once set, makes running batches skip their not-yet-started jobs.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn env(&self) -> StageEnv<'_> {
        StageEnv {
            backend: &self.backend,
            cache: &self.cache,
            layout: self.settings.batch.layout(),
            allowed_dirs: &self.settings.security.restrict_to_directories,
        }
    }

    /// Cook one `.sbs` source into `output_dir`.
    pub fn cook(&self, input: &Path, output_dir: &Path) -> MatflowResult<StageReport> {
        let mut job = Job::cook(JobId(0), input, output_dir, self.settings.cook.clone());
        let files = run_job(&self.env(), &mut job);
        finish(job, files)
    }

    /// Resolve parameters, stage image inputs and render one archive.
    pub fn render(&self, req: &RenderRequest) -> MatflowResult<RenderOutput> {
        check_allowed(&req.output_dir, &self.settings.security.restrict_to_directories)?;
        let tag = format!("render{}", self.staging_seq.fetch_add(1, Ordering::Relaxed));
        let mut bindings = Vec::with_capacity(req.image_inputs.len());
        for (name, source) in &req.image_inputs {
            bindings.push(ImageBinding::stage(name, source, &req.output_dir, &tag)?);
        }

        let fallback = ParamSchema::default();
        let schema = req.schema.as_ref().unwrap_or(&fallback);
        let params = self.resolve_params(schema, &req.params, &bindings)?;

        let mut job = Job::render(
            JobId(0),
            &req.input,
            &req.output_dir,
            params.values.clone(),
            self.settings.render.clone(),
        )
        .with_preset(params.preset.clone())
        .with_bindings(bindings);
        let files = run_job(&self.env(), &mut job);
        let stage = finish(job, files)?;
        Ok(RenderOutput { params, stage })
    }

    /// Merge defaults, preset, randomization and overrides without running anything.
    pub fn resolve_params(
        &self,
        schema: &ParamSchema,
        req: &ParamRequest,
        bindings: &[ImageBinding],
    ) -> MatflowResult<ResolvedParams> {
        ParameterResolver::new(schema).resolve(req, bindings)
    }

    /// A batch request for `inputs` carrying this session's configured defaults.
    pub fn batch_request(&self, inputs: Vec<PathBuf>) -> BatchRequest {
        BatchRequest {
            inputs,
            mode: OperationMode::CookAndRender,
            max_workers: self.settings.batch.max_workers,
            layout: self.settings.batch.layout(),
            cook: self.settings.cook.clone(),
            render: self.settings.render.clone(),
            ..BatchRequest::default()
        }
    }

    /// Run every job of `req`; see [`BatchScheduler::run`].
    pub fn run_batch(&self, req: &BatchRequest) -> MatflowResult<BatchResult> {
        BatchScheduler::new(self.env(), &self.cancel).run(req)
    }

    /// Describe an archive's graphs, parameters and outputs.
    pub fn info(&self, archive: &Path) -> MatflowResult<ArchiveInfo> {
        if !archive.is_file() {
            return Err(MatflowError::input_not_found(archive));
        }
        let facts = FileFacts::read(archive)?;
        let listing = self.backend.info(archive)?;
        Ok(ArchiveInfo::parse(facts, &listing))
    }
}

fn finish(mut job: Job, files: Vec<PlacedFile>) -> MatflowResult<StageReport> {
    match job.error.take() {
        Some(e) => Err(e),
        None => Ok(StageReport::from_job(&job, files)),
    }
}
