use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::batch::request::{BatchRequest, JobPlan};
use crate::batch::result::{BatchResult, JobFailure, JobOutcome, StageReport};
use crate::foundation::core::OperationKind;
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::check_allowed;
use crate::job::model::{Job, JobStatus, material_name};
use crate::job::runner::{StageEnv, run_job};
use crate::params::binding::ImageBinding;
use crate::params::resolve::{ParamRequest, ParameterResolver, Randomization, ResolvedParams};
use crate::params::schema::ParamSchema;
use crate::tool::classify::Channel;

/// Runs batch requests on a bounded worker pool.
pub struct BatchScheduler<'a> {
    env: StageEnv<'a>,
    cancel: &'a AtomicBool,
}

impl<'a> BatchScheduler<'a> {
    /// `env.layout` is overridden per request by [`BatchRequest::layout`].
    pub fn new(env: StageEnv<'a>, cancel: &'a AtomicBool) -> Self {
        Self { env, cancel }
    }

    /// Run every job of `req` to a terminal state.
    ///
    /// Job failures are isolated and collected; only setup failures (no inputs, zero
    /// workers, a required tool missing) fail the whole call.
    #[tracing::instrument(level = "info", skip_all, fields(inputs = req.inputs.len(), variants = req.variants.len()))]
    pub fn run(&self, req: &BatchRequest) -> MatflowResult<BatchResult> {
        let plans = req.expand()?;
        if req.mode.cooks() {
            self.env.backend.identity(OperationKind::Cook)?;
        }
        if req.mode.renders() {
            self.env.backend.identity(OperationKind::Render)?;
        }
        let pool = build_thread_pool(req.max_workers)?;

        let env = StageEnv {
            layout: req.layout,
            ..self.env
        };
        let schema = req.schema.clone().unwrap_or_default();
        let outcomes = Mutex::new(Vec::with_capacity(plans.len()));

        tracing::info!(jobs = plans.len(), workers = req.max_workers, mode = ?req.mode, "starting batch");
        pool.install(|| {
            plans.par_iter().with_max_len(1).for_each(|plan| {
                let outcome = if self.cancel.load(Ordering::SeqCst) {
                    cancelled(plan)
                } else {
                    run_plan(&env, req, &schema, plan)
                };
                outcomes.lock().push(outcome);
            });
        });

        let result = BatchResult::from_outcomes(outcomes.into_inner());
        tracing::info!(
            status = ?result.status,
            succeeded = result.summary.succeeded,
            cached = result.summary.cached,
            failed = result.summary.failed,
            cancelled = result.summary.cancelled,
            "batch finished"
        );
        Ok(result)
    }
}

fn build_thread_pool(threads: usize) -> MatflowResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(MatflowError::validation("batch 'max_workers' must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("matflow-worker-{i}"))
        .build()
        .map_err(|e| MatflowError::validation(format!("failed to build worker pool: {e}")))
}

fn base_outcome(plan: &JobPlan, status: JobStatus) -> JobOutcome {
    JobOutcome {
        job_id: plan.id,
        input: plan.input.clone(),
        material: material_name(&plan.input),
        variant_index: plan.variant_index,
        status,
        stages: Vec::new(),
        seed: None,
        error: None,
    }
}

fn cancelled(plan: &JobPlan) -> JobOutcome {
    base_outcome(plan, JobStatus::Cancelled)
}

fn failed(mut outcome: JobOutcome, err: &MatflowError) -> JobOutcome {
    outcome.status = JobStatus::Failed;
    outcome.error = Some(JobFailure::new(outcome.job_id, err));
    outcome
}

/// Resolve, optionally cook, then optionally render one plan.
fn run_plan(
    env: &StageEnv<'_>,
    req: &BatchRequest,
    schema: &ParamSchema,
    plan: &JobPlan,
) -> JobOutcome {
    let mut outcome = base_outcome(plan, JobStatus::Running);

    // Parameters are resolved before either tool runs.
    let prepared = if req.mode.renders() {
        match prepare_render_inputs(env, req, schema, plan) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(job = %plan.id, error = %e, "job rejected before execution");
                return failed(outcome, &e);
            }
        }
    } else {
        None
    };

    let mut render_input = plan.input.clone();
    if req.mode.cooks() {
        let mut job = Job::cook(plan.id, &plan.input, &req.output_dir, req.cook.clone())
            .with_variant(plan.variant_index);
        let files = run_job(env, &mut job);
        let archive = files
            .iter()
            .find(|f| f.channel == Channel::Archive)
            .map(|f| f.path.clone());
        outcome.stages.push(StageReport::from_job(&job, files));
        if let Some(e) = job.error.take() {
            return failed(outcome, &e);
        }
        match archive {
            Some(path) => render_input = path,
            None if req.mode.renders() => {
                let e = MatflowError::ToolExecution {
                    code: Some(0),
                    stderr: "cook produced no archive to render".to_string(),
                    log: job.log.clone(),
                };
                return failed(outcome, &e);
            }
            None => {}
        }
    }

    if let Some((resolved, bindings)) = prepared {
        outcome.seed = resolved.seed;
        let mut job = Job::render(
            plan.id,
            render_input,
            &req.output_dir,
            resolved.values,
            req.render.clone(),
        )
        .with_variant(plan.variant_index)
        .with_preset(resolved.preset)
        .with_bindings(bindings);
        let files = run_job(env, &mut job);
        outcome.stages.push(StageReport::from_job(&job, files));
        if let Some(e) = job.error.take() {
            return failed(outcome, &e);
        }
    }

    outcome.status = if outcome
        .stages
        .iter()
        .all(|s| s.status == JobStatus::CacheHit)
    {
        JobStatus::CacheHit
    } else {
        JobStatus::Succeeded
    };
    outcome
}

/// Resolve the variant's parameters and stage its image bindings.
///
/// Nothing is written under the output directory unless it passes the allow-list.
fn prepare_render_inputs(
    env: &StageEnv<'_>,
    req: &BatchRequest,
    schema: &ParamSchema,
    plan: &JobPlan,
) -> MatflowResult<(ResolvedParams, Vec<ImageBinding>)> {
    let randomization = req.randomization.map(|r| Randomization {
        seed: r.seed.for_variant(plan.variant_index.unwrap_or(0)),
        strength: r.strength,
    });
    let params = ParamRequest {
        preset: req.preset.clone(),
        overrides: plan.overrides.clone(),
        randomization,
    };

    check_allowed(&req.output_dir, env.allowed_dirs)?;
    let mut bindings = Vec::with_capacity(req.image_inputs.len());
    for (name, source) in &req.image_inputs {
        bindings.push(ImageBinding::stage(
            name,
            source,
            &req.output_dir,
            &format!("job{}", plan.id.0),
        )?);
    }

    let resolved = ParameterResolver::new(schema).resolve(&params, &bindings)?;
    Ok((resolved, bindings))
}
