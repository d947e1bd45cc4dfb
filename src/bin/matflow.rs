use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use matflow::{
    BatchStatus, OperationMode, ParamRequest, ParamSchema, ParamValue, ParameterResolver,
    Randomization, RenderRequest, Seed, Session, Settings, discover_inputs,
};

#[derive(Parser, Debug)]
#[command(name = "matflow", version, about = "Cook, render and batch-process material archives")]
struct Cli {
    /// Settings file (defaults to $MATFLOW_CONFIG, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of settings.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cook a .sbs source into a .sbsar archive.
    Cook {
        input: PathBuf,
        #[arg(long, short, default_value = "output")]
        output: PathBuf,
    },
    /// Render a .sbsar archive into texture maps.
    Render(RenderArgs),
    /// Resolve parameters against a schema without running any tool.
    Params(ParamArgs),
    /// Run a batch request (JSON) of inputs times variants.
    Batch(BatchArgs),
    /// Describe an archive's graphs, parameters and outputs.
    Info {
        archive: PathBuf,
        /// Print only the derived parameter schema.
        #[arg(long)]
        schema: bool,
    },
    /// Inspect or empty the output cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Clear,
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// Parameter schema JSON.
    #[arg(long)]
    schema: Option<PathBuf>,

    #[arg(long)]
    preset: Option<String>,

    /// Override as NAME=VALUE; VALUE is parsed as JSON, falling back to a string.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Randomize eligible numeric parameters.
    #[arg(long)]
    randomize: bool,

    /// Randomization seed; negative draws a fresh one.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    seed: i64,

    #[arg(long, default_value_t = 0.5)]
    strength: f64,
}

#[derive(Args, Debug)]
struct RenderArgs {
    archive: PathBuf,

    #[arg(long, short, default_value = "output")]
    output: PathBuf,

    #[command(flatten)]
    params: ParamArgs,

    /// Image input as NAME=PATH.
    #[arg(long = "image", value_name = "NAME=PATH")]
    images: Vec<String>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Batch request JSON; keys it omits come from settings.
    request: Option<PathBuf>,

    /// Discover inputs in this directory instead of listing them in the request.
    #[arg(long)]
    input_dir: Option<PathBuf>,

    #[arg(long, default_value = "*")]
    pattern: String,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Cook,
    Render,
    CookAndRender,
}

impl From<ModeArg> for OperationMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Cook => OperationMode::CookOnly,
            ModeArg::Render => OperationMode::RenderOnly,
            ModeArg::CookAndRender => OperationMode::CookAndRender,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings, cli.verbose)?;

    match cli.cmd {
        Command::Params(args) => cmd_params(&args),
        Command::Cook { input, output } => {
            let session = Session::open(settings)?;
            print_json(&session.cook(&input, &output)?)
        }
        Command::Render(args) => cmd_render(settings, args),
        Command::Batch(args) => cmd_batch(settings, &args),
        Command::Info { archive, schema } => {
            let session = Session::open(settings)?;
            let info = session.info(&archive)?;
            if schema {
                print_json(&info.schema())
            } else {
                print_json(&info)
            }
        }
        Command::Cache { action } => {
            let session = Session::open(settings)?;
            match action {
                CacheAction::Stats => print_json(&session.cache().stats()),
                CacheAction::Clear => {
                    let removed = session.cache().clear()?;
                    print_json(&serde_json::json!({ "removed": removed }))
                }
            }
        }
    }
}

fn init_tracing(settings: &Settings, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.logging.level))
            .with_context(|| format!("invalid log level '{}'", settings.logging.level))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize result")?;
    println!("{text}");
    Ok(())
}

fn split_pair(arg: &str) -> anyhow::Result<(&str, &str)> {
    arg.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .with_context(|| format!("expected NAME=VALUE, got '{arg}'"))
}

fn parse_value(raw: &str) -> ParamValue {
    serde_json::from_str(raw).unwrap_or_else(|_| ParamValue::Str(raw.to_string()))
}

fn load_schema(path: Option<&Path>) -> anyhow::Result<Option<ParamSchema>> {
    Ok(match path {
        Some(p) => Some(ParamSchema::from_path(p)?),
        None => None,
    })
}

fn param_request(args: &ParamArgs) -> anyhow::Result<ParamRequest> {
    let mut overrides = BTreeMap::new();
    for arg in &args.set {
        let (name, raw) = split_pair(arg)?;
        overrides.insert(name.to_string(), parse_value(raw));
    }
    let randomization = args.randomize.then(|| Randomization {
        seed: Seed::from_i64(args.seed),
        strength: args.strength,
    });
    Ok(ParamRequest {
        preset: args.preset.clone(),
        overrides,
        randomization,
    })
}

fn cmd_params(args: &ParamArgs) -> anyhow::Result<()> {
    let schema = load_schema(args.schema.as_deref())?.unwrap_or_default();
    let resolved = ParameterResolver::new(&schema).resolve(&param_request(args)?, &[])?;
    print_json(&resolved)
}

fn cmd_render(settings: Settings, args: RenderArgs) -> anyhow::Result<()> {
    let mut image_inputs = BTreeMap::new();
    for arg in &args.images {
        let (name, path) = split_pair(arg)?;
        image_inputs.insert(name.to_string(), PathBuf::from(path));
    }
    let req = RenderRequest {
        params: param_request(&args.params)?,
        schema: load_schema(args.params.schema.as_deref())?,
        input: args.archive,
        output_dir: args.output,
        image_inputs,
    };
    let session = Session::open(settings)?;
    print_json(&session.render(&req)?)
}

fn cmd_batch(settings: Settings, args: &BatchArgs) -> anyhow::Result<()> {
    let session = Session::open(settings)?;

    let mut merged = serde_json::to_value(session.batch_request(Vec::new()))?;
    if let Some(path) = &args.request {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read batch request '{}'", path.display()))?;
        let overlay: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parse batch request '{}'", path.display()))?;
        merge_json(&mut merged, overlay);
    }
    let mut req: matflow::BatchRequest =
        serde_json::from_value(merged).context("invalid batch request")?;

    if let Some(mode) = args.mode {
        req.mode = mode.into();
    }
    if let Some(dir) = &args.input_dir {
        req.inputs = discover_inputs(dir, &args.pattern, req.mode)?;
    }

    let result = session.run_batch(&req)?;
    print_json(&result)?;
    if result.status != BatchStatus::Success {
        anyhow::bail!(
            "batch {:?}: {} of {} jobs failed, {} cancelled",
            result.status,
            result.summary.failed,
            result.summary.total,
            result.summary.cancelled
        );
    }
    Ok(())
}

/// Recursively overlay `patch` onto `base`; objects merge key by key, anything else replaces.
fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(b), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                match b.get_mut(&k) {
                    Some(slot) => merge_json(slot, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}
