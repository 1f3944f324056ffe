mod config;
mod config_cmd;
mod run;

use clap::{Args, Parser, Subcommand, ValueEnum};
use config::{Config, ConfigError, ConfigPaths, Profile};
use recap_core::complete::create_completion_provider;
use recap_core::language::Language;
use recap_core::notes::{NoteWriter, NotesOptions, Task};
use recap_core::{CancelToken, ReduceError, ServiceError};
use run::{RunError, RunMetadata, RunRecord, RunStatus};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "recap",
    version = recap_core::version(),
    about = "chunked reduction of long transcripts"
)]
struct Cli {
    /// Log debug detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a transcript
    Summarize(SummarizeArgs),
    /// Clean up a raw transcript into readable paragraphs
    Optimize(OptimizeArgs),
    /// Translate a transcript
    Translate(TranslateArgs),
    /// Show how an input would be reduced, without calling a provider
    Plan(PlanArgs),
    Config(config_cmd::ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Input file, or - for stdin
    input: String,

    /// Write the result here instead of stdout
    #[arg(long, short, value_name = "path")]
    out: Option<PathBuf>,

    /// Provider profile
    #[arg(long, value_enum)]
    provider: Option<Profile>,

    /// Model override for the selected profile
    #[arg(long, value_name = "model")]
    model: Option<String>,

    /// Largest chunk in characters
    #[arg(long, value_name = "n")]
    max_chars: Option<usize>,

    /// Concurrent provider calls
    #[arg(long, value_name = "n")]
    concurrency: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct SummarizeArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Summary language (defaults to notes.language)
    #[arg(long)]
    lang: Option<Language>,

    /// Title heading for the summary
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct OptimizeArgs {
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug, Clone)]
struct TranslateArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Target language
    #[arg(long)]
    to: Language,

    /// Source language (detected when omitted)
    #[arg(long)]
    from: Option<Language>,
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    /// Input file, or - for stdin
    input: String,

    /// Task whose thresholds to plan with
    #[arg(long, value_enum, default_value_t = PlanTask::Summarize)]
    task: PlanTask,

    /// Largest chunk in characters
    #[arg(long, value_name = "n")]
    max_chars: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanTask {
    Summarize,
    Optimize,
    Translate,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Run(#[from] RunError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("provider init failed: {0}")]
    Provider(ServiceError),
    #[error("{0}")]
    Reduce(#[from] ReduceError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Reduce(ReduceError::Cancelled) => EXIT_CANCELLED,
            _ => 1,
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(profile) = self.provider {
            config.provider.active = profile;
        }
        if let Some(model) = &self.model {
            config.provider.active_profile_mut().model = model.clone();
        }
        if let Some(max_chars) = self.max_chars {
            config.reduce.max_chars_per_chunk = max_chars;
        }
        if let Some(concurrency) = self.concurrency {
            config.reduce.max_concurrency = concurrency;
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("recap=debug,recap_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("recap=info,recap_core=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = match ConfigPaths::from_home() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("config paths error: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Config(args) => config_cmd::run(&args, &paths).map_err(CliError::from),
        Command::Plan(args) => load_config(&paths).and_then(|config| plan(&args, &config)),
        Command::Summarize(args) => load_config(&paths).and_then(|config| {
            let task = Task::Summarize {
                language: args.lang.unwrap_or(config.notes.language),
                title: args.title.clone(),
            };
            run_task(task, &args.run, &paths, config)
        }),
        Command::Optimize(args) => {
            load_config(&paths).and_then(|config| run_task(Task::Optimize, &args.run, &paths, config))
        }
        Command::Translate(args) => load_config(&paths).and_then(|config| {
            let task = Task::Translate {
                source: args.from,
                target: args.to,
            };
            run_task(task, &args.run, &paths, config)
        }),
    };

    if let Err(err) = result {
        eprintln!("recap failed: {err}");
        std::process::exit(err.exit_code());
    }
}

fn load_config(paths: &ConfigPaths) -> Result<Config, CliError> {
    let mut config = Config::load_or_create(paths)?;
    config.apply_env_overrides(env_lookup);
    Ok(config)
}

fn plan(args: &PlanArgs, config: &Config) -> Result<(), CliError> {
    let mut options = config.notes_options();
    if let Some(max_chars) = args.max_chars {
        options.max_chars_per_chunk = max_chars;
    }
    let input = read_input(&args.input)?;
    let task = match args.task {
        PlanTask::Summarize => Task::Summarize {
            language: config.notes.language,
            title: None,
        },
        PlanTask::Optimize => Task::Optimize,
        PlanTask::Translate => Task::Translate {
            source: None,
            target: config.notes.language,
        },
    };
    print!("{}", render_plan(&options, &task, &input)?);
    Ok(())
}

fn render_plan(options: &NotesOptions, task: &Task, input: &str) -> Result<String, CliError> {
    let plan = options.plan(task, input)?;
    let mut out = format!(
        "task: {}\nmode: {}\ncost: {}\nchunks: {}\n",
        task.name(),
        plan.mode.as_str(),
        plan.cost,
        plan.chunks.len()
    );
    for chunk in &plan.chunks {
        out.push_str(&format!(
            "  [{}] {} chars\n",
            chunk.index + 1,
            chunk.text.chars().count()
        ));
    }
    Ok(out)
}

fn run_task(
    task: Task,
    args: &RunArgs,
    paths: &ConfigPaths,
    mut config: Config,
) -> Result<(), CliError> {
    args.apply(&mut config);
    config.validate()?;
    let input = read_input(&args.input)?;

    let settings = config
        .provider
        .active_profile()
        .settings(config.call_timeout());
    let provider = create_completion_provider(&settings).map_err(CliError::Provider)?;
    tracing::info!(
        task = task.name(),
        provider = provider.name(),
        model = provider.model(),
        "starting"
    );

    let cancel = CancelToken::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag())?;
    }

    let record = if config.runs.record {
        let metadata = RunMetadata::new(task.name(), provider.name(), provider.model())?;
        Some(RunRecord::start(paths, metadata, &input)?)
    } else {
        None
    };

    let writer = NoteWriter::new(Arc::clone(&provider), config.notes_options());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(writer.run(&task, &input, &cancel));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(outcome) => {
            if let Some(reduction) = &outcome.reduction
                && reduction.is_degraded()
            {
                tracing::warn!(
                    failed = ?reduction.failed_chunks,
                    total = reduction.chunk_count,
                    "some chunks used fallback text"
                );
            }
            write_output(args.out.as_deref(), &outcome.text)?;
            if let Some(record) = record {
                let dir = record.dir().to_path_buf();
                record.finish(outcome.reduction.as_ref(), &outcome.text)?;
                tracing::debug!(dir = %dir.display(), "run recorded");
            }
            Ok(())
        }
        Err(err) => {
            tracing::error!(stage = err.stage(), error = %err, "reduction failed");
            if let Some(record) = record {
                let status = match err {
                    ReduceError::Cancelled => RunStatus::Cancelled,
                    _ => RunStatus::Failed,
                };
                if let Err(record_err) = record.fail(status, &err.to_string()) {
                    tracing::warn!(error = %record_err, "failed to record run");
                }
            }
            Err(err.into())
        }
    }
}

fn read_input(source: &str) -> Result<String, CliError> {
    if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(source)?)
}

fn write_output(out: Option<&Path>, text: &str) -> Result<(), CliError> {
    match out {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
