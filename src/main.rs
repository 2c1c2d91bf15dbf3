//! Lens CLI
//!
//! Entry point for the `lens` command-line tool.

use clap::{Parser, Subcommand};
use lens::config::EffectiveConfig;
use lens::jobs::{run_internal_coverage, CoverageJob, Dispatcher, ExecutionMode, JobError};
use lens::{Cacher, LensError};
use lens_protocol::split_flag;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::panic;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LENS_LOG";

#[derive(Parser)]
#[command(name = "lens")]
#[command(about = "Incremental analysis cache and coverage jobs for PHP projects", version)]
struct Cli {
    /// Path to the project config file (default: ./lens.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the generated-code cache up to date
    Cache {
        /// Source root (overrides paths.src)
        #[arg(long)]
        src: Option<PathBuf>,

        /// Cache root (overrides paths.cache)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Output the summary in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the executable lines of source files
    Coverage {
        /// Execution mode (overrides jobs.mode)
        #[arg(long, value_parser = ["in_process", "subprocess"])]
        mode: Option<String>,

        /// Worker threads (overrides jobs.workers)
        #[arg(long)]
        workers: Option<usize>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    init_logging();
    // Panics are reported once, through the error boundary below.
    panic::set_hook(Box::new(|info| tracing::debug!(%info, "panicked")));

    let code = match panic::catch_unwind(dispatch) {
        Ok(code) => code,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            report(&LensError::Panicked(message))
        }
    };
    process::exit(code);
}

fn dispatch() -> i32 {
    // The subprocess form of a coverage job bypasses argument parsing so the
    // payload reaches the decoder untouched.
    if let Some(payload) = env::args().nth(1).as_deref().and_then(split_flag) {
        return run_internal(payload);
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Cache { src, cache, json } => run_cache(cli.config, src, cache, json),
        Commands::Coverage {
            mode,
            workers,
            files,
        } => run_coverage(cli.config, mode, workers, files),
    };

    match result {
        Ok(()) => 0,
        Err(e) => report(&e),
    }
}

/// Print `Error <code>: <message>` and return the code.
fn report(e: &LensError) -> i32 {
    eprintln!("Error {}: {}", e.code(), e);
    e.code()
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_internal(payload: &str) -> i32 {
    let response = run_internal_coverage(payload);
    match response.to_line() {
        Ok(line) => {
            println!("{}", line);
            if response.ok {
                0
            } else {
                1
            }
        }
        Err(e) => report(&LensError::from(e)),
    }
}

fn load_config(config: Option<PathBuf>, overrides: Map<String, Value>) -> Result<EffectiveConfig, LensError> {
    let cli = (!overrides.is_empty()).then(|| Value::Object(overrides));
    Ok(EffectiveConfig::build(Path::new("."), config.as_deref(), cli)?)
}

fn run_cache(
    config: Option<PathBuf>,
    src: Option<PathBuf>,
    cache: Option<PathBuf>,
    json: bool,
) -> Result<(), LensError> {
    let mut paths = Map::new();
    if let Some(src) = src {
        paths.insert("src".to_string(), json!(absolute(&src)?));
    }
    if let Some(cache) = cache {
        paths.insert("cache".to_string(), json!(absolute(&cache)?));
    }
    let mut overrides = Map::new();
    if !paths.is_empty() {
        overrides.insert("paths".to_string(), Value::Object(paths));
    }

    let config = load_config(config, overrides)?;
    let summary = Cacher::from_config(&config).update(
        &config.project_root,
        &config.source_root(),
        &config.cache_root(),
    )?;

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(lens_protocol::ProtocolError::from)?;
        println!("{}", rendered);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

fn run_coverage(
    config: Option<PathBuf>,
    mode: Option<String>,
    workers: Option<usize>,
    files: Vec<PathBuf>,
) -> Result<(), LensError> {
    let mut jobs = Map::new();
    if let Some(mode) = mode {
        jobs.insert("mode".to_string(), json!(mode));
    }
    if let Some(workers) = workers {
        jobs.insert("workers".to_string(), json!(workers));
    }
    let mut overrides = Map::new();
    if !jobs.is_empty() {
        overrides.insert("jobs".to_string(), Value::Object(jobs));
    }

    let config = load_config(config, overrides)?;
    let executable = env::current_exe()?;
    let core = absolute(&config.core_root())?;
    let cache = absolute(&config.cache_root())?;

    let mut dispatcher = Dispatcher::from_config(&config);
    let mut submitted = Vec::with_capacity(files.len());
    for file in files {
        // The subprocess runs from the core root, so paths must not be relative.
        let path = file.canonicalize().map_err(|source| JobError::Source {
            path: file.clone(),
            source,
        })?;
        let job = CoverageJob::new(executable.clone(), core.clone(), cache.clone(), path);
        submitted.push((file, dispatcher.submit(job)));
    }

    if config.settings.jobs.mode == ExecutionMode::Subprocess {
        tracing::debug!(executable = %executable.display(), "running coverage jobs in subprocesses");
    }
    dispatcher.run()?;

    let mut lines = BTreeMap::new();
    for (file, id) in submitted {
        match dispatcher.take_result(&id) {
            Some(Ok(result)) => {
                lines.insert(file.to_string_lossy().into_owned(), result);
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(JobError::UnknownJob(id).into()),
        }
    }

    let rendered = serde_json::to_string_pretty(&lines).map_err(lens_protocol::ProtocolError::from)?;
    println!("{}", rendered);
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, LensError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
