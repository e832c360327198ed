mod config;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use haystack_bench::{
    parse_ids, run_model, BenchConfig, ExperimentContext, ModelReport, NeedleExperiment,
    NeedleMode, REGISTRY,
};
use haystack_cache::ResponseCache;
use haystack_client::OllamaClient;
use haystack_core::{LlmClient, ResultDocument};

#[derive(Parser)]
#[command(
    name = "haystack",
    version,
    about = "Needle-in-a-haystack and long-context benchmarks for local LLMs"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run experiments against one or more models
    Run {
        /// Models to test (comma-separated). Default: `run.models` from config
        #[arg(short, long)]
        models: Option<String>,

        /// Experiment ids (comma-separated)
        #[arg(short, long, default_value = "1,2,3,4")]
        experiments: String,

        /// Mode for the needle experiment
        #[arg(long, default_value = "quick")]
        mode: CliMode,

        /// One process per model, at most `run.max_processes` at a time
        #[arg(long)]
        parallel: bool,
    },

    /// Run the needle experiment for a single model
    Needle {
        /// Model to test
        #[arg(short, long)]
        model: String,

        #[arg(long, default_value = "info-retrieval")]
        mode: CliMode,

        /// Results file. Default: `<results_dir>/<mode>_<model>_results.json`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge needle result files into a single document
    Merge {
        /// Result files to merge
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Merged output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List registered experiments
    Experiments,

    /// Show the active configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    /// Fact embedded in generated filler text
    Quick,
    /// Length × position sweep asking for the secret
    #[value(alias = "info_retrieval")]
    InfoRetrieval,
    /// Length × position sweep asking for the odd sentence
    #[value(alias = "anomaly_detection")]
    AnomalyDetection,
}

impl CliMode {
    fn as_arg(self) -> &'static str {
        match self {
            CliMode::Quick => "quick",
            CliMode::InfoRetrieval => "info-retrieval",
            CliMode::AnomalyDetection => "anomaly-detection",
        }
    }
}

impl From<CliMode> for NeedleMode {
    fn from(val: CliMode) -> Self {
        match val {
            CliMode::Quick => NeedleMode::Quick,
            CliMode::InfoRetrieval => NeedleMode::InfoRetrieval,
            CliMode::AnomalyDetection => NeedleMode::AnomalyDetection,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            models,
            experiments,
            mode,
            parallel,
        } => cmd_run(config_path, models, &experiments, mode, parallel),
        Commands::Needle {
            model,
            mode,
            output,
        } => cmd_needle(config_path, &model, mode.into(), output),
        Commands::Merge { files, output } => cmd_merge(&files, &output),
        Commands::Experiments => cmd_experiments(),
        Commands::Config => cmd_config(config_path),
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn make_client(cfg: &config::Config, model: &str) -> Result<Arc<dyn LlmClient>> {
    let cache = cfg.cache_dir().map(ResponseCache::new);
    if let Some(c) = &cache {
        info!(dir = %c.root().display(), "response cache enabled");
    }
    let client = OllamaClient::new(model, &cfg.server, cache)
        .with_context(|| format!("cannot create client for {model}"))?;
    Ok(Arc::new(client))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(
    config_path: Option<&Path>,
    models: Option<String>,
    experiments: &str,
    mode: CliMode,
    parallel: bool,
) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let ids = parse_ids(experiments)?;
    if ids.is_empty() {
        bail!("no experiments selected");
    }
    let models = match models {
        Some(list) => split_list(&list),
        None => cfg.bench.run.models.clone(),
    };
    if models.is_empty() {
        bail!("no models to test");
    }

    if parallel && models.len() > 1 {
        return run_parallel(
            config_path,
            &models,
            experiments,
            mode,
            cfg.bench.run.max_processes,
        );
    }

    let bench: Arc<BenchConfig> = Arc::new(cfg.bench.clone());
    let mut failed = Vec::new();
    for model in &models {
        let outcome = make_client(&cfg, model).and_then(|client| {
            let ctx = ExperimentContext::new(model.clone(), client, Arc::clone(&bench))
                .with_needle_mode(mode.into());
            Ok(run_model(&ctx, &ids)?)
        });
        match outcome {
            Ok(report) => print_report(&report),
            Err(e) => {
                error!(%model, error = %e, "model run failed");
                failed.push(model.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} model(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn print_report(report: &ModelReport) {
    println!("== {} ==", report.model);
    for (key, value) in &report.outputs {
        println!("  ok     {key}");
        if key == "exp1_needle" {
            if let Ok(doc) = serde_json::from_value::<ResultDocument>(value.clone()) {
                for line in doc.summary().to_string().lines() {
                    println!("         {line}");
                }
            }
        }
    }
    for (key, err) in &report.failures {
        println!("  FAILED {key}: {err}");
    }
}

/// Re-invoke this binary once per model, at most `max_processes` at a time.
fn run_parallel(
    config_path: Option<&Path>,
    models: &[String],
    experiments: &str,
    mode: CliMode,
    max_processes: usize,
) -> Result<()> {
    let exe = std::env::current_exe().context("cannot determine haystack binary path")?;
    let queue = Mutex::new(models.iter().cloned().collect::<VecDeque<_>>());
    let failures = Mutex::new(Vec::new());
    let workers = max_processes.clamp(1, models.len());
    info!(models = models.len(), workers, "running models in parallel");

    std::thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| loop {
                let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                let Some(model) = next else {
                    break;
                };

                let mut cmd = Command::new(&exe);
                if let Some(p) = config_path {
                    cmd.arg("--config").arg(p);
                }
                cmd.args([
                    "run",
                    "--models",
                    &model,
                    "--experiments",
                    experiments,
                    "--mode",
                    mode.as_arg(),
                ]);

                info!(%model, "model process started");
                let failed = match cmd.status() {
                    Ok(status) if status.success() => {
                        info!(%model, "model process finished");
                        false
                    }
                    Ok(status) => {
                        error!(%model, %status, "model process failed");
                        true
                    }
                    Err(e) => {
                        error!(%model, error = %e, "cannot spawn model process");
                        true
                    }
                };
                if failed {
                    if let Ok(mut f) = failures.lock() {
                        f.push(model);
                    }
                }
            });
        }
    });

    let failures = failures.into_inner().unwrap_or_else(|p| p.into_inner());
    if !failures.is_empty() {
        bail!("{} model(s) failed: {}", failures.len(), failures.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// needle
// ---------------------------------------------------------------------------

fn cmd_needle(
    config_path: Option<&Path>,
    model: &str,
    mode: NeedleMode,
    output: Option<PathBuf>,
) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let client = make_client(&cfg, model)?;
    let ctx = ExperimentContext::new(model, client, Arc::new(cfg.bench)).with_needle_mode(mode);
    let exp = NeedleExperiment::new(ctx);

    if mode == NeedleMode::Quick {
        let results = exp.run_quick()?;
        for (position, outcome) in &results {
            println!(
                "{:<8} accuracy={:.1} latency={:.2}s tokens={}",
                position.to_string(),
                outcome.accuracy,
                outcome.latency,
                outcome.prompt_tokens
            );
        }
        return Ok(());
    }

    let path = output.unwrap_or_else(|| exp.output_path());
    let doc = exp
        .run_detailed_to(path.clone())
        .with_context(|| format!("saving results to {}", path.display()))?;

    println!("Results saved to {}", path.display());
    println!("{}", doc.summary());
    Ok(())
}

// ---------------------------------------------------------------------------
// merge / experiments / config
// ---------------------------------------------------------------------------

fn cmd_merge(files: &[PathBuf], output: &Path) -> Result<()> {
    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        match ResultDocument::read_from(file) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable result file"),
        }
    }
    let read = docs.len();
    let merged = ResultDocument::merge(docs).ok_or_else(|| anyhow!("no readable result files"))?;
    merged
        .write_to(output)
        .with_context(|| format!("writing {}", output.display()))?;

    let meta = &merged.experiment_metadata;
    println!(
        "Merged {read} file(s), {} results, models: {}",
        meta.total_experiments,
        meta.models.join(", ")
    );
    println!("{}", merged.summary());
    println!("Saved to {}", output.display());
    Ok(())
}

fn cmd_experiments() -> Result<()> {
    for entry in REGISTRY {
        println!("{:>2}  {:<22} {}", entry.id, entry.name, entry.key);
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    println!("Config: {}", config::show_config_path(config_path));
    println!();
    println!("[server]");
    println!("  host = {}", cfg.server.base_url());
    println!("  timeout_secs = {}", cfg.server.timeout_secs);
    println!("  keep_alive = {}", cfg.server.keep_alive);
    println!("  embed_model = {}", cfg.server.embed_model);
    if let Some(n) = cfg.server.num_ctx {
        println!("  num_ctx = {n}");
    }
    println!();
    println!("[cache]");
    match cfg.cache_dir() {
        Some(dir) => println!("  dir = {}", dir.display()),
        None => println!("  enabled = false"),
    }
    println!();
    println!("[paths]");
    println!("  documents_dir = {}", cfg.bench.paths.documents_dir.display());
    println!("  results_dir = {}", cfg.bench.paths.results_dir.display());
    println!();
    let run = &cfg.bench.run;
    println!("[run]");
    println!("  models = {}", run.models.join(", "));
    println!("  max_in_flight = {}", run.max_in_flight);
    println!("  max_processes = {}", run.max_processes);
    println!("  checkpoint_every = {}", run.checkpoint_every);
    println!("  record_failures = {}", run.record_failures);
    println!("  seed = {}", run.seed);
    for mode in [NeedleMode::InfoRetrieval, NeedleMode::AnomalyDetection] {
        if let Some(sweep) = cfg.bench.needle.detailed(mode) {
            println!();
            println!("[needle.{mode}]");
            println!("  source_file = {}", sweep.source_file.display());
            println!("  expected_answer = {}", sweep.expected_answer);
            println!("  prompt_lengths = {:?}", sweep.prompt_lengths);
            let positions: Vec<String> = sweep.positions.iter().map(|p| p.to_string()).collect();
            println!("  positions = {}", positions.join(", "));
        }
    }
    Ok(())
}
