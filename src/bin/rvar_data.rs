use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use rvar_data::cache::KeywordStore;
use rvar_data::config::ConfigLoader;
use rvar_data::domain::{GroupId, ResumeKey};
use rvar_data::enrich::{EmitMode, ProgressSink, enrich_file, read_units};
use rvar_data::error::RvarError;
use rvar_data::keywords::KeywordHttpClient;
use rvar_data::literature::PubmedHttpClient;
use rvar_data::merge::{MergeOptions, merge_phenotype_data};
use rvar_data::output::{EnrichSummary, JsonOutput, StderrProgress};
use rvar_data::retriever::{KeywordRetriever, RetrieverSettings};
use rvar_data::topics::TopicHttpClient;

#[derive(Parser)]
#[command(name = "rvar-data")]
#[command(about = "Merge phenotype variant tables and enrich them with literature keywords")]
#[command(version, author)]
struct Cli {
    /// Suppress the per-unit progress lines on stderr.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Combine per-phenotype CSVs into deduplicated tables")]
    Merge(MergeArgs),
    #[command(about = "Attach literature keywords to merged variation-phenotype rows")]
    Enrich(EnrichArgs),
}

#[derive(Args)]
struct MergeArgs {
    data_dir: Utf8PathBuf,

    /// Comma-separated phenotype directories; defaults to every subdirectory.
    #[arg(long, value_delimiter = ',')]
    groups: Option<Vec<String>>,

    /// Accept input files whose header differs from the first one read.
    #[arg(long)]
    lenient_headers: bool,
}

#[derive(Args)]
struct EnrichArgs {
    data_dir: Utf8PathBuf,

    /// Last unit written by a previous run, as `entity,group`.
    #[arg(long)]
    resume: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_enum, default_value_t = EmitMode::References)]
    mode: EmitMode,

    /// JSON file keeping keyword lookups between runs.
    #[arg(long)]
    cache_file: Option<Utf8PathBuf>,

    /// Keep keyword lookups in ~/.cache/rvar-data/keywords.json.
    #[arg(long, conflicts_with = "cache_file")]
    cache: bool,

    #[arg(long, default_value = "variation-phenotypes.csv")]
    input: String,

    #[arg(long, default_value = "lit-kwds.csv")]
    output: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RvarError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => run_merge(args),
        Commands::Enrich(args) => run_enrich(args, cli.quiet),
    }
}

/// `RUST_LOG` directives, or warnings and above so retry notices stay visible.
fn log_filter(directives: Option<String>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn run_merge(args: MergeArgs) -> miette::Result<()> {
    let groups = args
        .groups
        .map(|groups| groups.into_iter().map(GroupId::new).collect::<Vec<_>>());
    let options = MergeOptions {
        strict_headers: !args.lenient_headers,
    };
    let report = merge_phenotype_data(&args.data_dir, groups, options)?;
    JsonOutput::print_merge(&report).map_err(|err| RvarError::Filesystem(err.to_string()))?;
    Ok(())
}

fn run_enrich(args: EnrichArgs, quiet: bool) -> miette::Result<()> {
    let resume = args
        .resume
        .as_deref()
        .map(str::parse::<ResumeKey>)
        .transpose()?;
    let config = ConfigLoader::resolve(args.config.as_deref())?;

    let input = args.data_dir.join(&args.input);
    let units = read_units(&input, &config.reference_prefix)?;
    info!(input = %input, units = units.len(), "collected enrichment units");

    let cache_path = match (args.cache_file, args.cache) {
        (Some(path), _) => Some(path),
        (None, true) => Some(KeywordStore::default_path()?),
        (None, false) => config.cache_file.clone(),
    };
    let store = cache_path.map(KeywordStore::new);

    let mut retriever = KeywordRetriever::new(
        PubmedHttpClient::new(&config.pubmed)?,
        KeywordHttpClient::new(&config.keywords)?,
        TopicHttpClient::new()?,
        RetrieverSettings::from_config(&config),
    );
    if let Some(store) = &store {
        retriever.seed(store.load()?);
    }

    let output = args.data_dir.join(&args.output);
    let progress: &dyn ProgressSink = if quiet { &JsonOutput } else { &StderrProgress };

    let outcome = enrich_file(
        &mut retriever,
        &units,
        resume.as_ref(),
        &output,
        args.mode,
        progress,
    );

    if let Some(store) = &store {
        if let Err(err) = store.save(retriever.cache()) {
            warn!(path = %store.path(), error = %err, "failed to save keyword cache");
        }
    }

    let report = outcome?;
    let summary = EnrichSummary {
        output: output.to_string(),
        resumed_after: resume.map(|key| key.to_string()),
        report,
        lookups: retriever.stats(),
    };
    JsonOutput::print_enrich(&summary).map_err(|err| RvarError::Filesystem(err.to_string()))?;
    Ok(())
}
