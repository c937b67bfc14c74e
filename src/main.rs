//! bulkexport - Export a content repository into a bulk-import compatible tree.
//!
//! Usage:
//!   bulkexport export SOURCE --base DIR   Export a directory repository
//!   bulkexport scan SOURCE                Count the nodes an export would visit
//!   bulkexport cache BASE --root ID       Inspect or remove a node list cache
//!   bulkexport --help                     Show help

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bulkexport_core::{ExportConfig, NodeId, RunParameters, Session};
use bulkexport_export::{Engine, ExportReport, RunOutcome};
use bulkexport_repo::FsRepository;
use bulkexport_scan::{NodeListCache, TreeScanner};

const BANNER: &str = "*****************************************************************************************************";

#[derive(Parser)]
#[command(
    name = "bulkexport",
    version,
    about = "Export a content repository into a bulk-import compatible tree",
    long_about = "bulkexport walks a repository subtree and writes every folder, document \
                  and (optionally) every revision to disk, each with a \
                  .metadata.properties.xml sidecar, so a bulk import tool can load it back."
)]
struct Cli {
    /// Log filter (e.g. "info", "bulkexport_export=debug"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a directory tree
    Export(ExportArgs),

    /// Scan a directory tree and report what would be exported
    Scan {
        /// Directory exposed as the repository
        source: PathBuf,

        /// Node to start from (defaults to the source root)
        #[arg(long)]
        root: Option<String>,

        /// Configuration file providing the ignore rules
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print every node id
        #[arg(long)]
        ids: bool,
    },

    /// Inspect or remove the node list cache of a root
    Cache {
        /// Export base directory holding the cache
        base: PathBuf,

        /// Root node id the cache was generated for
        #[arg(long, default_value = bulkexport_repo::FS_SCHEME)]
        root: String,

        /// Delete the cache file
        #[arg(long)]
        remove: bool,
    },
}

#[derive(Args)]
struct ExportArgs {
    /// Directory exposed as the repository
    source: PathBuf,

    /// Directory the export is written into
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Node to export (defaults to the source root)
    #[arg(long)]
    root: Option<String>,

    /// Leave files that already exist untouched
    #[arg(long)]
    ignore_exported: bool,

    /// Export every revision, not just the head
    #[arg(long)]
    export_versions: bool,

    /// Suffix the head revision with its label as well
    #[arg(long)]
    revision_head: bool,

    /// Use the node list cache, generating it on the first run
    #[arg(long)]
    use_node_cache: bool,

    /// Number of worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Number of nodes per task
    #[arg(short, long)]
    chunk_size: Option<usize>,

    /// Run parameters as a form-encoded query string
    /// (nodeRef=..&base=..&ignoreExported=true&nbOfThreads=4); replaces the flags above
    #[arg(long)]
    params: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Command::Export(args) => run_export(&args),
        Command::Scan {
            source,
            root,
            config,
            ids,
        } => {
            run_scan(&source, root, config.as_deref(), ids)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cache { base, root, remove } => {
            run_cache(&base, &NodeId::new(root), remove)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Install the stderr log subscriber.
fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

/// Build the run configuration: defaults, then the TOML file, then flags.
fn export_config(args: &ExportArgs) -> Result<(ExportConfig, Option<String>)> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Cannot load configuration {}", path.display()))?,
        None => ExportConfig::new(PathBuf::new()),
    };

    let root = if let Some(query) = &args.params {
        let mut params = RunParameters::from_query(query);
        if params.base.is_none() {
            params.base = args.base.clone().or(Some(config.base_path.clone()));
        }
        let root = params.node_ref.clone().or_else(|| args.root.clone());
        let principal = config.principal.clone();
        config = params.into_config(config.ignore.clone())?;
        config.principal = principal;
        root
    } else {
        if let Some(base) = &args.base {
            config.base_path = base.clone();
        }
        config.skip_existing |= args.ignore_exported;
        config.export_versions |= args.export_versions;
        config.revision_head_naming |= args.revision_head;
        config.use_node_cache |= args.use_node_cache;
        if let Some(threads) = args.threads {
            config.threads = threads;
        }
        if let Some(chunk_size) = args.chunk_size {
            config.chunk_size = chunk_size;
        }
        args.root.clone()
    };

    config.validate()?;
    Ok((config, root))
}

/// Run an export and print its outcome.
fn run_export(args: &ExportArgs) -> Result<ExitCode> {
    let start = Instant::now();
    let (config, root) = export_config(args)?;

    let repo = FsRepository::open(&args.source)
        .with_context(|| format!("Cannot open {}", args.source.display()))?;
    let root = root.map(NodeId::new).unwrap_or_else(|| repo.root_id());
    info!(source = %repo.root_path().display(), root = %root, "Bulk export started");

    let engine = Engine::new(config)?;
    if matches!(args.format, OutputFormat::Text) {
        let mut progress_rx = engine.subscribe();
        std::thread::spawn(move || {
            loop {
                let progress = match progress_rx.blocking_recv() {
                    Ok(progress) => progress,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                eprintln!(
                    "Task {}/{} done ({:.0}%), {} nodes exported",
                    progress.tasks_completed,
                    progress.tasks_total,
                    progress.percentage(),
                    progress.nodes_exported
                );
            }
        });
    }

    let result = engine.run(&repo, &root);
    let elapsed = start.elapsed();
    if let Err(e) = &result {
        error!(error = %e, "Error found during export");
    }
    info!("Bulk export finished");

    match args.format {
        OutputFormat::Text => print_outcome_text(&result, engine.config(), &root, elapsed),
        OutputFormat::Json => print_outcome_json(&result, engine.config(), &root, elapsed)?,
    }

    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome_text(
    result: &Result<RunOutcome, bulkexport_core::EngineError>,
    config: &ExportConfig,
    root: &NodeId,
    elapsed: Duration,
) {
    match result {
        Ok(RunOutcome::Completed(report)) => {
            println!("Export finished Successfully");
            print_report(report);
        }
        Ok(RunOutcome::CacheGenerated {
            cache_path,
            node_count,
        }) => {
            println!("{BANNER}");
            println!("** No Export performed - Cache file generated only - re-run to use cache file");
            println!("** {} nodes cached in {}", node_count, cache_path.display());
            println!("{BANNER}\n\n");
        }
        Err(e) => {
            println!("{BANNER}");
            println!("** ERROR occured:");
            println!("** {e}");
            println!("{BANNER}\n\n");
        }
    }

    println!("Performed Export with the following Parameters :");
    println!("   export folder   : {}", config.base_path.display());
    println!("   node to export  : {root}");
    println!("   ignore exported : {}", config.skip_existing);
    println!("   export versions : {}", config.export_versions);
    println!("   bulk import revision scheme: {}", !config.revision_head_naming);
    println!("   use node cache  : {}", config.use_node_cache);
    println!("   threads         : {}", config.threads);
    println!("   chunk size      : {}", config.chunk_size);

    let seconds = elapsed.as_secs();
    println!(
        "Export elapsed time: minutes: {} , seconds: {}",
        seconds / 60,
        seconds % 60
    );
}

fn print_report(report: &ExportReport) {
    let counters = &report.counters;

    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", report.summary());
    println!(
        " {} folders, {} documents, {} revisions",
        counters.folders, counters.documents, counters.revisions
    );
    println!(
        " {} written, {} content files and {} sidecars skipped, {} without content",
        format_size(counters.bytes_written),
        counters.content_skipped,
        counters.sidecars_skipped,
        counters.placeholders
    );
    if report.from_cache {
        println!(" Node list read from cache");
    }
    println!("{}", "─".repeat(60));

    for (task, message) in &report.failed_tasks {
        println!(" task {task} aborted: {message}");
    }
    for failure in report.failures.iter().take(20) {
        println!(" task {} {}: {}", failure.task, failure.node, failure.message);
    }
    if report.failures.len() > 20 {
        println!(" ... and {} more failures", report.failures.len() - 20);
    }
    println!();
}

fn print_outcome_json(
    result: &Result<RunOutcome, bulkexport_core::EngineError>,
    config: &ExportConfig,
    root: &NodeId,
    elapsed: Duration,
) -> Result<()> {
    let outcome = match result {
        Ok(RunOutcome::Completed(report)) => serde_json::json!({
            "outcome": "completed",
            "report": report,
        }),
        Ok(RunOutcome::CacheGenerated {
            cache_path,
            node_count,
        }) => serde_json::json!({
            "outcome": "cache_generated",
            "cache_path": cache_path,
            "node_count": node_count,
        }),
        Err(e) => serde_json::json!({
            "outcome": "error",
            "message": e.to_string(),
        }),
    };

    let output = serde_json::json!({
        "result": outcome,
        "root": root,
        "parameters": config,
        "elapsed_ms": elapsed.as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Scan only, printing the node count.
fn run_scan(source: &Path, root: Option<String>, config: Option<&Path>, ids: bool) -> Result<()> {
    let ignore = match config {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Cannot load configuration {}", path.display()))?
            .ignore,
        None => Default::default(),
    };
    let principal = bulkexport_core::DEFAULT_PRINCIPAL;

    let repo = FsRepository::open(source)
        .with_context(|| format!("Cannot open {}", source.display()))?;
    let root = root.map(NodeId::new).unwrap_or_else(|| repo.root_id());

    eprintln!("Scanning {}...", source.display());

    let scanner = TreeScanner::new(ignore);
    let mut progress_rx = scanner.subscribe();
    let nodes = scanner
        .scan(&repo, &Session::scan(principal), &root)
        .context("Scan failed")?;

    let mut summary = None;
    // only the last update matters, older ones may have been dropped
    loop {
        match progress_rx.try_recv() {
            Ok(progress) => summary = Some(progress),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    let summary = summary.ok_or_else(|| eyre!("Scan reported no progress"))?;

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {} nodes to export", root, nodes.len());
    println!(
        " {} folders, {} documents, {} ignored subtrees",
        summary.folders, summary.documents, summary.ignored
    );
    println!(" Scanned in {:.2}s", summary.elapsed.as_secs_f64());
    println!("{}", "─".repeat(60));

    if ids {
        println!();
        for node in &nodes {
            println!("{node}");
        }
    }

    Ok(())
}

/// Show or delete the cache for a root.
fn run_cache(base: &Path, root: &NodeId, remove: bool) -> Result<()> {
    let cache = NodeListCache::new(base);
    let path = cache.path_for(root);

    if remove {
        if cache.remove(root)? {
            println!("Removed {}", path.display());
        } else {
            println!("No cache at {}", path.display());
        }
        return Ok(());
    }

    match cache.load(root)? {
        Some(nodes) => println!("{}: {} nodes cached for {}", path.display(), nodes.len(), root),
        None => println!("No cache at {}", path.display()),
    }
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
