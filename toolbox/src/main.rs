use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use recon_core::{Collector, CollectorDescriptor, CollectorFactory, Privilege, Target};
use recon_engine::{
    materialize_all, ApiRunner, ArtifactStore, Executor, LogSink, Normalizer, ProcessRunner, Registry, ReqwestTransport,
    Scheduler, ToolPaths,
};
use recon_ledger::{CommandFilter, Db, RunMeta};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::{Config, EscalationMode};

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Listing {
    /// Collectors compiled into this binary
    Collectors,
    /// Targets and everything derived from them
    Targets,
    /// Command counts per collector and status
    Commands,
}

#[derive(Debug, Parser)]
#[command(name = "recon", version, about = "Collector orchestration and result normalization")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./recon.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ledger database (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Debug logging
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Add targets: host:<ip>, domain:<name> or service:<ip>:<port>/<tcp|udp>[=<name>]
    Add {
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Materialize and execute commands of the selected collectors
    Collect {
        /// Collector to run (repeatable)
        #[arg(short = 'c', long = "collector", required = true)]
        collectors: Vec<String>,
        /// Only print the pending commands
        #[arg(long, default_value_t = false)]
        print_commands: bool,
        /// Execution budget shared by all collectors
        #[arg(short = 't', long)]
        threads: Option<usize>,
        /// Directory for API artifacts
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Re-run normalization over completed commands
    Analyze {
        #[arg(short = 'c', long = "collector", required = true)]
        collectors: Vec<String>,
    },
    /// Show ledger contents
    List {
        #[arg(value_enum)]
        what: Listing,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    let mut all = Vec::new();
    #[cfg(feature = "http")]
    all.extend(http_collectors::catalog());
    #[cfg(feature = "vpn")]
    all.extend(vpn_collectors::catalog());
    #[cfg(feature = "dns")]
    all.extend(dns_collectors::catalog());
    #[cfg(feature = "osint")]
    all.extend(osint_collectors::catalog());
    #[cfg(feature = "apis")]
    all.extend(api_collectors::catalog());
    all
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Registers the selected collectors. Any configuration error is fatal.
fn build_registry(cfg: &Config, selected: &[String]) -> Result<Registry> {
    let available = catalog();
    for name in selected {
        if !available.iter().any(|(d, _)| &d.name == name) {
            bail!("unknown collector '{name}'");
        }
    }
    let tools = ToolPaths::from_env(cfg.tools.clone());
    let mut registry = Registry::new(cfg.settings(), tools).with_overrides(cfg.overrides());
    for (descriptor, factory) in available.into_iter().filter(|(d, _)| selected.contains(&d.name)) {
        if let Err(e) = registry.register(descriptor, factory) {
            error!(error = %e, "collector registration failed");
            return Err(e.into());
        }
    }
    Ok(registry)
}

fn open_db(cfg: &Config, flag: Option<PathBuf>) -> Result<Arc<Db>> {
    let path = flag.or_else(|| cfg.database.clone()).unwrap_or_else(|| PathBuf::from(config::DEFAULT_DATABASE));
    let db = Db::open_or_create(&path).with_context(|| format!("opening ledger {}", path.display()))?;
    Ok(Arc::new(db))
}

fn add(db: &Db, specs: &[String]) -> Result<()> {
    let targets = specs.iter().map(|s| s.parse::<Target>().map_err(|e| anyhow!(e))).collect::<Result<Vec<_>>>()?;
    for target in &targets {
        let id = db.transaction(|tx| tx.upsert_target(target))?;
        let obj = serde_json::json!({ "target_id": id, "target": target.to_string(), "kind": target.kind().as_str() });
        println!("{}", serde_json::to_string(&obj)?);
    }
    Ok(())
}

async fn collect(
    cfg: &Config,
    db: Arc<Db>,
    registry: &Registry,
    print_commands: bool,
    threads: Option<usize>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let started = Instant::now();
    let collectors = registry.all();
    let normalizer = Arc::new(Normalizer::new(db.clone(), Arc::new(LogSink)));
    let recovered = normalizer.drain(&collectors)?;
    if recovered.commands > 0 {
        info!(commands = recovered.commands, entities = recovered.new_entities, "normalized commands left over");
    }

    let targets: Vec<Target> = db.transaction(|tx| tx.targets(None))?.into_iter().map(|(_, t)| t).collect();
    let materialized = materialize_all(&db, &collectors, &targets)?;
    info!(targets = targets.len(), commands = materialized.commands.len(), new = materialized.created, "materialized");

    if print_commands {
        for c in &collectors {
            let name = c.descriptor().name.as_str();
            for row in db.transaction(|tx| tx.commands(CommandFilter::Pending(Some(name))))? {
                println!("{}\t{}\t{}", name, row.target, row.request.display());
            }
        }
        return Ok(());
    }

    let output_dir = output_dir
        .or_else(|| cfg.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_OUTPUT_DIR));
    let http = cfg.http_options();
    let transport = Arc::new(ReqwestTransport::new(&http)?);
    let api = ApiRunner::new(transport)
        .with_retries(http.transport_retries, Duration::from_millis(http.retry_delay_ms))
        .with_artifacts(ArtifactStore::new(output_dir));
    let (min_ms, max_ms) = cfg.delay();
    let escalation = cfg.escalation.unwrap_or_default();
    let sudo = ToolPaths::from_env(cfg.tools.clone()).resolve("sudo");
    // SAFETY: geteuid has no preconditions and cannot fail.
    let is_root = unsafe { libc::geteuid() } == 0;
    check_escalation(escalation, sudo.is_some() || is_root, &collectors)?;
    let process = ProcessRunner::new(escalation.into(), sudo).with_delay(min_ms, max_ms);
    let executor = Arc::new(Executor::new(process, api, cfg.credentials()));

    let run_id = Uuid::now_v7();
    let meta = RunMeta {
        run_id,
        started_at: recon_ledger::now_ms(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        args_json: serde_json::to_string(&std::env::args().collect::<Vec<_>>())?,
    };
    db.transaction(|tx| tx.begin_run(&meta))?;
    let threads = threads.or(cfg.threads).unwrap_or(1);
    let scheduler = Scheduler::new(db.clone(), executor, normalizer, threads);
    let summary = scheduler.run(run_id, &collectors).await?;
    db.transaction(|tx| tx.finish_run(&run_id, summary.executed as i64, summary.unsuccessful() as i64))?;

    let obj = serde_json::json!({
        "run_id": run_id.to_string(),
        "executed": summary.executed,
        "completed": summary.completed,
        "failed": summary.failed,
        "timed_out": summary.timed_out,
        "skipped": summary.skipped,
        "errors": summary.errors,
        "ended_at": now_rfc3339(),
        "duration_ms": started.elapsed().as_millis() as u64,
    });
    println!("{}", serde_json::to_string(&obj)?);
    Ok(())
}

/// `escalation: sudo` without a sudo binary cannot run any elevated collector.
fn check_escalation(mode: EscalationMode, can_elevate: bool, collectors: &[Arc<dyn Collector>]) -> Result<()> {
    if mode != EscalationMode::Sudo || can_elevate {
        return Ok(());
    }
    let elevated: Vec<_> = collectors
        .iter()
        .map(|c| c.descriptor())
        .filter(|d| d.privilege == Privilege::Elevated)
        .map(|d| d.name.as_str())
        .collect();
    if elevated.is_empty() {
        return Ok(());
    }
    bail!("escalation is set to sudo but sudo was not found; needed by {}", elevated.join(", "))
}

fn list(db: Option<&Db>, what: Listing, format: OutputFormat) -> Result<()> {
    let mut rows = Vec::new();
    match (what, db) {
        (Listing::Collectors, _) => {
            let mut all: Vec<_> = catalog().into_iter().map(|(d, _)| d).collect();
            all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
            for d in all {
                rows.push(serde_json::json!({
                    "name": d.name,
                    "priority": d.priority,
                    "max_concurrency": d.max_concurrency,
                    "timeout_s": d.timeout.as_secs(),
                    "privilege": d.privilege,
                    "capability": d.capability,
                    "binary": d.binary,
                }));
            }
        }
        (Listing::Targets, Some(db)) => {
            db.transaction(|tx| {
                for (id, target) in tx.targets(None)? {
                    let entities = tx.entities_for(id)?;
                    rows.push(serde_json::json!({ "target": target.to_string(), "kind": target.kind().as_str(), "entities": entities }));
                }
                Ok(())
            })?;
        }
        (Listing::Commands, Some(db)) => {
            for (collector, status, count) in db.transaction(|tx| tx.status_counts())? {
                rows.push(serde_json::json!({ "collector": collector, "status": status.as_str(), "count": count }));
            }
        }
        (_, None) => bail!("listing {what:?} requires a ledger"),
    }
    for row in rows {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&row)?),
            OutputFormat::Text => println!("{}", text_row(&row)),
        }
    }
    Ok(())
}

fn text_row(row: &serde_json::Value) -> String {
    match row.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join("  "),
        None => row.to_string(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match (&cli.command, cli.debug) {
        (_, true) => "debug",
        (Commands::Analyze { .. }, false) => "warn",
        _ => "info",
    };
    init_logging(level);
    let cfg = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Version => {
            println!("recon {} (core {})", env!("CARGO_PKG_VERSION"), recon_core::version());
        }
        Commands::Add { targets } => {
            let db = open_db(&cfg, cli.database)?;
            add(&db, &targets)?;
        }
        Commands::Collect { collectors, print_commands, threads, output_dir } => {
            let registry = build_registry(&cfg, &collectors)?;
            let db = open_db(&cfg, cli.database)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(collect(&cfg, db, &registry, print_commands, threads, output_dir))?;
        }
        Commands::Analyze { collectors } => {
            let registry = build_registry(&cfg, &collectors)?;
            let db = open_db(&cfg, cli.database)?;
            let normalizer = Normalizer::new(db, Arc::new(LogSink));
            let stats = normalizer.reanalyze(&registry.all())?;
            let obj = serde_json::json!({
                "commands": stats.commands,
                "new_entities": stats.new_entities,
                "degraded": stats.degraded,
            });
            println!("{}", serde_json::to_string(&obj)?);
        }
        Commands::List { what, format } => {
            let db = match what {
                Listing::Collectors => None,
                _ => Some(open_db(&cfg, cli.database)?),
            };
            list(db.as_deref(), what, format)?;
        }
    }
    Ok(())
}
