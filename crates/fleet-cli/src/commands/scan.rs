//! `fleet scan`
//!
//! Loads the target list, collects hardware from every host, then persists
//! the results: database upsert plus inactive marking when every target has
//! a terminal identity and a database is configured, otherwise a CSV report.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use fleet_inventory::{
    CsvReport, CsvTargetSource, EventLevel, EventValue, IdentityKey, InventoryOrchestrator,
    PgRepository, ProgressEvent, ProgressSink, ReconciliationStore, ResultSet, RunSummary,
    SshConnector, Target, TargetSource,
};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::cli::OutputFormat;
use crate::core::ScanConfig;

/// Arguments for a scan
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// CSV file listing the terminals (IP, COMPANY_ID, TERMINAL_ID, SEGMENT, OPERATION)
    #[arg(short, long)]
    pub targets: PathBuf,

    /// Concurrent hosts (1-15)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Write the CSV report even when a database is configured
    #[arg(long)]
    pub report_only: bool,

    /// SSH username
    #[arg(short, long)]
    pub user: Option<String>,

    /// Path to SSH private key
    #[arg(short, long, conflicts_with = "password_env")]
    pub key: Option<PathBuf>,

    /// Name of the environment variable holding the SSH password
    #[arg(long)]
    pub password_env: Option<String>,

    /// Directory for the CSV report
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

impl ScanArgs {
    pub async fn execute(self, mut config: ScanConfig, format: OutputFormat) -> Result<()> {
        self.apply(&mut config, |var| std::env::var(var).ok())?;
        config.validate()?;

        let targets = CsvTargetSource::new(&self.targets)
            .load()
            .await
            .with_context(|| format!("Failed to load targets from {}", self.targets.display()))?;
        if targets.is_empty() {
            bail!("No usable targets in {}", self.targets.display());
        }

        let connector = SshConnector::new(config.ssh.username.clone(), config.credentials())
            .context("Invalid SSH credentials")?
            .with_options(config.session_options());

        let (sink, rx) = ProgressSink::channel(256);
        let printer = tokio::spawn(print_events(rx, format));

        let outcome = run(&config, self.report_only, connector, targets, &sink).await;
        drop(sink);
        printer.await.context("Progress printer stopped unexpectedly")?;

        let summary = outcome?;
        print_summary(&summary, format)
    }

    /// Fold command-line overrides into the loaded configuration
    fn apply(
        &self,
        config: &mut ScanConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(workers) = self.workers {
            config.scan.max_workers = workers;
        }
        if let Some(user) = &self.user {
            config.ssh.username = user.clone();
        }
        if let Some(key) = &self.key {
            config.ssh.private_key = Some(key.clone());
            config.ssh.password = None;
        }
        if let Some(var) = &self.password_env {
            let password = lookup(var)
                .filter(|p| !p.is_empty())
                .with_context(|| format!("Environment variable {var} is not set"))?;
            config.ssh.password = Some(password);
            config.ssh.private_key = None;
        }
        if let Some(dir) = &self.report_dir {
            config.report.directory = dir.clone();
        }
        Ok(())
    }
}

async fn run(
    config: &ScanConfig,
    report_only: bool,
    connector: SshConnector,
    targets: Vec<Target>,
    sink: &ProgressSink,
) -> Result<RunSummary> {
    let active: HashSet<IdentityKey> = targets.iter().map(Target::identity).collect();
    let all_identified = targets.iter().all(Target::has_terminal_identity);

    let orchestrator = InventoryOrchestrator::new(connector, config.orchestrator_options());
    let set = orchestrator.run(targets, sink).await?;
    set.ensure_complete(config.scan.breaker_threshold)?;

    let mut summary = RunSummary::from_results(set.total, &set.results);

    match config.store.database_url.as_deref() {
        Some(url) if !report_only && all_identified => {
            persist(config, url, &set, &active, sink, &mut summary).await?;
        }
        Some(_) if !report_only => {
            sink.warning("Some targets have no company/terminal ids; writing the report file instead")
                .await;
            write_report(config, &set, sink, &mut summary).await?;
        }
        _ => write_report(config, &set, sink, &mut summary).await?,
    }

    sink.finish(format!(
        "Finished: {} online, {} offline",
        summary.online, summary.offline
    ))
    .await;
    Ok(summary)
}

async fn persist(
    config: &ScanConfig,
    database_url: &str,
    set: &ResultSet,
    active: &HashSet<IdentityKey>,
    sink: &ProgressSink,
    summary: &mut RunSummary,
) -> Result<()> {
    let repository =
        PgRepository::connect(database_url, config.store.max_connections, &config.store.table)
            .await
            .context("Failed to connect to the inventory database")?;
    let store = ReconciliationStore::new(repository, config.reconcile_options());

    sink.info("Reconciling results with the inventory database")
        .await;
    let reconciled = store.persist(&set.results).await?;
    summary.written = reconciled.written;
    summary.unchanged = reconciled.unchanged;
    summary.failed_rows = reconciled.failed_rows;
    if reconciled.failed_rows > 0 {
        sink.warning(format!(
            "{} rows could not be written; see the log for details",
            reconciled.failed_rows
        ))
        .await;
    }

    summary.inactivated = store.reconcile_inactive(active).await?;
    sink.info(format!(
        "{} records written, {} marked inactive",
        summary.written, summary.inactivated
    ))
    .await;
    Ok(())
}

async fn write_report(
    config: &ScanConfig,
    set: &ResultSet,
    sink: &ProgressSink,
    summary: &mut RunSummary,
) -> Result<()> {
    let report = CsvReport::new(&config.report.directory);
    let path = report
        .write_results(&set.results)
        .with_context(|| format!("Failed to write report in {}", report.directory().display()))?;

    summary.written = set.results.len();
    summary.report_path = Some(path.clone());
    sink.open_file(path).await;
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<ProgressEvent>, format: OutputFormat) {
    while let Some(event) = rx.recv().await {
        match format {
            OutputFormat::Table => println!("{}", render_event(&event)),
            OutputFormat::Json => match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode progress event"),
            },
        }
    }
}

fn render_event(event: &ProgressEvent) -> String {
    match event.level {
        EventLevel::Info => format!("  {}", event.message),
        EventLevel::Warning => format!("{} {}", style("!").yellow().bold(), event.message),
        EventLevel::Error => format!(
            "{} {}",
            style("✗").red().bold(),
            style(&event.message).red()
        ),
        EventLevel::Progress => {
            let percent = event.percent().unwrap_or_default();
            format!("{} {}", style(format!("[{percent:>3.0}%]")).dim(), event.message)
        }
        EventLevel::Finish => format!("{} {}", style("✓").green().bold(), event.message),
        EventLevel::OpenFile => match &event.value {
            Some(EventValue::Path(path)) => {
                format!("Report: {}", style(path.display()).green())
            }
            _ => event.message.clone(),
        },
    }
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Scan Summary").cyan().bold());
    println!("{}", style("=".repeat(40)).dim());
    println!("Targets:      {}", style(summary.total).bold());
    println!("Processed:    {}", summary.processed);
    println!("Online:       {}", style(summary.online).green());
    println!("Offline:      {}", style(summary.offline).red());
    println!("Written:      {}", summary.written);
    if summary.report_path.is_none() {
        println!("Unchanged:    {}", summary.unchanged);
        println!("Failed rows:  {}", style(summary.failed_rows).yellow());
        println!("Inactivated:  {}", summary.inactivated);
    }
    if let Some(path) = &summary.report_path {
        println!("Report:       {}", style(path.display()).green());
    }
    Ok(())
}
