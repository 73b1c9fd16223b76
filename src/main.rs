mod cli;

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::Parser;
use cli::commands::Cli;
use cli::logging;
use cli::progress::CliReporter;
use colored::*;
use dotenv::dotenv;
use tracing::{error, info, warn};
use vault_to_notion::notion::{extract_page_id, DryRunApi, NotionClient, WorkspaceApi};
use vault_to_notion::{AppConfig, MigrationEngine, MigrationOptions, MigrationResult};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(args.verbose);

    let config = match vault_to_notion::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match run_migration(&args, &config) {
        Ok(result) => print_summary(&result),
        Err(err) => {
            error!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

fn run_migration(args: &Cli, config: &AppConfig) -> anyhow::Result<MigrationResult> {
    if !args.source.exists() {
        bail!("Source path does not exist: {}", args.source.display());
    }
    if !args.source.is_dir() {
        bail!("Source path is not a directory: {}", args.source.display());
    }

    let token = args.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if token.is_none() && !args.dry_run {
        bail!("Notion token required. Use --token or set NOTION_TOKEN environment variable.");
    }

    let destination = extract_page_id(&args.destination)?;
    info!("Source: {}", args.source.display());
    info!("Destination page: {}", destination);
    if args.dry_run {
        warn!("DRY RUN MODE - no changes will be made");
    }

    let mut options = MigrationOptions::new(args.source.clone(), destination);
    options.dry_run = args.dry_run;
    options.skip_files = args.skip_files;
    options.reverse_sort = args.reverse_sort;
    options.fetch_link_titles = args.fetch_link_titles;
    options.report_dir = args
        .report_dir
        .clone()
        .or_else(|| config.report_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let api: Box<dyn WorkspaceApi> = match token {
        Some(token) if !args.dry_run => Box::new(
            NotionClient::new(token, config).context("Failed to build the Notion HTTP client")?,
        ),
        _ => Box::new(DryRunApi::new()),
    };

    let engine = MigrationEngine::new(config.clone(), options, api.as_ref());
    let reporter = CliReporter::new();
    let result = engine.run(&reporter).context("Migration failed")?;
    Ok(result)
}

fn print_summary(result: &MigrationResult) {
    let summary = &result.summary;

    println!();
    info!(
        "Scan: {}, Plan: {}, Submit: {}",
        format!("{:.2}s", summary.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", summary.plan_duration.as_secs_f64()).green(),
        format!("{:.2}s", summary.submit_duration.as_secs_f64()).green(),
    );
    info!(
        "{} folders, {} notes created, {} page errors",
        format!("{}", summary.folders_created).cyan(),
        format!("{}", summary.notes_created).cyan(),
        format!("{}", summary.page_errors).red(),
    );
    info!(
        "{} of {} files uploaded, {} failed, {} skipped, {} unresolved references",
        format!("{}", summary.files_uploaded).green(),
        format!("{}", result.ledger.len()).green(),
        format!("{}", summary.files_failed).red(),
        format!("{}", summary.files_skipped).yellow(),
        format!("{}", summary.unresolved_references).red(),
    );
    info!("CSV report: {}", result.reports.csv.display());
    if let Some(failed) = &result.reports.failed {
        warn!("Failed files report: {}", failed.display());
    }
}
