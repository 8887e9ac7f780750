use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use wikisync_core::pipeline::{PipelineReport, sync_from_config_file};

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Copy wiki pages, category members and their templates to another wiki"
)]
struct Cli {
    #[arg(value_name = "CONFIG", help = "YAML file naming sites, pages and categories")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(config) = cli.config else {
        println!("Usage: wikisync <config_file.yml>");
        return Ok(());
    };

    dotenvy::dotenv().ok();
    init_tracing()?;

    let report = sync_from_config_file(&config)?;
    print_report(&report);
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("WIKISYNC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

fn print_report(report: &PipelineReport) {
    println!("source: {}", report.source);
    println!("destination: {}", report.destination);
    println!("closure.direct_pages: {}", report.closure.direct_pages);
    println!("closure.category_pages: {}", report.closure.category_pages);
    println!("closure.category_articles: {}", report.closure.category_articles);
    println!("closure.unique_templates: {}", report.closure.unique_templates);
    for page in &report.sync.pages {
        match &page.detail {
            Some(detail) => println!("page.{}: {} ({detail})", page.outcome.as_str(), page.title),
            None => println!("page.{}: {}", page.outcome.as_str(), page.title),
        }
    }
    println!("skipped_existing: {}", report.sync.skipped_existing);
    println!("not_editable: {}", report.sync.not_editable);
    println!("failed: {}", report.sync.failed);
    println!("request_count: {}", report.sync.request_count);
    println!("{} pages synchronized", report.sync.synced);
}
