// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap and build the crawl config
// 2. Launch one headless Chromium for the whole run
// 3. Crawl, then always shut the browser down, whatever the crawl did
// 4. Save the matched pages (also after an abort, unless --discard-partial)
// 5. Exit with proper code (0 = crawl finished, 1 = fatal error)
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli;       // src/cli.rs - command-line parsing
mod config;    // src/config.rs - crawl configuration
mod crawl;     // src/crawl/ - frontier, settle heuristic, extraction, crawl loop
mod driver;    // src/driver/ - headless browser access
mod output;    // src/output.rs - writing the result file

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::CrawlConfig;
use crawl::{CrawlAborted, CrawlReport, Crawler};
use driver::{ChromeDriver, RenderDriver};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

// Logs go to stderr; RUST_LOG wins over --verbose
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// --help and --version are not failures; every other rejection is a bad option
fn usage_exit_code(error: &clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

// What is left to do once the crawl is over
#[derive(Debug, PartialEq)]
struct Conclusion<'a> {
    /// Report whose matches get written, if any
    save: Option<&'a CrawlReport>,
    exit_code: i32,
}

fn conclude<'a>(
    outcome: &'a Result<CrawlReport, CrawlAborted>,
    config: &CrawlConfig,
) -> Conclusion<'a> {
    match outcome {
        Ok(report) => Conclusion {
            save: Some(report),
            exit_code: 0,
        },
        Err(aborted) => Conclusion {
            save: config.flush_on_abort.then_some(&aborted.report),
            exit_code: 1,
        },
    }
}

// Returns:
//   Ok(0) = crawl finished (with or without matches), or --help/--version
//   Ok(1) = bad options, or crawl aborted because the browser was lost
//   Err   = could not start (config, browser launch) or save results
async fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return Ok(usage_exit_code(&e));
        }
    };
    init_tracing(cli.verbose);

    let config = cli.into_config()?;
    let started_at = Local::now();

    println!("🔍 Crawling {} for pages titled {:?}", config.start_url, config.target_title);

    let driver = ChromeDriver::launch(&config.browser, &config.settle)
        .await
        .context("could not start the browser")?;

    let outcome = Crawler::new(&driver, &config).run().await;

    // The browser is released before anything else can fail
    if let Err(e) = driver.close().await {
        warn!(error = %e, "closing the browser failed");
    }

    if let Err(aborted) = &outcome {
        eprintln!("Error: {}", aborted);
    }

    let conclusion = conclude(&outcome, &config);
    if let Some(report) = conclusion.save {
        save(&config, &started_at, report)?;
    }
    Ok(conclusion.exit_code)
}

fn save(config: &CrawlConfig, started_at: &DateTime<Local>, report: &CrawlReport) -> Result<()> {
    println!(
        "📄 Visited {} page(s), {} failed, {} match(es)",
        report.visited.len(),
        report.failed,
        report.matches.len()
    );
    if report.dropped > 0 {
        println!("⚠️  {} link(s) dropped because the queue was full", report.dropped);
    }

    if let Some(path) = output::write_results(&config.output_dir, started_at, &report.matches)? {
        println!("✅ Saved {}", path.display());
    }
    Ok(())
}
