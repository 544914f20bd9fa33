// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things). The parsed Cli is turned
// into a CrawlConfig once, in into_config(), and the rest of the program
// only ever sees the config.
// =============================================================================

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    BrowserOptions, ConfigError, CrawlConfig, PageProfile, Viewport, DEFAULT_ACCEPT,
    DEFAULT_ACCEPT_LANGUAGE, DEFAULT_BATCH_SIZE, DEFAULT_MAX_FRONTIER,
    DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_SETTLE_DELAY_MS, DEFAULT_USER_AGENT,
};

#[derive(Parser, Debug)]
#[command(
    name = "title-crawler",
    version,
    about = "Crawl a website in a headless browser and record pages with a given title",
    long_about = "title-crawler renders every same-origin page reachable from a start URL in headless \
                  Chromium, waits for JavaScript-driven content to settle, and saves the pages whose \
                  title matches exactly to a timestamped JSON file."
)]
pub struct Cli {
    /// Website URL to start from (e.g., https://example.com)
    pub start_url: String,

    /// Title to look for (exact, case-sensitive match)
    #[arg(long)]
    pub title: String,

    /// How many pages are rendered at the same time
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// How long to wait for a page's load signals, in milliseconds
    #[arg(long, default_value_t = DEFAULT_NAVIGATION_TIMEOUT_MS)]
    pub navigation_timeout_ms: u64,

    /// Fixed delay after the network has calmed down, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY_MS)]
    pub settle_delay_ms: u64,

    /// Maximum number of URLs waiting in the queue; extra links are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_FRONTIER)]
    pub max_frontier: usize,

    /// Directory for the pages-<timestamp>.json file
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Don't write matches found so far when the crawl aborts
    #[arg(long)]
    pub discard_partial: bool,

    /// User agent sent by every page
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080")]
    pub viewport: Viewport,

    /// Accept-Language header sent by every page
    #[arg(long, default_value = DEFAULT_ACCEPT_LANGUAGE)]
    pub accept_language: String,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Path to the Chromium/Chrome executable (auto-detected when omitted)
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,

    /// Print debug diagnostics (same as RUST_LOG=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

// Batch size must be a positive integer
fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("batch size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    /// Builds and validates the crawl configuration.
    pub fn into_config(self) -> Result<CrawlConfig, ConfigError> {
        let mut config = CrawlConfig::new(self.start_url, self.title);
        config.batch_size = self.batch_size;
        config.max_frontier = self.max_frontier;
        config.output_dir = self.output_dir;
        config.flush_on_abort = !self.discard_partial;

        config.settle.navigation = Duration::from_millis(self.navigation_timeout_ms);
        config.settle.fixed_delay = Duration::from_millis(self.settle_delay_ms);

        config.profile = PageProfile {
            user_agent: self.user_agent,
            viewport: self.viewport,
            extra_headers: vec![
                ("Accept-Language".to_string(), self.accept_language),
                ("Accept".to_string(), DEFAULT_ACCEPT.to_string()),
            ],
            bypass_csp: true,
        };
        config.browser = BrowserOptions {
            headed: self.headed,
            chrome_path: self.chrome_path,
        };

        config.validate()?;
        Ok(config)
    }
}
