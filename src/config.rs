// src/config.rs
// =============================================================================
// Crawl configuration.
//
// Everything the crawler needs to know is collected into one CrawlConfig value
// which is built once at startup (see cli.rs) and then passed by reference
// into the crawler. There are no global constants for the seed URL or the
// target title.
//
// Rust concepts:
// - Default trait: sensible values for every knob
// - thiserror: typed errors for invalid options
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Desktop Chrome user agent sent by every rendering context unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const DEFAULT_BATCH_SIZE: usize = 4;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_FRONTIER: usize = 50_000;

// Errors we report for bad startup options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid start URL '{url}': {reason}")]
    InvalidStartUrl { url: String, reason: String },

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("invalid viewport '{0}', expected WIDTHxHEIGHT (e.g. 1920x1080)")]
    InvalidViewport(String),
}

// Timeouts for each stage of the settle heuristic (see crawl/settle.rs)
#[derive(Debug, Clone, PartialEq)]
pub struct SettleTimings {
    /// Stage 1: navigation-complete signals. Soft on timeout.
    pub navigation: Duration,
    /// Stage 2: SPA shell marker disappears. Soft on timeout.
    pub shell_marker: Duration,
    /// Stage 3: every fetch/XHR timing entry finished. Hard on timeout.
    pub resource_timing: Duration,
    /// Stage 4: unconditional delay.
    pub fixed_delay: Duration,
    /// Stage 5: re-check when tracked requests are still pending. Hard on timeout.
    pub pending_requests: Duration,
    /// How often a predicate is re-evaluated while waiting.
    pub poll_interval: Duration,
}

impl Default for SettleTimings {
    fn default() -> Self {
        Self {
            navigation: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            shell_marker: Duration::from_secs(10),
            resource_timing: Duration::from_secs(10),
            fixed_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            pending_requests: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

// Per-context browser settings, applied to every fresh page
#[derive(Debug, Clone, PartialEq)]
pub struct PageProfile {
    pub user_agent: String,
    pub viewport: Viewport,
    /// Extra HTTP headers as (name, value) pairs
    pub extra_headers: Vec<(String, String)>,
    pub bypass_csp: bool,
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
            extra_headers: vec![
                ("Accept-Language".to_string(), DEFAULT_ACCEPT_LANGUAGE.to_string()),
                ("Accept".to_string(), DEFAULT_ACCEPT.to_string()),
            ],
            bypass_csp: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

impl std::str::FromStr for Viewport {
    type Err = ConfigError;

    // Parses "1920x1080"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidViewport(s.to_string());
        let (w, h) = s.split_once(|c| c == 'x' || c == 'X').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self {
            width,
            height,
            ..Self::default()
        })
    }
}

// How the browser process itself is launched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserOptions {
    pub headed: bool,
    pub chrome_path: Option<PathBuf>,
}

// The complete configuration of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: String,
    pub target_title: String,
    pub batch_size: usize,
    /// Upper bound on queued-but-unvisited URLs
    pub max_frontier: usize,
    pub settle: SettleTimings,
    pub profile: PageProfile,
    pub browser: BrowserOptions,
    pub output_dir: PathBuf,
    /// Write already-collected matches when the run aborts
    pub flush_on_abort: bool,
}

impl CrawlConfig {
    /// Builds a config with default knobs for the given seed and title.
    pub fn new(start_url: impl Into<String>, target_title: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            target_title: target_title.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_frontier: DEFAULT_MAX_FRONTIER,
            settle: SettleTimings::default(),
            profile: PageProfile::default(),
            browser: BrowserOptions::default(),
            output_dir: PathBuf::from("."),
            flush_on_abort: true,
        }
    }

    /// Checks the options that can't be expressed in the type system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStartUrl {
            url: self.start_url.clone(),
            reason,
        };

        let url = Url::parse(&self.start_url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("URL has no host".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}
