// src/driver/mod.rs
// =============================================================================
// The render driver: the browser capabilities the crawler consumes.
//
// The crawler never talks to Chromium directly. It only needs:
// - a driver that hands out fresh rendering contexts (tabs)
// - contexts that can be configured, navigated, observed and scripted
//
// chrome.rs implements these traits on top of chromiumoxide. Tests use an
// in-memory fake (fake.rs) so crawl logic can be checked without a browser.
//
// Rust concepts:
// - Traits with associated types
// - async-trait: async fn in traits
// - mpsc channels: request events are delivered as messages to the page
//   visit that owns the receiver
// =============================================================================

mod chrome;
#[cfg(test)]
pub mod fake;

pub use chrome::ChromeDriver;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::PageProfile;

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The browser could not be started
    #[error("browser launch failed: {0}")]
    Launch(String),
    /// The browser process or its connection is gone
    #[error("browser connection closed")]
    Closed,
    /// A protocol command failed
    #[error("browser command failed: {0}")]
    Protocol(String),
    /// A script threw or could not be evaluated
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    /// A script returned something we couldn't interpret
    #[error("unexpected script result: {0}")]
    InvalidResult(String),
}

impl DriverError {
    /// True when the driver itself is unusable, not just one page.
    pub fn is_structural(&self) -> bool {
        matches!(self, DriverError::Closed | DriverError::Launch(_))
    }
}

// How a navigation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Loaded,
    /// The load signals didn't arrive in time. The page may still be usable.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Fetch,
    Xhr,
    Other,
}

// Network activity observed on one rendering context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    Started {
        id: String,
        url: String,
        kind: RequestKind,
    },
    Finished {
        id: String,
    },
    Failed {
        id: String,
    },
}

#[async_trait]
pub trait RenderDriver: Send + Sync + Sized {
    type Context: RenderContext;

    /// Opens a fresh, isolated rendering context.
    async fn new_context(&self) -> Result<Self::Context, DriverError>;

    /// True once the browser connection is gone for good.
    ///
    /// Commands that were already in flight when the browser died may have
    /// failed with a plain protocol error before this flips.
    fn is_closed(&self) -> bool;

    /// Shuts the browser down.
    async fn close(self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait RenderContext: Send + Sync + Sized {
    /// Applies user agent, viewport, headers and CSP settings.
    async fn configure(&self, profile: &PageProfile) -> Result<(), DriverError>;

    /// Starts delivering request events for this context.
    ///
    /// The receiver belongs to the caller; events stop when the context closes.
    async fn subscribe_requests(
        &mut self,
    ) -> Result<UnboundedReceiver<RequestEvent>, DriverError>;

    /// Navigates and waits for load signals, for at most `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration)
        -> Result<NavigationOutcome, DriverError>;

    /// Evaluates a JavaScript expression and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    async fn close(self) -> Result<(), DriverError>;
}
