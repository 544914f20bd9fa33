// src/crawl/visit.rs
// =============================================================================
// Processing a single URL.
//
// open context -> configure -> subscribe to requests -> navigate -> settle
// -> extract -> close context
//
// Whatever goes wrong inside comes back as a VisitError. The context is
// closed on every path.
// =============================================================================

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::extract::{self, Extracted};
use super::settle::{self, PendingRequests, SettleReport, Stage};
use crate::config::CrawlConfig;
use crate::driver::{DriverError, RenderContext, RenderDriver};

#[derive(Debug, Error)]
pub enum VisitError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("page did not settle: {stage} wait exceeded {timeout:?}")]
    SettleTimeout { stage: Stage, timeout: Duration },

    /// The page snapshot didn't have the shape we read
    #[error("could not read page: {0}")]
    Extraction(String),
}

impl VisitError {
    /// True when the browser is gone and the whole run can't continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VisitError::Driver(e) if e.is_structural())
    }
}

#[derive(Debug, Clone)]
pub struct PageVisit {
    pub url: String,
    pub extracted: Extracted,
    pub settle: SettleReport,
}

/// Renders `url` in a fresh context and reads it.
pub async fn visit_page<D: RenderDriver>(
    driver: &D,
    config: &CrawlConfig,
    url: &str,
) -> Result<PageVisit, VisitError> {
    let mut context = driver.new_context().await?;
    let result = drive(&mut context, config, url).await;

    if let Err(e) = context.close().await {
        warn!(url, error = %e, "closing page failed");
    }
    result
}

async fn drive<C: RenderContext>(
    context: &mut C,
    config: &CrawlConfig,
    url: &str,
) -> Result<PageVisit, VisitError> {
    context.configure(&config.profile).await?;
    let mut pending = PendingRequests::new(context.subscribe_requests().await?);

    println!("🔍 Processing: {}", url);

    let mut report = SettleReport::default();
    settle::navigate(&*context, url, &config.settle, &mut report).await?;
    settle::settle(&*context, &mut pending, &config.settle, &mut report).await?;

    let extracted = extract::extract(&*context).await?;
    Ok(PageVisit {
        url: url.to_string(),
        extracted,
        settle: report,
    })
}
