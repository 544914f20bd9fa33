// src/crawl/orchestrator.rs
// =============================================================================
// The crawl loop.
//
// How it works:
// 1. Seed the frontier with the start URL
// 2. Take up to `batch_size` URLs (they are marked visited right away)
// 3. Visit them all concurrently and wait for every one of them
// 4. Record matching titles, feed discovered links back into the frontier
// 5. Repeat until the frontier is empty
//
// Batches never overlap: the next one starts only after the previous one
// has completely finished. A failing page only loses its own contribution.
// Only a lost browser stops the run, and then the partial report is handed
// back inside CrawlAborted.
// =============================================================================

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::frontier::{Frontier, Offer};
use super::visit::{visit_page, PageVisit, VisitError};
use crate::config::CrawlConfig;
use crate::driver::{DriverError, RenderDriver};

// A page whose title matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Matches in the order they were found
    pub matches: Vec<PageResult>,
    /// Every URL that was dispatched
    pub visited: Vec<String>,
    /// Pages that failed to render or extract
    pub failed: usize,
    /// Links dropped because the frontier was full
    pub dropped: usize,
    pub batches: usize,
}

#[derive(Debug, Error)]
#[error("crawl aborted after {} page(s): {source}", .report.visited.len())]
pub struct CrawlAborted {
    pub report: CrawlReport,
    #[source]
    pub source: VisitError,
}

pub struct Crawler<'a, D: RenderDriver> {
    driver: &'a D,
    config: &'a CrawlConfig,
    frontier: Frontier,
    report: CrawlReport,
}

impl<'a, D: RenderDriver> Crawler<'a, D> {
    pub fn new(driver: &'a D, config: &'a CrawlConfig) -> Self {
        let mut frontier = Frontier::new(config.max_frontier.max(1));
        frontier.offer(&config.start_url);

        Self {
            driver,
            config,
            frontier,
            report: CrawlReport::default(),
        }
    }

    /// Crawls until the frontier is empty or the browser is lost.
    pub async fn run(mut self) -> Result<CrawlReport, CrawlAborted> {
        while !self.frontier.is_empty() {
            let batch = self.frontier.take_batch(self.config.batch_size);
            self.report.batches += 1;
            self.report.visited.extend(batch.iter().cloned());

            let visits = batch
                .iter()
                .map(|url| visit_page(self.driver, self.config, url));
            let results = join_all(visits).await;

            let mut fatal = None;
            for (url, result) in batch.iter().zip(results) {
                match result {
                    Ok(visit) => self.absorb(visit),
                    Err(e) => {
                        eprintln!("❌ Error in {}: {}", url, e);
                        self.report.failed += 1;
                        if e.is_fatal() && fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                }
            }

            // Pages that were in flight when Chromium died can fail with
            // ordinary protocol errors before the loss is noticed
            if fatal.is_none() && self.driver.is_closed() {
                fatal = Some(VisitError::Driver(DriverError::Closed));
            }

            println!(
                "📊 Progress: {} processed, {} in queue",
                self.frontier.visited_count(),
                self.frontier.len()
            );

            if let Some(source) = fatal {
                return Err(CrawlAborted {
                    report: self.report,
                    source,
                });
            }
        }

        Ok(self.report)
    }

    // Merges one successful visit into the crawl state
    fn absorb(&mut self, visit: PageVisit) {
        debug!(url = %visit.url, stages = ?visit.settle.stages, "page settled");
        if visit.extracted.title == self.config.target_title {
            println!(
                "✅ Found page with title {} : {}",
                self.config.target_title, visit.url
            );
            self.report.matches.push(PageResult {
                url: visit.url.clone(),
                title: visit.extracted.title.clone(),
            });
        }

        for link in &visit.extracted.links {
            if self.frontier.offer(link) == Offer::Full {
                self.report.dropped += 1;
                debug!(link = %link, "frontier full, dropping link");
            }
        }
    }
}
