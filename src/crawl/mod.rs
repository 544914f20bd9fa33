// src/crawl/mod.rs
// =============================================================================
// This module handles website crawling.
//
// Features:
// - Breadth-first crawling starting from a URL, in fixed-size batches
// - Respects same-origin restriction (doesn't crawl external sites)
// - Each page is rendered in the browser and given time to settle
// - Pages whose title equals the target title are collected
//
// Submodules:
// - frontier: queue of discovered URLs + visited set
// - settle: deciding when a rendered page is ready to be read
// - extract: reading title and links from a settled page
// - visit: processing one URL end to end
// - orchestrator: the batch loop
// =============================================================================

mod frontier;
pub mod extract;
pub mod settle;
mod visit;
mod orchestrator;

// Re-export the main crawling API
pub use orchestrator::{CrawlAborted, CrawlReport, Crawler, PageResult};
