// src/output.rs
// =============================================================================
// Writing the matched pages to disk.
//
// The file is named after the moment the run started:
//   pages-2026-10-18-09-05-03.json
// Fields are zero-padded so the files sort by name in time order.
//
// The content is a pretty-printed JSON array of {url, title} objects.
// Nothing is written when there were no matches.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::crawl::PageResult;

/// Output file name for a run that started at `started_at`.
pub fn file_name<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("pages-{}.json", started_at.format("%Y-%m-%d-%H-%M-%S"))
}

/// Writes `results` into `dir` and returns the file path, or `None` when
/// there was nothing to write.
pub fn write_results<Tz: TimeZone>(
    dir: &Path,
    started_at: &DateTime<Tz>,
    results: &[PageResult],
) -> Result<Option<PathBuf>>
where
    Tz::Offset: Display,
{
    if results.is_empty() {
        return Ok(None);
    }

    // serde_json's pretty printer indents with two spaces
    let json = serde_json::to_string_pretty(results)?;
    let path = dir.join(file_name(started_at));
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(Some(path))
}
