// src/crawl/settle.rs
// =============================================================================
// Deciding when a rendered page has "settled".
//
// No single browser signal tells us that a JavaScript-heavy page is done
// loading, so we layer several weak ones, each with its own timeout:
//
//   1. navigation load signals        (soft: a timeout is ignored)
//   2. SPA shell marker disappears     (soft: timeout and errors ignored)
//   3. fetch/XHR timing entries done   (hard: a timeout fails the page)
//   4. fixed delay                     (always)
//   5. tracked requests still pending  -> repeat 3 with a shorter bound (hard)
//
// Every stage reports a StageOutcome instead of throwing, and the caller
// decides what a timeout means for that stage.
//
// Rust concepts:
// - tokio::time::timeout: bound a future without cancelling the browser work
// - Enums as explicit results
// =============================================================================

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use super::visit::VisitError;
use crate::config::SettleTimings;
use crate::driver::{DriverError, NavigationOutcome, RenderContext, RequestEvent, RequestKind};

/// True once the root element no longer carries the Next.js shell class.
pub const SHELL_MARKER_ABSENT_SCRIPT: &str =
    r#"(() => !document.documentElement.classList.contains("__next"))()"#;

/// True once every fetch/XHR resource-timing entry has a response end.
pub const FETCHES_COMPLETE_SCRIPT: &str = r#"(() => window.performance
    .getEntriesByType("resource")
    .filter((r) => r.initiatorType === "fetch" || r.initiatorType === "xmlhttprequest")
    .every((r) => r.responseEnd > 0))()"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Navigation,
    ShellMarker,
    ResourceTiming,
    FixedDelay,
    PendingRequests,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Navigation => "navigation",
            Stage::ShellMarker => "shell marker",
            Stage::ResourceTiming => "resource timing",
            Stage::FixedDelay => "fixed delay",
            Stage::PendingRequests => "pending requests",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Settled,
    TimedOutIgnorable,
    TimedOutFatal,
}

// What happened during settling, stage by stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettleReport {
    pub stages: Vec<(Stage, StageOutcome)>,
    /// Pending fetch/XHR requests seen after the fixed delay
    pub pending_after_delay: usize,
}

impl SettleReport {
    fn record(
        &mut self,
        stage: Stage,
        outcome: StageOutcome,
        timeout: Duration,
    ) -> Result<(), VisitError> {
        debug!(%stage, ?outcome, "settle stage finished");
        self.stages.push((stage, outcome));
        match outcome {
            StageOutcome::TimedOutFatal => Err(VisitError::SettleTimeout { stage, timeout }),
            _ => Ok(()),
        }
    }
}

// In-flight fetch/XHR requests of a single page visit.
//
// Owned by the visit that created it. The browser side only sends messages
// into the channel; nothing else touches the set.
pub struct PendingRequests {
    events: UnboundedReceiver<RequestEvent>,
    // request id -> url
    in_flight: HashMap<String, String>,
}

impl PendingRequests {
    pub fn new(events: UnboundedReceiver<RequestEvent>) -> Self {
        Self {
            events,
            in_flight: HashMap::new(),
        }
    }

    // Applies every event delivered so far
    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, event: RequestEvent) {
        match event {
            RequestEvent::Started { id, url, kind } => {
                if matches!(kind, RequestKind::Fetch | RequestKind::Xhr) {
                    self.in_flight.insert(id, url);
                }
            }
            RequestEvent::Finished { id } | RequestEvent::Failed { id } => {
                self.in_flight.remove(&id);
            }
        }
    }

    /// Number of tracked requests still in flight.
    pub fn len(&mut self) -> usize {
        self.drain();
        self.in_flight.len()
    }

    pub fn urls(&mut self) -> Vec<String> {
        self.drain();
        self.in_flight.values().cloned().collect()
    }
}

// Re-evaluates a boolean script until it returns true
async fn poll_until<C: RenderContext>(
    context: &C,
    script: &str,
    interval: Duration,
) -> Result<(), DriverError> {
    loop {
        let value = context.evaluate(script).await?;
        match value.as_bool() {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => {
                return Err(DriverError::InvalidResult(format!(
                    "expected boolean, got {}",
                    value
                )))
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Waits for `script` to become true within `limit`.
///
/// Only the waiting stops at the deadline; whatever the browser was doing
/// keeps running. `on_timeout` says how the caller classifies a timeout.
pub async fn wait_for_predicate<C: RenderContext>(
    context: &C,
    script: &str,
    limit: Duration,
    interval: Duration,
    on_timeout: StageOutcome,
) -> Result<StageOutcome, DriverError> {
    match tokio::time::timeout(limit, poll_until(context, script, interval)).await {
        Ok(Ok(())) => Ok(StageOutcome::Settled),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(on_timeout),
    }
}

/// Stage 1: navigate and wait for load signals.
pub async fn navigate<C: RenderContext>(
    context: &C,
    url: &str,
    timings: &SettleTimings,
    report: &mut SettleReport,
) -> Result<(), VisitError> {
    let outcome = match context.navigate(url, timings.navigation).await? {
        NavigationOutcome::Loaded => StageOutcome::Settled,
        NavigationOutcome::TimedOut => StageOutcome::TimedOutIgnorable,
    };
    report.record(Stage::Navigation, outcome, timings.navigation)
}

/// Stages 2 to 5, run after navigation.
pub async fn settle<C: RenderContext>(
    context: &C,
    pending: &mut PendingRequests,
    timings: &SettleTimings,
    report: &mut SettleReport,
) -> Result<(), VisitError> {
    // Stage 2: an error is as ignorable as a timeout here
    let shell = wait_for_predicate(
        context,
        SHELL_MARKER_ABSENT_SCRIPT,
        timings.shell_marker,
        timings.poll_interval,
        StageOutcome::TimedOutIgnorable,
    )
    .await
    .unwrap_or(StageOutcome::TimedOutIgnorable);
    report.record(Stage::ShellMarker, shell, timings.shell_marker)?;

    // Stage 3
    let fetches = wait_for_predicate(
        context,
        FETCHES_COMPLETE_SCRIPT,
        timings.resource_timing,
        timings.poll_interval,
        StageOutcome::TimedOutFatal,
    )
    .await?;
    report.record(Stage::ResourceTiming, fetches, timings.resource_timing)?;

    // Stage 4
    tokio::time::sleep(timings.fixed_delay).await;
    report.record(Stage::FixedDelay, StageOutcome::Settled, timings.fixed_delay)?;

    // Stage 5
    let still_pending = pending.len();
    report.pending_after_delay = still_pending;
    if still_pending > 0 {
        println!("⏳ Waiting {} pending requests...", still_pending);
        debug!(urls = ?pending.urls(), "pending fetch/xhr requests");
        let outcome = wait_for_predicate(
            context,
            FETCHES_COMPLETE_SCRIPT,
            timings.pending_requests,
            timings.poll_interval,
            StageOutcome::TimedOutFatal,
        )
        .await?;
        report.record(Stage::PendingRequests, outcome, timings.pending_requests)?;
    }

    Ok(())
}
