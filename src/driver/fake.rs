// src/driver/fake.rs
// =============================================================================
// A scripted, in-memory render driver for tests.
//
// A FakeSite is a map of URL -> FakePage. Each page knows its title, the
// hrefs it contains and how it should misbehave (never-settling fetches,
// an SPA shell that never boots, a failing extraction script, ...).
//
// The site also records what the crawler did to it: navigations, how many
// contexts were open at once, and how long after navigation each page was
// extracted.
// =============================================================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use super::{
    DriverError, NavigationOutcome, RenderContext, RenderDriver, RequestEvent, RequestKind,
};
use crate::config::PageProfile;
use crate::crawl::extract::SNAPSHOT_SCRIPT;
use crate::crawl::settle::{FETCHES_COMPLETE_SCRIPT, SHELL_MARKER_ABSENT_SCRIPT};

// Simulated load time of every page
const LOAD_TIME: Duration = Duration::from_millis(50);

// When a late fetch shows up in the resource timing entries
const LATE_FETCH_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    title: String,
    hrefs: Vec<String>,
    fail_extraction: bool,
    malformed_snapshot: bool,
    spa_shell: bool,
    throwing_shell_check: bool,
    slow_navigation: bool,
    hanging_fetches: bool,
    late_fetch: bool,
    unfinished_requests: Vec<String>,
}

impl FakePage {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn links(mut self, hrefs: &[&str]) -> Self {
        self.hrefs = hrefs.iter().map(|href| href.to_string()).collect();
        self
    }

    /// The extraction script throws.
    pub fn failing(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// The extraction script returns an object without the expected fields.
    pub fn with_malformed_snapshot(mut self) -> Self {
        self.malformed_snapshot = true;
        self
    }

    /// The shell marker check throws instead of answering.
    pub fn with_throwing_shell_check(mut self) -> Self {
        self.throwing_shell_check = true;
        self
    }

    pub fn with_spa_shell(mut self) -> Self {
        self.spa_shell = true;
        self
    }

    pub fn with_slow_navigation(mut self) -> Self {
        self.slow_navigation = true;
        self
    }

    pub fn with_hanging_fetches(mut self) -> Self {
        self.hanging_fetches = true;
        self
    }

    /// A fetch that never finishes and only shows up in the resource timing
    /// entries a while after navigation, i.e. after the first fetch check.
    pub fn with_late_hanging_fetch(mut self, url: &str) -> Self {
        self.late_fetch = true;
        self.with_unfinished_request(url)
    }

    /// A fetch that starts during navigation and never reports back.
    pub fn with_unfinished_request(mut self, url: &str) -> Self {
        self.unfinished_requests.push(url.to_string());
        self
    }

    fn html(&self) -> String {
        let anchors: String = self
            .hrefs
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect();
        format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            self.title, anchors
        )
    }
}

#[derive(Default)]
struct SiteState {
    pages: Mutex<HashMap<String, FakePage>>,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    crashed: AtomicBool,
    crash_after: Mutex<Option<usize>>,
    // Commands fail as protocol errors when the browser goes away
    quiet_crash: AtomicBool,
    navigations: Mutex<Vec<String>>,
    extraction_delays: Mutex<Vec<Duration>>,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: FakePage) -> Self {
        self.state
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), page);
        self
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            state: self.state.clone(),
        }
    }

    /// Makes the browser disappear right now.
    pub fn crash_browser(&self) {
        self.state.crashed.store(true, Ordering::SeqCst);
    }

    /// Makes the browser disappear once `n` navigations have happened.
    pub fn crash_after_navigations(self, n: usize) -> Self {
        *self.state.crash_after.lock().unwrap() = Some(n);
        self
    }

    /// Like crash_after_navigations, but the failing navigation reports a
    /// plain protocol error, as in-flight commands do when Chromium dies.
    pub fn crash_quietly_after_navigations(self, n: usize) -> Self {
        self.state.quiet_crash.store(true, Ordering::SeqCst);
        self.crash_after_navigations(n)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.lock().unwrap().clone()
    }

    pub fn open_contexts(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn peak_open_contexts(&self) -> usize {
        self.state.peak_open.load(Ordering::SeqCst)
    }

    /// Time between navigation and extraction, per extracted page.
    pub fn extraction_delays(&self) -> Vec<Duration> {
        self.state.extraction_delays.lock().unwrap().clone()
    }
}

pub struct FakeDriver {
    state: Arc<SiteState>,
}

#[async_trait]
impl RenderDriver for FakeDriver {
    type Context = FakeContext;

    async fn new_context(&self) -> Result<FakeContext, DriverError> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open.fetch_max(open, Ordering::SeqCst);

        Ok(FakeContext {
            state: self.state.clone(),
            current: Mutex::new(None),
            events: Mutex::new(None),
        })
    }

    fn is_closed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    async fn close(self) -> Result<(), DriverError> {
        Ok(())
    }
}

pub struct FakeContext {
    state: Arc<SiteState>,
    // url + navigation instant
    current: Mutex<Option<(String, Instant)>>,
    events: Mutex<Option<UnboundedSender<RequestEvent>>>,
}

impl FakeContext {
    fn check_alive(&self) -> Result<(), DriverError> {
        if self.state.crashed.load(Ordering::SeqCst) {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    fn current_page(&self) -> Result<(String, Instant, FakePage), DriverError> {
        let current = self.current.lock().unwrap().clone();
        let (url, at) =
            current.ok_or_else(|| DriverError::Evaluation("no document".to_string()))?;
        let page = self
            .state
            .pages
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| DriverError::Evaluation("no document".to_string()))?;
        Ok((url, at, page))
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn configure(&self, _profile: &PageProfile) -> Result<(), DriverError> {
        self.check_alive()
    }

    async fn subscribe_requests(
        &mut self,
    ) -> Result<UnboundedReceiver<RequestEvent>, DriverError> {
        self.check_alive()?;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationOutcome, DriverError> {
        self.check_alive()?;

        let count = {
            let mut navigations = self.state.navigations.lock().unwrap();
            navigations.push(url.to_string());
            navigations.len()
        };
        if let Some(limit) = *self.state.crash_after.lock().unwrap() {
            if count > limit {
                self.state.crashed.store(true, Ordering::SeqCst);
                if self.state.quiet_crash.load(Ordering::SeqCst) {
                    return Err(DriverError::Protocol("Target closed".to_string()));
                }
                return Err(DriverError::Closed);
            }
        }

        let page = self
            .state
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DriverError::Protocol("net::ERR_NAME_NOT_RESOLVED".to_string()))?;

        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            for (i, request) in page.unfinished_requests.iter().enumerate() {
                let _ = tx.send(RequestEvent::Started {
                    id: format!("req-{}", i),
                    url: request.clone(),
                    kind: RequestKind::Fetch,
                });
            }
        }

        let outcome = if page.slow_navigation {
            tokio::time::sleep(timeout).await;
            NavigationOutcome::TimedOut
        } else {
            tokio::time::sleep(LOAD_TIME).await;
            NavigationOutcome::Loaded
        };

        *self.current.lock().unwrap() = Some((url.to_string(), Instant::now()));
        Ok(outcome)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        self.check_alive()?;
        let (url, navigated_at, page) = self.current_page()?;

        if script == SHELL_MARKER_ABSENT_SCRIPT {
            if page.throwing_shell_check {
                return Err(DriverError::Evaluation(
                    "ReferenceError: document is not defined".to_string(),
                ));
            }
            Ok(serde_json::Value::Bool(!page.spa_shell))
        } else if script == FETCHES_COMPLETE_SCRIPT {
            let late = page.late_fetch && navigated_at.elapsed() >= LATE_FETCH_AFTER;
            Ok(serde_json::Value::Bool(!(page.hanging_fetches || late)))
        } else if script == SNAPSHOT_SCRIPT {
            if page.fail_extraction {
                return Err(DriverError::Evaluation(
                    "TypeError: Cannot read properties of null".to_string(),
                ));
            }
            if page.malformed_snapshot {
                return Ok(serde_json::json!({ "title": null, "location": url }));
            }
            self.state
                .extraction_delays
                .lock()
                .unwrap()
                .push(navigated_at.elapsed());
            Ok(serde_json::json!({
                "title": page.title,
                "location": url,
                "baseUri": url,
                "html": page.html(),
            }))
        } else {
            Err(DriverError::Evaluation(format!("unexpected script: {}", script)))
        }
    }

    async fn close(self) -> Result<(), DriverError> {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
