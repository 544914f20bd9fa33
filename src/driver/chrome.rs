// src/driver/chrome.rs
// =============================================================================
// Chromium render driver built on chromiumoxide.
//
// How it works:
// 1. Launch one headless Chromium process for the whole run
// 2. Poll the DevTools handler on a background task (chromiumoxide needs
//    this, otherwise no command ever completes)
// 3. Every page visit opens its own tab ("context") and closes it afterwards
//
// When the handler task ends, the browser is gone. We remember that in an
// AtomicBool so later failures are reported as DriverError::Closed instead of
// looking like an ordinary page error.
// =============================================================================

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, Headers,
    ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Handler, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DriverError, NavigationOutcome, RenderContext, RenderDriver, RequestEvent, RequestKind};
use crate::config::{BrowserOptions, PageProfile, SettleTimings};

// Extra room on top of the navigation timeout before chromiumoxide gives up
// on a command by itself
const COMMAND_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

pub struct ChromeDriver {
    browser: Browser,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl ChromeDriver {
    /// Launches Chromium with the crawler's fixed flags.
    pub async fn launch(
        options: &BrowserOptions,
        timings: &SettleTimings,
    ) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--ignore-certificate-errors")
            .request_timeout(timings.navigation + COMMAND_TIMEOUT_SLACK);

        if options.headed {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(DriverError::Launch)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, closed.clone());

        debug!("chromium launched");
        Ok(Self {
            browser,
            handler_task,
            closed,
        })
    }
}

// Drives chromiumoxide's event loop until the connection ends
fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromium handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

// Converts a chromiumoxide error, taking the browser's liveness into account
fn map_cdp_error(closed: &AtomicBool, error: CdpError) -> DriverError {
    if closed.load(Ordering::SeqCst) {
        DriverError::Closed
    } else {
        DriverError::Protocol(error.to_string())
    }
}

#[async_trait]
impl RenderDriver for ChromeDriver {
    type Context = ChromeContext;

    async fn new_context(&self) -> Result<ChromeContext, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| map_cdp_error(&self.closed, e))?;

        Ok(ChromeContext {
            page,
            closed: self.closed.clone(),
            forwarder: None,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.handler_task.is_finished()
    }

    async fn close(self) -> Result<(), DriverError> {
        let ChromeDriver {
            mut browser,
            handler_task,
            closed,
        } = self;

        let result = match browser.close().await {
            Ok(_) => {
                if let Err(e) = browser.wait().await {
                    warn!("waiting for chromium to exit failed: {}", e);
                }
                Ok(())
            }
            Err(e) => Err(map_cdp_error(&closed, e)),
        };

        handler_task.abort();
        result
    }
}

// One browser tab
pub struct ChromeContext {
    page: Page,
    closed: Arc<AtomicBool>,
    // Task that turns CDP network events into RequestEvents
    forwarder: Option<JoinHandle<()>>,
}

impl ChromeContext {
    fn err(&self, error: CdpError) -> DriverError {
        map_cdp_error(&self.closed, error)
    }
}

fn request_kind(resource: Option<&ResourceType>) -> RequestKind {
    match resource {
        Some(ResourceType::Fetch) => RequestKind::Fetch,
        Some(ResourceType::Xhr) => RequestKind::Xhr,
        _ => RequestKind::Other,
    }
}

#[async_trait]
impl RenderContext for ChromeContext {
    async fn configure(&self, profile: &PageProfile) -> Result<(), DriverError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(profile.user_agent.clone()))
            .await
            .map_err(|e| self.err(e))?;

        let viewport = profile.viewport;
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                viewport.device_scale_factor,
                false,
            ))
            .await
            .map_err(|e| self.err(e))?;

        let headers: serde_json::Map<String, serde_json::Value> = profile
            .extra_headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(headers),
            )))
            .await
            .map_err(|e| self.err(e))?;

        if profile.bypass_csp {
            self.page
                .execute(SetBypassCspParams::new(true))
                .await
                .map_err(|e| self.err(e))?;
        }

        Ok(())
    }

    async fn subscribe_requests(&mut self) -> Result<UnboundedReceiver<RequestEvent>, DriverError> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| self.err(e))?;

        let mut started = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| self.err(e))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| self.err(e))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| self.err(e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(ev) = started.next() => RequestEvent::Started {
                        id: ev.request_id.inner().clone(),
                        url: ev.request.url.clone(),
                        kind: request_kind(ev.r#type.as_ref()),
                    },
                    Some(ev) = finished.next() => RequestEvent::Finished {
                        id: ev.request_id.inner().clone(),
                    },
                    Some(ev) = failed.next() => RequestEvent::Failed {
                        id: ev.request_id.inner().clone(),
                    },
                    else => break,
                };
                // Receiver dropped: the visit is over
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.forwarder.replace(forwarder) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationOutcome, DriverError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => Ok(NavigationOutcome::TimedOut),
            Ok(Err(CdpError::Timeout)) => Ok(NavigationOutcome::TimedOut),
            Ok(Err(e)) => Err(self.err(e)),
            Ok(Ok(_)) => Ok(NavigationOutcome::Loaded),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| match self.err(e) {
                DriverError::Protocol(msg) => DriverError::Evaluation(msg),
                other => other,
            })?;

        result
            .into_value::<serde_json::Value>()
            .map_err(|e| DriverError::InvalidResult(e.to_string()))
    }

    async fn close(self) -> Result<(), DriverError> {
        if let Some(forwarder) = self.forwarder {
            forwarder.abort();
        }
        let closed = self.closed;
        self.page
            .close()
            .await
            .map_err(|e| map_cdp_error(&closed, e))
    }
}
