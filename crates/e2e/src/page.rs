//! Page-object base
//!
//! Every page object owns a [`PageContext`]: the scenario's session, a
//! logger scoped to the page name, the clock, and the scaled bounded waits.
//! Higher-level operations compose with [`PageContext::with_timing`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use foundry_common::{log_context, PageLogger, TimeoutConfig};

use crate::clock::Clock;
use crate::error::{E2eError, E2eResult};
use crate::session::{Locator, SessionHandle, WaitState};

/// Capability contract every page object implements
#[async_trait]
pub trait PageObject: Send + Sync {
    fn context(&self) -> &PageContext;

    /// Navigate to the feature's entry point
    async fn navigate(&self) -> E2eResult<()>;

    /// Assert the feature's stable marker has rendered
    async fn verify_loaded(&self) -> E2eResult<()>;
}

/// Session, scoped logger and entry path bound to one page object
#[derive(Clone)]
pub struct PageContext {
    name: String,
    path: String,
    session: SessionHandle,
    logger: PageLogger,
    clock: Arc<dyn Clock>,
    timeouts: TimeoutConfig,
}

impl PageContext {
    pub fn new(
        name: &str,
        path: &str,
        session: SessionHandle,
        logger: PageLogger,
        clock: Arc<dyn Clock>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            session,
            logger,
            clock,
            timeouts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry path relative to the base URL
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn logger(&self) -> &PageLogger {
        &self.logger
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Scale a fixed bound by the configured multiplier
    pub fn bound(&self, bound: Duration) -> Duration {
        self.timeouts.scale(bound)
    }

    /// Navigate to `path` and wait for network quiescence
    pub async fn navigate_to_path(&self, path: &str, label: &str) -> E2eResult<()> {
        let url = self.session.url_for(path);
        self.logger.step(&format!("Navigate to {}", label));
        self.logger.debug_with("Navigating", log_context!("url" => url));

        let timeout = self.timeouts.navigation();
        let settled = async {
            self.session.goto(&url).await?;
            self.session.wait_for_network_idle(timeout).await
        };
        match settled.await {
            Ok(()) => {
                self.logger.success(&format!("Navigated to {}", label));
                Ok(())
            }
            Err(E2eError::Timeout(_)) => Err(E2eError::NavigationTimeout {
                path: path.to_string(),
                timeout,
            }),
            Err(e) => Err(e),
        }
    }

    /// Wait for network quiescence after an in-page action
    pub async fn settle(&self) -> E2eResult<()> {
        let timeout = self.timeouts.navigation();
        match self.session.wait_for_network_idle(timeout).await {
            Err(E2eError::Timeout(_)) => Err(E2eError::NavigationTimeout {
                path: self.path.clone(),
                timeout,
            }),
            other => other,
        }
    }

    /// Assert `locator` becomes visible within `bound` (scaled)
    pub async fn expect_visible(&self, locator: &Locator, bound: Duration) -> E2eResult<()> {
        let timeout = self.bound(bound);
        match self
            .session
            .wait_for(locator, WaitState::Visible, timeout)
            .await
        {
            Err(E2eError::Timeout(_)) => Err(E2eError::AssertionFailed(format!(
                "{} not visible within {:?}",
                locator, timeout
            ))),
            other => other,
        }
    }

    /// Visibility probe that never fails the caller
    pub async fn probe_visible(&self, locator: &Locator, bound: Duration) -> bool {
        self.session
            .wait_for(locator, WaitState::Visible, self.bound(bound))
            .await
            .is_ok()
    }

    /// Run `op` as a named, timed operation.
    ///
    /// Success logs the duration; failure logs the error and returns it
    /// unchanged. The record is written on every exit path, including
    /// cancellation of the returned future.
    pub async fn with_timing<T, F>(&self, label: &str, op: F) -> E2eResult<T>
    where
        F: Future<Output = E2eResult<T>>,
    {
        let span = tracing::info_span!("operation", page = %self.name, label);
        let mut operation = Operation::start(label, &self.logger, self.clock.as_ref());
        let result = op.instrument(span).await;
        match &result {
            Ok(_) => operation.succeed(),
            Err(e) => operation.fail(e),
        }
        result
    }
}

/// Outcome of a timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// A named unit of work; logs its outcome exactly once
struct Operation<'a> {
    label: &'a str,
    logger: &'a PageLogger,
    clock: &'a dyn Clock,
    started: Duration,
    outcome: Option<Outcome>,
}

impl<'a> Operation<'a> {
    fn start(label: &'a str, logger: &'a PageLogger, clock: &'a dyn Clock) -> Self {
        Self {
            label,
            logger,
            clock,
            started: clock.elapsed(),
            outcome: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.clock.elapsed().saturating_sub(self.started)
    }

    fn succeed(&mut self) {
        self.outcome = Some(Outcome::Success);
        self.logger.performance(self.label, self.elapsed());
    }

    fn fail(&mut self, err: &E2eError) {
        self.outcome = Some(Outcome::Failure);
        self.logger.error_with(
            &format!("{} failed", self.label),
            Some(err),
            log_context!("duration_ms" => self.elapsed().as_millis() as u64),
        );
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.logger.error_with(
                &format!("{} abandoned before completion", self.label),
                None,
                log_context!("duration_ms" => self.elapsed().as_millis() as u64),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::fake::FakeSession;
    use foundry_common::{LogLevel, LogMode, Logger};

    fn context(logger: &Logger, clock: Arc<VirtualClock>, fake: FakeSession) -> PageContext {
        PageContext::new(
            "TestPage",
            "/foundry/home",
            SessionHandle::new(Arc::new(fake)),
            logger.for_page("TestPage"),
            clock,
            TimeoutConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_with_timing_logs_success_duration() {
        let logger = Logger::capturing(LogMode::default());
        let clock = Arc::new(VirtualClock::new());
        let ctx = context(&logger, clock.clone(), FakeSession::new("https://console.test"));

        let value = ctx
            .with_timing("Fill form", async {
                clock.advance(Duration::from_millis(1500));
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let events = logger.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "[PERF] Fill form completed in 1.50s");
        assert_eq!(events[0].context["duration_ms"], 1500);
    }

    #[tokio::test]
    async fn test_with_timing_logs_and_returns_failure() {
        let logger = Logger::capturing(LogMode::default());
        let clock = Arc::new(VirtualClock::new());
        let ctx = context(&logger, clock, FakeSession::new("https://console.test"));

        let err = ctx
            .with_timing("Submit form", async {
                Err::<(), _>(E2eError::SubmissionRejected("no toast".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::SubmissionRejected(_)));

        let events = logger.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Error);
        assert!(events[0].message.starts_with("[ERROR] Submit form failed - "));
    }

    #[tokio::test]
    async fn test_with_timing_logs_when_dropped_mid_flight() {
        let logger = Logger::capturing(LogMode::default());
        let clock = Arc::new(VirtualClock::new());
        let ctx = context(&logger, clock, FakeSession::new("https://console.test"));

        let pending = ctx.with_timing("Refresh recent data", futures::future::pending::<E2eResult<()>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        let events = logger.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("abandoned"));
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_attributed() {
        let logger = Logger::capturing(LogMode::default());
        let fake = FakeSession::new("https://console.test/");
        fake.dom().network_busy = true;
        let ctx = context(&logger, Arc::new(VirtualClock::new()), fake);

        let err = ctx
            .navigate_to_path("/foundry/home", "Foundry Home")
            .await
            .unwrap_err();
        match err {
            E2eError::NavigationTimeout { path, timeout } => {
                assert_eq!(path, "/foundry/home");
                assert_eq!(timeout, Duration::from_secs(15));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_expect_visible_maps_timeout_to_assertion() {
        let logger = Logger::capturing(LogMode::default());
        let fake = FakeSession::new("https://console.test");
        let ctx = context(&logger, Arc::new(VirtualClock::new()), fake);

        let err = ctx
            .expect_visible(&Locator::css("h1"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
    }
}
