//! Serial scenario runner
//!
//! Scenarios share one remote application and its data, so they run one at
//! a time, each on a fresh session. A failed scenario is never retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use foundry_common::{E2eConfig, Logger};

use crate::clock::{Clock, TokioClock};
use crate::error::{E2eError, E2eResult};
use crate::pages::{IngestionPage, WorkflowsPage};
use crate::playwright::{PlaywrightConfig, PlaywrightSession};
use crate::poller::PollHistory;
use crate::session::{Session, SessionHandle};

/// Scenario body
pub type ScenarioFn = for<'a> fn(&'a ScenarioContext) -> BoxFuture<'a, E2eResult<()>>;

/// A named end-to-end check
#[derive(Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub suite: &'static str,
    pub tags: &'static [&'static str],
    pub run: ScenarioFn,
}

impl Scenario {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| *t == tag)
    }
}

/// Page objects bound to one scenario's session
pub struct ScenarioContext {
    pub ingestion: IngestionPage,
    pub workflows: WorkflowsPage,
    pub config: E2eConfig,
    pub logger: Logger,
    pub session: SessionHandle,
}

impl ScenarioContext {
    pub fn new(session: SessionHandle, logger: &Logger, clock: Arc<dyn Clock>, config: &E2eConfig) -> Self {
        Self {
            ingestion: IngestionPage::new(session.clone(), logger, clock.clone(), config),
            workflows: WorkflowsPage::new(session.clone(), logger, clock, config),
            config: config.clone(),
            logger: logger.clone(),
            session,
        }
    }
}

/// Opens the session a scenario runs on
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> E2eResult<Arc<dyn Session>>;
}

/// One Playwright driver per scenario
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for PlaywrightFactory {
    async fn open(&self) -> E2eResult<Arc<dyn Session>> {
        Ok(Arc::new(PlaywrightSession::launch(&self.config).await?))
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub suite: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Last step logged before the failure
    pub last_step: Option<String>,
    /// Poll attempts carried by a convergence failure
    pub attempts: Option<PollHistory>,
    pub screenshot: Option<PathBuf>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .results
            .iter()
            .map(|r| {
                let mark = if r.success { "PASS" } else { "FAIL" };
                format!("{} {} > {} ({} ms)", mark, r.suite, r.name, r.duration_ms)
            })
            .collect();
        lines.push(format!(
            "{} passed, {} failed ({} ms)",
            self.passed, self.failed, self.duration_ms
        ));
        lines
    }
}

pub struct ScenarioRunner {
    config: E2eConfig,
    logger: Logger,
    factory: Box<dyn SessionFactory>,
    clock: Arc<dyn Clock>,
    scenarios: Vec<Scenario>,
}

impl ScenarioRunner {
    pub fn new(
        config: E2eConfig,
        logger: Logger,
        factory: Box<dyn SessionFactory>,
        scenarios: Vec<Scenario>,
    ) -> Self {
        Self {
            config,
            logger,
            factory,
            clock: Arc::new(TokioClock::new()),
            scenarios,
        }
    }

    /// Replace the clock driving scheduled waits
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub async fn run_all(&self) -> SuiteResult {
        let all: Vec<&Scenario> = self.scenarios.iter().collect();
        self.run_scenarios(&all).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, tag: &str) -> SuiteResult {
        let tagged: Vec<&Scenario> = self.scenarios.iter().filter(|s| s.has_tag(tag)).collect();
        self.run_scenarios(&tagged).await
    }

    /// Run one scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let scenario = self
            .scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        Ok(self.run_scenarios(&[scenario]).await)
    }

    /// Run scenarios strictly one after another
    pub async fn run_scenarios(&self, scenarios: &[&Scenario]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        self.logger.log_config_summary_once(&self.config.summary_lines());
        info!("Running {} scenario(s)...", scenarios.len());

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let suite = SuiteResult {
            run_id: Uuid::new_v4(),
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };
        self.logger.summary("E2E Results", &suite.summary_lines());
        suite
    }

    /// Run one scenario on a fresh session
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {} > {}", scenario.suite, scenario.name);

        let mut result = ScenarioResult {
            name: scenario.name.to_string(),
            suite: scenario.suite.to_string(),
            success: false,
            duration_ms: 0,
            error: None,
            last_step: None,
            attempts: None,
            screenshot: None,
        };

        let session = match self.factory.open().await {
            Ok(session) => SessionHandle::new(session),
            Err(e) => {
                result.error = Some(format!("session could not be opened: {}", e));
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        self.logger.clear_last_step();
        let ctx = ScenarioContext::new(session.clone(), &self.logger, self.clock.clone(), &self.config);
        match (scenario.run)(&ctx).await {
            Ok(()) => result.success = true,
            Err(e) => {
                result.error = Some(e.to_string());
                result.last_step = self.logger.last_step();
                result.attempts = e.history().cloned();
                result.screenshot = self.capture_failure(&session, scenario).await;
            }
        }

        if let Err(e) = session.close().await {
            warn!("Closing session for '{}' failed: {}", scenario.name, e);
        }
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    async fn capture_failure(&self, session: &SessionHandle, scenario: &Scenario) -> Option<PathBuf> {
        let dir = self.config.output_dir.join("screenshots");
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!("Cannot create {}: {}", dir.display(), e);
            return None;
        }
        let path = dir.join(format!("{}.png", slug(scenario.name)));
        match session.screenshot(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failure screenshot for '{}' failed: {}", scenario.name, e);
                None
            }
        }
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.config.output_dir, results)
    }
}

pub fn write_results(output_dir: &Path, results: &SuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("should navigate to LogScale app"), "should-navigate-to-logscale-app");
        assert_eq!(slug("  Fill + submit!! "), "fill-submit");
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let suite = SuiteResult {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            total: 1,
            passed: 0,
            failed: 1,
            duration_ms: 12,
            results: vec![ScenarioResult {
                name: "x".into(),
                suite: "s".into(),
                success: false,
                duration_ms: 12,
                error: Some("boom".into()),
                last_step: Some("Workflows: Click Execute now button".into()),
                attempts: Some(PollHistory::default()),
                screenshot: None,
            }],
        };
        let path = write_results(dir.path(), &suite).unwrap();
        let loaded: SuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(!loaded.success());
        assert_eq!(loaded.results[0].last_step.as_deref(), Some("Workflows: Click Execute now button"));
    }
}
