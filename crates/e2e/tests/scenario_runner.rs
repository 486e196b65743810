//! Serial scenario runs against the simulated console

mod common;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::Arc;

use common::{install, ConsoleScript, BASE_URL};
use foundry_common::{E2eConfig, LogMode, Logger};
use foundry_e2e::runner::write_results;
use foundry_e2e::{
    foundry_scenarios, E2eError, E2eResult, FakeSession, Scenario, ScenarioContext, ScenarioRunner,
    Session, SessionFactory, VirtualClock,
};

/// Fresh simulated console per scenario; keeps every session for inspection
struct SimulatedConsoles {
    config: E2eConfig,
    script: ConsoleScript,
    opened: Arc<Mutex<Vec<Arc<FakeSession>>>>,
}

#[async_trait]
impl SessionFactory for SimulatedConsoles {
    async fn open(&self) -> E2eResult<Arc<dyn Session>> {
        let fake = Arc::new(FakeSession::new(BASE_URL));
        install(&fake, &self.config, &self.script);
        self.opened.lock().push(fake.clone());
        Ok(fake as Arc<dyn Session>)
    }
}

struct Harness {
    runner: ScenarioRunner,
    opened: Arc<Mutex<Vec<Arc<FakeSession>>>>,
    _output: tempfile::TempDir,
}

fn harness(script: ConsoleScript) -> Harness {
    harness_with(script, foundry_scenarios())
}

fn harness_with(script: ConsoleScript, scenarios: Vec<Scenario>) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let config = E2eConfig {
        base_url: BASE_URL.to_string(),
        output_dir: output.path().to_path_buf(),
        ..Default::default()
    };
    let opened = Arc::new(Mutex::new(Vec::new()));
    let factory = SimulatedConsoles {
        config: config.clone(),
        script,
        opened: opened.clone(),
    };
    let runner = ScenarioRunner::new(
        config,
        Logger::capturing(LogMode::default()),
        Box::new(factory),
        scenarios,
    )
    .with_clock(Arc::new(VirtualClock::new()));
    Harness {
        runner,
        opened,
        _output: output,
    }
}

#[tokio::test]
async fn test_all_scenarios_pass_on_fresh_sessions() {
    let h = harness(ConsoleScript {
        index_after_refreshes: Some(2),
        ..Default::default()
    });

    let suite = h.runner.run_all().await;
    assert!(suite.success(), "{:#?}", suite.results);
    assert_eq!(suite.total, 4);
    assert_eq!(suite.passed, 4);

    let opened = h.opened.lock();
    assert_eq!(opened.len(), 4);
    assert!(opened.iter().all(|s| s.dom().closed));

    let path = h.runner.write_results(&suite).unwrap();
    assert!(path.ends_with("test-results.json"));
}

#[tokio::test]
async fn test_failure_records_step_history_and_screenshot() {
    let h = harness(ConsoleScript {
        complete_after_reloads: None,
        ..Default::default()
    });

    let suite = h.runner.run_tagged("workflow").await;
    assert_eq!(suite.total, 1);
    assert!(!suite.success());

    let result = &suite.results[0];
    assert!(result.error.as_deref().unwrap().contains("did not complete"));
    assert_eq!(result.attempts.as_ref().map(|h| h.len()), Some(13));
    assert!(result.last_step.is_some());
    let shot = result.screenshot.as_ref().unwrap();
    assert!(shot.ends_with("screenshots/should-execute-ingest-data-to-logscale-workflow.png"));
    assert!(shot.exists());
    assert!(h.opened.lock()[0].dom().closed);
}

#[tokio::test]
async fn test_run_named_unknown_scenario() {
    let h = harness(ConsoleScript::default());
    let err = h.runner.run_named("no such scenario").await.unwrap_err();
    assert!(matches!(err, E2eError::ScenarioNotFound(name) if name == "no such scenario"));
    assert!(h.opened.lock().is_empty());
}

#[tokio::test]
async fn test_run_named_single_scenario() {
    let h = harness(ConsoleScript::default());
    let suite = h
        .runner
        .run_named("should use Fill with Test Data button and submit")
        .await
        .unwrap();
    assert_eq!(suite.total, 1);
    assert!(suite.success());

    let dir = tempfile::tempdir().unwrap();
    let path = write_results(dir.path(), &suite).unwrap();
    let json = std::fs::read_to_string(path).unwrap();
    assert!(json.contains("should use Fill with Test Data button and submit"));
}

fn fail_before_any_step(_ctx: &ScenarioContext) -> BoxFuture<'_, E2eResult<()>> {
    async { Err(E2eError::Driver("browser crashed".to_string())) }.boxed()
}

#[tokio::test]
async fn test_last_step_is_scoped_to_the_failing_scenario() {
    let mut scenarios = foundry_scenarios();
    scenarios.truncate(1);
    scenarios.push(Scenario {
        name: "fails before any step",
        suite: "Runner",
        tags: &["runner"],
        run: fail_before_any_step,
    });
    let h = harness_with(ConsoleScript::default(), scenarios);

    let suite = h.runner.run_all().await;
    assert_eq!(suite.passed, 1);
    let failed = &suite.results[1];
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap().contains("browser crashed"));
    assert_eq!(failed.last_step, None);
}
