//! Workflow console: lookup, on-demand execution and execution-log polling

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use foundry_common::{E2eConfig, ExecutionStatus, Logger, TerminalState};

use crate::clock::Clock;
use crate::error::{E2eError, E2eResult};
use crate::page::{PageContext, PageObject};
use crate::poller::{Converged, Observation, Observe, Poller, Schedule};
use crate::session::{ElementSnapshot, Field, Selector, SessionHandle};

const HOME_PATH: &str = "/foundry/home";
const WORKFLOWS_PATH: &str = "/workflow/fusion";
const EXECUTIONS_PATH: &str = "/workflow/fusion/executions";
const HEADING_BOUND: Duration = Duration::from_secs(10);
const LISTING_BOUND: Duration = Duration::from_secs(10);
const FILTERED_BOUND: Duration = Duration::from_secs(5);
const ROW_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MODAL_BOUND: Duration = Duration::from_secs(10);
const TRIGGER_BOUND: Duration = Duration::from_secs(15);
const SUCCESS_NOTICE_BOUND: Duration = Duration::from_secs(5);
const CANVAS_PROBE: Duration = Duration::from_secs(5);
const VIEW_LINK_PROBE: Duration = Duration::from_secs(2);

pub mod locators {
    use crate::session::{Locator, Selector, TextMatch};

    pub fn nav_trigger() -> Locator {
        Locator::test_id("nav-trigger")
    }

    pub fn fusion_soar() -> Locator {
        Locator::role("navigation").then(Selector::Role {
            role: "button".to_string(),
            name: Some(TextMatch::exact("Fusion SOAR")),
        })
    }

    pub fn workflows_link() -> Locator {
        Locator::role_named("link", TextMatch::exact("Workflows"))
    }

    pub fn heading() -> Locator {
        Locator::role_named("heading", TextMatch::contains("Workflow"))
    }

    pub fn search_button() -> Locator {
        Locator::role_named("button", TextMatch::contains("search workflows"))
    }

    pub fn filter_input() -> Locator {
        Locator::placeholder(TextMatch::contains("filter"))
    }

    pub fn apply_button() -> Locator {
        Locator::role_named("button", TextMatch::exact("Apply"))
    }

    pub fn rows() -> Locator {
        Locator::role("row")
    }

    pub fn row(index: usize) -> Locator {
        rows().nth(index)
    }

    pub fn row_link(index: usize) -> Locator {
        row(index)
            .then(Selector::Role {
                role: "link".to_string(),
                name: None,
            })
            .first()
    }

    pub fn open_menu(index: usize) -> Locator {
        row(index).then(Selector::Label {
            text: TextMatch::exact("Open menu"),
        })
    }

    pub fn execute_menu_item() -> Locator {
        Locator::role_named("menuitem", TextMatch::exact("Execute workflow"))
    }

    pub fn execute_modal_heading() -> Locator {
        Locator::role_named("heading", TextMatch::contains("execute on demand workflow"))
    }

    pub fn code_editor() -> Locator {
        Locator::css(".CodeMirror-scroll")
    }

    pub fn execute_now() -> Locator {
        Locator::role_named("button", TextMatch::exact("Execute now"))
    }

    pub fn triggered_notice() -> Locator {
        Locator::text(TextMatch::contains("workflow execution triggered"))
    }

    pub fn view_link() -> Locator {
        Locator::role_named("link", TextMatch::exact("View"))
    }

    pub fn canvas() -> Locator {
        Locator::css(r#"[class*="workflow"], [class*="canvas"], [class*="flow"]"#)
    }
}

fn row_fields() -> Vec<Field> {
    vec![
        Field {
            name: "link".to_string(),
            selector: Selector::Role {
                role: "link".to_string(),
                name: None,
            },
        },
        Field::css("cells", "td"),
    ]
}

/// Workflow name compared case-insensitively after collapsing whitespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowName {
    raw: String,
    normalized: String,
}

impl WorkflowName {
    pub fn new(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            normalized: normalize(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Exact equality; a longer name containing this one does not match
    pub fn matches(&self, candidate: &str) -> bool {
        normalize(candidate) == self.normalized
    }

    /// Whether a listing row names this workflow in its link or any cell
    pub fn names_row(&self, row: &ElementSnapshot) -> bool {
        row.field_all("link")
            .iter()
            .chain(row.field_all("cells"))
            .any(|text| self.matches(text))
    }

    /// Whether the name appears in `text` as whole words
    pub fn mentioned_in(&self, text: &str) -> bool {
        let haystack = normalize(text);
        haystack.match_indices(self.normalized.as_str()).any(|(at, found)| {
            let before = haystack[..at].chars().next_back();
            let after = haystack[at + found.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Where a workflow was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    FoundDirectly(usize),
    FoundAfterFilter(usize),
    NotFound,
}

impl Lookup {
    /// Row index, when found
    pub fn row(&self) -> Option<usize> {
        match self {
            Lookup::FoundDirectly(i) | Lookup::FoundAfterFilter(i) => Some(*i),
            Lookup::NotFound => None,
        }
    }
}

/// Progress of one trigger-and-verify run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    NotStarted,
    Triggered,
    Polling,
    Completed,
    TimedOut,
}

impl From<RunPhase> for TerminalState {
    fn from(phase: RunPhase) -> Self {
        match phase {
            RunPhase::NotStarted | RunPhase::Triggered => TerminalState::Pending,
            RunPhase::Polling => TerminalState::InProgress,
            RunPhase::Completed => TerminalState::Completed,
            RunPhase::TimedOut => TerminalState::TimedOut,
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunReport {
    pub workflow: String,
    pub phase: RunPhase,
    pub status: ExecutionStatus,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl WorkflowRunReport {
    pub fn terminal_state(&self) -> TerminalState {
        self.phase.into()
    }
}

pub struct WorkflowsPage {
    ctx: PageContext,
    schedule: Schedule,
    phase: Mutex<RunPhase>,
}

impl WorkflowsPage {
    pub fn new(session: SessionHandle, logger: &Logger, clock: Arc<dyn Clock>, config: &E2eConfig) -> Self {
        Self {
            ctx: PageContext::new(
                "Workflows",
                WORKFLOWS_PATH,
                session,
                logger.for_page("Workflows"),
                clock,
                config.timeouts.clone(),
            ),
            schedule: Schedule::from_config(&config.workflow),
            phase: Mutex::new(RunPhase::NotStarted),
        }
    }

    /// Replace the execution-log schedule
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Phase reached by the latest trigger-and-verify run
    pub fn run_phase(&self) -> RunPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock() = phase;
    }

    fn action_timeout(&self) -> Duration {
        self.ctx.timeouts().default_timeout()
    }

    /// Navigate to the workflow listing through the Fusion SOAR menu
    pub async fn navigate_to_workflows(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Navigate to Workflows", async {
                let session = self.ctx.session();
                self.ctx.logger().info("Navigating to Fusion SOAR Workflows");
                self.ctx.navigate_to_path(HOME_PATH, "Foundry Home").await?;

                self.ctx.logger().step("Open navigation menu");
                session.click(&locators::nav_trigger(), self.action_timeout()).await?;
                self.ctx.settle().await?;

                self.ctx.logger().step("Click Fusion SOAR button");
                session.click(&locators::fusion_soar(), self.action_timeout()).await?;

                self.ctx.logger().step("Click Workflows link");
                session.click(&locators::workflows_link(), self.action_timeout()).await?;

                self.ctx.settle().await?;
                self.verify_loaded().await
            })
            .await
    }

    /// Apply the listing's text filter
    pub async fn search_workflow(&self, name: &str) -> E2eResult<()> {
        self.ctx
            .with_timing(&format!("Search for workflow: {}", name), async {
                let session = self.ctx.session();
                self.ctx.logger().info(&format!("Searching for workflow: {}", name));
                session.click(&locators::search_button(), self.action_timeout()).await?;
                session
                    .fill(&locators::filter_input(), name, self.action_timeout())
                    .await?;
                session.click(&locators::apply_button(), self.action_timeout()).await?;
                self.ctx.settle().await?;
                self.ctx.logger().success(&format!("Searched for workflow: {}", name));
                Ok(())
            })
            .await
    }

    async fn find_row(&self, name: &WorkflowName) -> E2eResult<Option<usize>> {
        let rows = self
            .ctx
            .session()
            .query(&locators::rows(), &row_fields())
            .await?;
        Ok(rows.iter().position(|row| name.names_row(row)))
    }

    /// Re-read the listing until a row names the workflow or `bound` (scaled) passes
    async fn wait_for_row(&self, name: &WorkflowName, bound: Duration) -> E2eResult<Option<usize>> {
        let clock = self.ctx.clock();
        let bound = self.ctx.bound(bound);
        let started = clock.elapsed();
        loop {
            if let Some(i) = self.find_row(name).await? {
                return Ok(Some(i));
            }
            if clock.elapsed().saturating_sub(started) >= bound {
                return Ok(None);
            }
            clock.sleep(ROW_POLL_INTERVAL).await;
        }
    }

    /// Look in the current listing, then again after filtering by name
    pub async fn locate(&self, name: &str) -> E2eResult<Lookup> {
        let wanted = WorkflowName::new(name);
        if let Some(i) = self.wait_for_row(&wanted, LISTING_BOUND).await? {
            return Ok(Lookup::FoundDirectly(i));
        }

        self.ctx
            .logger()
            .info("Workflow not immediately visible, trying search filter");
        self.search_workflow(name).await?;
        Ok(match self.wait_for_row(&wanted, FILTERED_BOUND).await? {
            Some(i) => Lookup::FoundAfterFilter(i),
            None => Lookup::NotFound,
        })
    }

    pub async fn verify_workflow_exists(&self, name: &str) -> E2eResult<Lookup> {
        self.ctx
            .with_timing(&format!("Verify workflow exists: {}", name), async {
                self.ctx.logger().info(&format!("Verifying workflow exists: {}", name));
                let lookup = self.locate(name).await?;
                match lookup {
                    Lookup::FoundDirectly(_) => {
                        self.ctx.logger().success(&format!("Workflow found: {}", name))
                    }
                    Lookup::FoundAfterFilter(_) => self
                        .ctx
                        .logger()
                        .success(&format!("Workflow found after search: {}", name)),
                    Lookup::NotFound => return Err(E2eError::WorkflowNotFound(name.to_string())),
                }
                Ok(lookup)
            })
            .await
    }

    async fn require_row(&self, name: &str) -> E2eResult<usize> {
        self.locate(name)
            .await?
            .row()
            .ok_or_else(|| E2eError::WorkflowNotFound(name.to_string()))
    }

    pub async fn open_workflow(&self, name: &str) -> E2eResult<()> {
        self.ctx
            .with_timing(&format!("Open workflow: {}", name), async {
                let row = self.require_row(name).await?;
                self.ctx
                    .session()
                    .click(&locators::row_link(row), self.action_timeout())
                    .await?;
                self.ctx.settle().await?;
                self.ctx.logger().success(&format!("Opened workflow: {}", name));
                Ok(())
            })
            .await
    }

    /// Open the workflow; a missing canvas is only a warning
    pub async fn verify_workflow_renders(&self, name: &str) -> E2eResult<()> {
        self.ctx
            .with_timing(&format!("Verify workflow renders: {}", name), async {
                self.open_workflow(name).await?;
                if self.ctx.probe_visible(&locators::canvas(), CANVAS_PROBE).await {
                    self.ctx
                        .logger()
                        .success(&format!("Workflow renders correctly: {}", name));
                } else {
                    self.ctx.logger().warn(&format!(
                        "Workflow page loaded but canvas not detected: {}",
                        name
                    ));
                }
                Ok(())
            })
            .await
    }

    /// Trigger an on-demand run, optionally replacing the input payload
    pub async fn execute_workflow(&self, name: &str, payload: Option<&Value>) -> E2eResult<()> {
        self.ctx
            .with_timing(&format!("Execute workflow: {}", name), async {
                let session = self.ctx.session();
                self.ctx.logger().info(&format!("Executing workflow: {}", name));
                self.navigate_to_workflows().await?;

                let row = self.require_row(name).await?;
                self.ctx.logger().step("Open workflow row menu");
                session.click(&locators::open_menu(row), self.action_timeout()).await?;
                session
                    .click(&locators::execute_menu_item(), self.action_timeout())
                    .await?;
                self.ctx
                    .expect_visible(&locators::execute_modal_heading(), MODAL_BOUND)
                    .await?;
                self.ctx.logger().info("Execution modal opened");

                if let Some(payload) = payload {
                    self.ctx.logger().step("Fill workflow input payload");
                    session.click(&locators::code_editor(), self.action_timeout()).await?;
                    session.press_key("Meta+a").await?;
                    session.press_key("Control+a").await?;
                    session.type_text(&serde_json::to_string_pretty(payload)?).await?;
                }

                self.ctx.logger().step("Click Execute now button");
                session.click(&locators::execute_now(), self.action_timeout()).await?;
                self.expect_trigger_notice(name, TRIGGER_BOUND).await?;
                self.ctx
                    .logger()
                    .success(&format!("Workflow execution triggered: {}", name));
                Ok(())
            })
            .await
    }

    async fn expect_trigger_notice(&self, name: &str, bound: Duration) -> E2eResult<()> {
        match self
            .ctx
            .expect_visible(&locators::triggered_notice(), bound)
            .await
        {
            Err(E2eError::AssertionFailed(reason)) => Err(E2eError::TriggerNotConfirmed {
                workflow: name.to_string(),
                reason,
            }),
            other => other,
        }
    }

    /// Poll the execution log until the latest run of `name` shows "Completed"
    pub async fn verify_execution_completed(&self, name: &str) -> E2eResult<Converged<ExecutionStatus>> {
        self.ctx
            .with_timing("Verify execution completed", async {
                self.ctx
                    .logger()
                    .info("Verifying workflow execution completed via Execution log");
                self.ctx
                    .navigate_to_path(EXECUTIONS_PATH, "Execution log")
                    .await?;

                let mut observer = ExecutionProgress {
                    page: self,
                    name: WorkflowName::new(name),
                    attempt: 0,
                    last_status: None,
                };
                let label = format!("Execution of '{}' completed", name);
                let result = Poller::for_page(&self.ctx, label, self.schedule.clone())
                    .poll_until(&mut observer)
                    .await;
                match result {
                    Err(E2eError::PollExhausted { history, .. }) => Err(E2eError::ExecutionTimedOut {
                        workflow: name.to_string(),
                        last_status: observer.last_status,
                        history,
                    }),
                    other => other,
                }
            })
            .await
    }

    /// Check the triggered notification of a just-started run
    pub async fn verify_workflow_execution_success(&self, name: &str) -> E2eResult<()> {
        self.ctx
            .with_timing(&format!("Verify workflow execution success: {}", name), async {
                self.expect_trigger_notice(name, SUCCESS_NOTICE_BOUND).await?;
                self.ctx
                    .logger()
                    .success(&format!("Workflow execution confirmed: {}", name));
                if self.ctx.probe_visible(&locators::view_link(), VIEW_LINK_PROBE).await {
                    self.ctx.logger().info("Execution details view link available");
                }
                Ok(())
            })
            .await
    }

    /// Trigger a run, then wait for it to complete
    pub async fn execute_and_verify_workflow(
        &self,
        name: &str,
        payload: Option<&Value>,
    ) -> E2eResult<WorkflowRunReport> {
        self.ctx
            .with_timing(&format!("Execute and verify workflow: {}", name), async {
                self.set_phase(RunPhase::NotStarted);
                self.execute_workflow(name, payload).await?;
                self.set_phase(RunPhase::Triggered);

                self.set_phase(RunPhase::Polling);
                let converged = match self.verify_execution_completed(name).await {
                    Ok(converged) => converged,
                    Err(e) => {
                        if matches!(e, E2eError::ExecutionTimedOut { .. }) {
                            self.set_phase(RunPhase::TimedOut);
                        }
                        return Err(e);
                    }
                };
                self.set_phase(RunPhase::Completed);

                Ok(WorkflowRunReport {
                    workflow: name.to_string(),
                    phase: RunPhase::Completed,
                    status: converged.value,
                    attempts: converged.attempt,
                    elapsed_ms: converged.elapsed.as_millis() as u64,
                })
            })
            .await
    }
}

#[async_trait]
impl PageObject for WorkflowsPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    async fn navigate(&self) -> E2eResult<()> {
        self.navigate_to_workflows().await
    }

    async fn verify_loaded(&self) -> E2eResult<()> {
        self.ctx.expect_visible(&locators::heading(), HEADING_BOUND).await?;
        self.ctx.logger().success("Workflows page loaded");
        Ok(())
    }
}

/// Status of the most recent execution-log row for one workflow
struct ExecutionProgress<'a> {
    page: &'a WorkflowsPage,
    name: WorkflowName,
    attempt: u32,
    last_status: Option<ExecutionStatus>,
}

/// Status shown in a row: the first cell that reads as a known status
fn row_status(row: &ElementSnapshot) -> ExecutionStatus {
    row.field_all("cells")
        .iter()
        .find_map(|cell| ExecutionStatus::parse(cell))
        .unwrap_or_else(|| ExecutionStatus::Other(row.text.trim().to_string()))
}

#[async_trait]
impl<'a> Observe for ExecutionProgress<'a> {
    type Output = ExecutionStatus;

    async fn resample(&mut self, attempt: u32) -> E2eResult<()> {
        self.attempt = attempt;
        if attempt > 1 {
            self.page.ctx.session().reload().await?;
            self.page.ctx.settle().await?;
        }
        Ok(())
    }

    async fn observe(&mut self) -> E2eResult<Observation<ExecutionStatus>> {
        let rows = self
            .page
            .ctx
            .session()
            .query(&locators::rows(), &row_fields())
            .await?;
        let row = rows
            .iter()
            .find(|row| self.name.names_row(row))
            .or_else(|| rows.iter().find(|row| self.name.mentioned_in(&row.text)));
        let Some(row) = row else {
            self.page.ctx.logger().info(&format!(
                "Waiting for execution to appear (attempt {})",
                self.attempt
            ));
            return Ok(Observation::pending().with_snippet("execution not listed yet"));
        };

        let status = row_status(row);
        self.last_status = Some(status.clone());
        match status {
            ExecutionStatus::Completed => {
                Ok(Observation::converged(status).with_snippet("status Completed"))
            }
            ExecutionStatus::InProgress => {
                self.page.ctx.logger().info(&format!(
                    "Execution still in progress, refreshing (attempt {})",
                    self.attempt
                ));
                Ok(Observation::pending().with_snippet("status In progress"))
            }
            other => Ok(Observation::pending().with_snippet(format!("status {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Ingest Data to LogScale", true ; "identical")]
    #[test_case("ingest data to logscale", true ; "case differs")]
    #[test_case("  Ingest  Data to\tLogScale ", true ; "whitespace differs")]
    #[test_case("Ingest Data to LogScale v2", false ; "superstring")]
    #[test_case("Ingest Data", false ; "prefix")]
    fn test_workflow_name_matching(candidate: &str, expected: bool) {
        assert_eq!(WorkflowName::new("Ingest Data to LogScale").matches(candidate), expected);
    }

    #[test_case("Ingest Data to LogScale (on demand) Completed", true ; "decorated")]
    #[test_case("Run of ingest data to  LogScale", true ; "embedded")]
    #[test_case("Ingest Data to LogScaleX Completed", false ; "partial word")]
    #[test_case("Other workflow Completed", false ; "unrelated")]
    fn test_workflow_name_mentioned_in_row_text(text: &str, expected: bool) {
        assert_eq!(WorkflowName::new("Ingest Data to LogScale").mentioned_in(text), expected);
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let name = WorkflowName::new("Ingest (v1.*)");
        assert!(name.matches("ingest (V1.*)"));
        assert!(!name.matches("Ingest (v1x)"));
    }

    #[test_case(&["Ingest Data to LogScale", "Completed", "2m"], ExecutionStatus::Completed)]
    #[test_case(&["Ingest Data to LogScale", "In progress"], ExecutionStatus::InProgress)]
    #[test_case(&["Ingest Data to LogScale", "Failed"], ExecutionStatus::Failed)]
    fn test_row_status(cells: &[&str], expected: ExecutionStatus) {
        let row = ElementSnapshot::new(cells.join(" ")).with_field("cells", cells);
        assert_eq!(row_status(&row), expected);
    }

    #[test]
    fn test_unknown_status_keeps_row_text() {
        let row = ElementSnapshot::new("Ingest Data to LogScale Cancelled")
            .with_field("cells", &["Ingest Data to LogScale", "Cancelled"]);
        assert_eq!(
            row_status(&row),
            ExecutionStatus::Other("Ingest Data to LogScale Cancelled".to_string())
        );
    }

    #[test]
    fn test_run_phase_terminal_states() {
        assert_eq!(TerminalState::from(RunPhase::Completed), TerminalState::Completed);
        assert_eq!(TerminalState::from(RunPhase::TimedOut), TerminalState::TimedOut);
        assert!(!TerminalState::from(RunPhase::Polling).is_terminal());
    }

    #[test]
    fn test_row_locators() {
        assert_eq!(
            locators::open_menu(2).to_string(),
            "role=row >> nth=2 >> label=\"Open menu\""
        );
        assert_eq!(
            locators::fusion_soar().to_string(),
            "role=navigation >> role=button[name=\"Fusion SOAR\"]"
        );
    }
}
