//! Foundry E2E Convergence Framework
//!
//! Drives the Foundry console through Playwright and verifies that
//! asynchronous effects become observable:
//! - A submitted record shows up in the app's results list once the search
//!   index catches up
//! - A triggered workflow's latest run reaches "Completed" in the
//!   execution log
//!
//! Both checks go through one bounded poller with an explicit wait schedule,
//! an authoritative final check, and a per-attempt history that is attached
//! to the failure when the schedule runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ScenarioRunner (serial)                     │
//! │    ├── SessionFactory::open() -> Arc<dyn Session>           │
//! │    ├── ScenarioContext { ingestion, workflows, logger }     │
//! │    └── SuiteResult -> test-results.json                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page objects (PageContext::with_timing)                    │
//! │    ├── IngestionPage::verify_visible(record)                │
//! │    └── WorkflowsPage::execute_and_verify_workflow(name)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Poller { Schedule, Observe, PollHistory }                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session                                                    │
//! │    ├── PlaywrightSession (node driver, JSON lines)          │
//! │    └── FakeSession (in-memory DOM for tests)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod error;
pub mod fake;
pub mod page;
pub mod pages;
pub mod playwright;
pub mod poller;
pub mod preflight;
pub mod runner;
pub mod scenarios;
pub mod session;

pub use clock::{Clock, TokioClock, VirtualClock};
pub use error::{E2eError, E2eResult};
pub use fake::{FakeDom, FakeSession};
pub use page::{PageContext, PageObject};
pub use pages::{IngestionPage, WorkflowsPage};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightSession};
pub use poller::{Converged, Observation, Observe, PollHistory, PollState, Poller, Schedule};
pub use runner::{
    PlaywrightFactory, Scenario, ScenarioContext, ScenarioResult, ScenarioRunner, SessionFactory,
    SuiteResult,
};
pub use scenarios::foundry_scenarios;
pub use session::{Locator, Session, SessionHandle, TextMatch};
