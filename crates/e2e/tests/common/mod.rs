//! Simulated Foundry console for integration tests
//!
//! Scripts a `FakeSession` the way the live console reacts: menus open on
//! click, a submitted record is indexed only after some refreshes, and a
//! triggered workflow completes only after some reloads of the execution log.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use foundry_common::{E2eConfig, LogMode, Logger, Record};
use foundry_e2e::pages::{ingestion, workflows};
use foundry_e2e::session::ElementSnapshot;
use foundry_e2e::{FakeDom, FakeSession, IngestionPage, SessionHandle, VirtualClock, WorkflowsPage};

pub const BASE_URL: &str = "https://console.test";
pub const WORKFLOW: &str = "Ingest Data to LogScale";

/// How the simulated console behaves
#[derive(Debug, Clone)]
pub struct ConsoleScript {
    /// Refresh clicks after submission before the record's card renders
    pub index_after_refreshes: Option<usize>,
    /// Badge rendered on the submitted card (None echoes the severity)
    pub badge_override: Option<String>,
    /// Cards already in the results list
    pub existing_cards: Vec<ElementSnapshot>,
    /// Workflow names in the unfiltered listing
    pub listing: Vec<String>,
    /// Query of the listing rows on which the unfiltered listing first renders
    pub listing_on_query: usize,
    /// Every workflow the filter can find
    pub catalog: Vec<String>,
    /// Whether "Execute now" shows the triggered notice
    pub confirm_trigger: bool,
    /// Reloads of the execution log before the run completes
    pub complete_after_reloads: Option<usize>,
    /// Status shown while the run has not completed
    pub pending_status: String,
    /// Name cell of the triggered run in the execution log
    pub run_label: String,
}

impl Default for ConsoleScript {
    fn default() -> Self {
        Self {
            index_after_refreshes: Some(1),
            badge_override: None,
            existing_cards: Vec::new(),
            listing: vec!["Other workflow".to_string(), WORKFLOW.to_string()],
            listing_on_query: 1,
            catalog: vec!["Other workflow".to_string(), WORKFLOW.to_string()],
            confirm_trigger: true,
            complete_after_reloads: Some(1),
            pending_status: "In progress".to_string(),
            run_label: WORKFLOW.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct AppState {
    submitted: Vec<Record>,
    refreshes_since_submit: usize,
    triggered: bool,
    reloads: usize,
    listing_queries_left: Option<usize>,
}

pub fn card_for(record: &Record, badge: &str) -> ElementSnapshot {
    ElementSnapshot::new(format!("{} {} {}", record.event_type, badge, record.description))
        .with_field(ingestion::card_fields::LABEL, &[record.event_type.as_str()])
        .with_field(ingestion::card_fields::BADGE, &[badge])
        .with_field(ingestion::card_fields::DESCRIPTION, &[record.description.as_str()])
}

fn listing_row(name: &str) -> ElementSnapshot {
    ElementSnapshot::new(format!("{} On demand", name))
        .with_field("link", &[name])
        .with_field("cells", &[name, "On demand"])
}

fn execution_row(name: &str, status: &str) -> ElementSnapshot {
    ElementSnapshot::new(format!("{} {}", name, status))
        .with_field("link", &[name])
        .with_field("cells", &[name, status, "just now"])
}

fn show_listing(dom: &mut FakeDom, names: &[String]) {
    let rows = names.iter().map(|n| listing_row(n)).collect();
    dom.set_elements(&workflows::locators::rows(), rows);
    for i in 0..names.len() {
        dom.show(&workflows::locators::open_menu(i));
    }
}

fn show_form(dom: &mut FakeDom) {
    use ingestion::locators::*;
    for locator in [
        app_frame(),
        heading(),
        event_type(),
        severity(),
        description(),
        additional_fields(),
        fill_test_data_button(),
        submit_button(),
        refresh_button(),
    ] {
        dom.show(&locator);
    }
}

/// Install the console's reactions on `fake`
pub fn install(fake: &FakeSession, config: &E2eConfig, script: &ConsoleScript) {
    let state = Arc::new(Mutex::new(AppState::default()));
    fake.dom().show(&ingestion::locators::nav_trigger());
    install_ingestion(fake, config, script, &state);
    install_workflows(fake, script, &state);
}

fn install_ingestion(fake: &FakeSession, config: &E2eConfig, script: &ConsoleScript, state: &Arc<Mutex<AppState>>) {
    use ingestion::locators;

    fake.on_click(&locators::nav_trigger(), |dom| dom.show(&locators::custom_apps()));
    let app = locators::app_entry(&config.app_name);
    let entry = app.clone();
    fake.on_click(&locators::custom_apps(), move |dom| dom.show(&entry));
    fake.on_click(&app, |dom| dom.show(&locators::data_ingestion_link()));
    let existing = script.existing_cards.clone();
    fake.on_click(&locators::data_ingestion_link(), move |dom| {
        show_form(dom);
        if !existing.is_empty() {
            dom.set_elements(&locators::cards(), existing.clone());
        }
    });

    fake.on_click(&locators::fill_test_data_button(), |dom| {
        dom.set_value(&locators::event_type(), "test_event");
        dom.set_value(&locators::severity(), "medium");
        dom.set_value(&locators::description(), "Test data from the app");
        dom.set_value(&locators::additional_fields(), r#"{"source": "fill-test-data"}"#);
        dom.show(&locators::success_toast_with("Form populated"));
    });

    let submitted = Arc::clone(state);
    fake.on_click(&locators::submit_button(), move |dom| {
        let extra = dom.value(&locators::additional_fields()).unwrap_or_default().to_string();
        if !extra.trim().is_empty() && serde_json::from_str::<serde_json::Value>(&extra).is_err() {
            dom.set_elements(
                &locators::error_toast(),
                vec![ElementSnapshot::new("Invalid JSON in additional fields")],
            );
            return;
        }
        let record = Record {
            event_type: dom.value(&locators::event_type()).unwrap_or_default().to_string(),
            severity: dom.value(&locators::severity()).unwrap_or_default().to_string(),
            description: dom.value(&locators::description()).unwrap_or_default().to_string(),
            additional_fields: (!extra.is_empty()).then_some(extra),
        };
        let mut state = submitted.lock();
        state.submitted.push(record);
        state.refreshes_since_submit = 0;
        dom.show(&locators::success_toast_with("successfully ingested"));
    });

    let refreshed = Arc::clone(state);
    let index_after = script.index_after_refreshes;
    let badge_override = script.badge_override.clone();
    let existing = script.existing_cards.clone();
    fake.on_click(&locators::refresh_button(), move |dom| {
        let mut state = refreshed.lock();
        state.refreshes_since_submit += 1;
        let indexed = index_after.is_some_and(|n| state.refreshes_since_submit >= n);
        let mut cards = existing.clone();
        if indexed {
            for record in state.submitted.iter().rev() {
                let badge = badge_override.clone().unwrap_or_else(|| record.severity_label());
                cards.insert(0, card_for(record, &badge));
            }
        }
        dom.set_elements(&locators::cards(), cards);
    });
}

fn install_workflows(fake: &FakeSession, script: &ConsoleScript, state: &Arc<Mutex<AppState>>) {
    use workflows::locators;

    fake.on_click(&locators::nav_trigger(), |dom| dom.show(&locators::fusion_soar()));
    fake.on_click(&locators::fusion_soar(), |dom| dom.show(&locators::workflows_link()));
    let listing = script.listing.clone();
    let render_on = script.listing_on_query;
    let navigated = Arc::clone(state);
    fake.on_click(&locators::workflows_link(), move |dom| {
        dom.show(&locators::heading());
        dom.show(&locators::search_button());
        if render_on <= 1 {
            show_listing(dom, &listing);
        } else {
            dom.set_elements(&locators::rows(), Vec::new());
            navigated.lock().listing_queries_left = Some(render_on);
        }
    });
    let listing = script.listing.clone();
    let queried = Arc::clone(state);
    fake.on_query(&locators::rows(), move |dom| {
        let mut state = queried.lock();
        match state.listing_queries_left {
            Some(n) if n <= 1 => {
                show_listing(dom, &listing);
                state.listing_queries_left = None;
            }
            Some(n) => state.listing_queries_left = Some(n - 1),
            None => {}
        }
    });
    fake.on_click(&locators::search_button(), |dom| {
        dom.show(&locators::filter_input());
        dom.show(&locators::apply_button());
    });
    let catalog = script.catalog.clone();
    fake.on_click(&locators::apply_button(), move |dom| {
        let filter = dom.value(&locators::filter_input()).unwrap_or_default().to_lowercase();
        let hits: Vec<String> = catalog
            .iter()
            .filter(|name| name.to_lowercase().contains(&filter))
            .cloned()
            .collect();
        show_listing(dom, &hits);
    });

    let rows = script.listing.len().max(script.catalog.len());
    for i in 0..rows {
        fake.on_click(&locators::open_menu(i), |dom| dom.show(&locators::execute_menu_item()));
    }
    fake.on_click(&locators::execute_menu_item(), |dom| {
        dom.show(&locators::execute_modal_heading());
        dom.show(&locators::code_editor());
        dom.show(&locators::execute_now());
    });

    let triggered = Arc::clone(state);
    let confirm = script.confirm_trigger;
    fake.on_click(&locators::execute_now(), move |dom| {
        triggered.lock().triggered = true;
        if confirm {
            dom.show(&locators::triggered_notice());
        }
    });

    let opened = Arc::clone(state);
    let log = ExecutionLog {
        complete_after: script.complete_after_reloads,
        pending: script.pending_status.clone(),
        run_label: script.run_label.clone(),
    };
    fake.on_goto("/workflow/fusion/executions", {
        let log = log.clone();
        move |dom| {
            let state = opened.lock();
            log.render(dom, &state);
        }
    });

    let reloaded = Arc::clone(state);
    fake.on_reload(move |dom| {
        let mut state = reloaded.lock();
        state.reloads += 1;
        log.render(dom, &state);
    });
}

#[derive(Clone)]
struct ExecutionLog {
    complete_after: Option<usize>,
    pending: String,
    run_label: String,
}

impl ExecutionLog {
    fn render(&self, dom: &mut FakeDom, state: &AppState) {
        let mut rows = vec![execution_row("Other workflow", "Completed")];
        if state.triggered {
            let done = self.complete_after.is_some_and(|n| state.reloads >= n);
            let status = if done { "Completed" } else { self.pending.as_str() };
            rows.insert(0, execution_row(&self.run_label, status));
        }
        dom.set_elements(&workflows::locators::rows(), rows);
    }
}

/// One simulated console bound to page objects
pub struct Console {
    pub fake: Arc<FakeSession>,
    pub handle: SessionHandle,
    pub clock: Arc<VirtualClock>,
    pub logger: Logger,
    pub config: E2eConfig,
}

impl Console {
    pub fn new(script: ConsoleScript) -> Self {
        let config = E2eConfig {
            base_url: BASE_URL.to_string(),
            ..Default::default()
        };
        let fake = Arc::new(FakeSession::new(BASE_URL));
        install(&fake, &config, &script);
        Self {
            handle: SessionHandle::new(fake.clone()),
            fake,
            clock: Arc::new(VirtualClock::new()),
            logger: Logger::capturing(LogMode::default()),
            config,
        }
    }

    pub fn ingestion(&self) -> IngestionPage {
        IngestionPage::new(self.handle.clone(), &self.logger, self.clock.clone(), &self.config)
    }

    pub fn workflows(&self) -> WorkflowsPage {
        WorkflowsPage::new(self.handle.clone(), &self.logger, self.clock.clone(), &self.config)
    }

    /// Logged messages containing `needle`
    pub fn logged(&self, needle: &str) -> Vec<String> {
        self.logger
            .events()
            .into_iter()
            .map(|e| e.message)
            .filter(|m| m.contains(needle))
            .collect()
    }
}
