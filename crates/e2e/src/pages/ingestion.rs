//! Data-ingestion app: form submission and results-list visibility
//!
//! The app renders inside an embedded frame on the Foundry home page. A
//! submitted record reaches the results list only after the search index
//! catches up, so visibility is checked through the poller.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use foundry_common::{log_context, E2eConfig, Logger, Record};

use crate::clock::Clock;
use crate::error::{E2eError, E2eResult};
use crate::page::{PageContext, PageObject};
use crate::poller::{Converged, Observation, Observe, Poller, Schedule};
use crate::session::{ElementSnapshot, Field, SessionHandle, WaitState};

const HOME_PATH: &str = "/foundry/home";
const LOADED_BOUND: Duration = Duration::from_secs(15);
const REFRESH_BOUND: Duration = Duration::from_secs(15);
const CARD_BOUND: Duration = Duration::from_secs(15);
const EMPTY_STATE_BOUND: Duration = Duration::from_secs(10);
const SUBMENU_PROBE: Duration = Duration::from_secs(2);

/// Where the app's elements live
pub mod locators {
    use crate::session::{Locator, TextMatch};

    pub const APP_FRAME: &str = "iframe";
    pub const HEADING: &str = "Ingest Custom Data into LogScale";

    fn in_app(css: &str) -> Locator {
        Locator::css(css).in_frame(APP_FRAME)
    }

    pub fn app_frame() -> Locator {
        Locator::css(APP_FRAME)
    }

    pub fn heading() -> Locator {
        in_app("h1").has_text(TextMatch::contains(HEADING))
    }

    pub fn event_type() -> Locator {
        in_app("#eventType")
    }

    pub fn severity() -> Locator {
        in_app("#severity")
    }

    pub fn description() -> Locator {
        in_app("#description")
    }

    pub fn additional_fields() -> Locator {
        in_app("#additionalFields")
    }

    pub fn fill_test_data_button() -> Locator {
        in_app(r#"[data-test-selector="fill-test-data-button"]"#)
    }

    pub fn submit_button() -> Locator {
        in_app(r#"[data-test-selector="submit-data-button"]"#)
    }

    pub fn success_toast() -> Locator {
        in_app(r#"[role="alertdialog"].border-positive"#)
    }

    pub fn success_toast_with(text: &str) -> Locator {
        success_toast().has_text(TextMatch::contains(text))
    }

    pub fn error_toast() -> Locator {
        in_app(r#"[role="alertdialog"].border-critical"#)
    }

    pub fn refresh_button() -> Locator {
        in_app("#refreshBtn")
    }

    pub fn loading_state() -> Locator {
        in_app("#loadingState")
    }

    pub fn empty_state() -> Locator {
        in_app("#emptyState")
    }

    pub fn cards() -> Locator {
        in_app("#resultsContainer sl-card")
    }

    pub fn nav_trigger() -> Locator {
        Locator::test_id("nav-trigger")
    }

    pub fn custom_apps() -> Locator {
        Locator::role_named("button", TextMatch::exact("Custom apps"))
    }

    pub fn app_entry(app_name: &str) -> Locator {
        Locator::role_named("button", TextMatch::contains(app_name)).first()
    }

    pub fn data_ingestion_link() -> Locator {
        Locator::role_named("link", TextMatch::contains("Data Ingestion"))
    }
}

/// Sub-fields read from each result card
pub mod card_fields {
    pub const LABEL: &str = "label";
    pub const BADGE: &str = "badge";
    pub const DESCRIPTION: &str = "description";
}

fn card_fields() -> Vec<Field> {
    vec![
        Field::css(card_fields::LABEL, "strong"),
        Field::css(card_fields::BADGE, "sl-badge"),
        Field::css(card_fields::DESCRIPTION, "p.text-body-and-labels"),
    ]
}

/// A rendered result card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCard {
    pub label: String,
    pub badge: Option<String>,
    pub description: Option<String>,
}

impl From<&ElementSnapshot> for RecordCard {
    fn from(snapshot: &ElementSnapshot) -> Self {
        Self {
            label: snapshot
                .field(card_fields::LABEL)
                .unwrap_or_default()
                .trim()
                .to_string(),
            badge: snapshot.field(card_fields::BADGE).map(|b| b.trim().to_string()),
            description: snapshot
                .field(card_fields::DESCRIPTION)
                .map(|d| d.trim().to_string()),
        }
    }
}

impl RecordCard {
    pub fn is_labelled(&self, record: &Record) -> bool {
        self.label == record.event_type.trim()
    }

    /// Badge equals the severity (ignoring case) and the description is contained verbatim
    pub fn content_matches(&self, record: &Record) -> bool {
        let badge = self
            .badge
            .as_deref()
            .is_some_and(|b| b.eq_ignore_ascii_case(record.severity.trim()));
        let description = self
            .description
            .as_deref()
            .is_some_and(|d| d.contains(record.description.as_str()));
        badge && description
    }

    fn describe(&self) -> String {
        format!(
            "'{}' badge={} description={}",
            self.label,
            self.badge.as_deref().unwrap_or("<none>"),
            self.description.as_deref().unwrap_or("<none>")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardMatch {
    /// A card with the record's label and content
    Match(RecordCard),
    /// Labelled cards exist but none shows the record's content
    Mismatch(RecordCard),
    Absent,
}

/// Search rendered cards for `record`
pub fn match_card(cards: &[RecordCard], record: &Record) -> CardMatch {
    let mut labelled = cards.iter().filter(|c| c.is_labelled(record)).peekable();
    let Some(first) = labelled.peek().cloned().cloned() else {
        return CardMatch::Absent;
    };
    match labelled.find(|c| c.content_matches(record)) {
        Some(card) => CardMatch::Match(card.clone()),
        None => CardMatch::Mismatch(first),
    }
}

/// Lifecycle of the data-entry form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormState {
    #[default]
    Empty,
    Filled,
    Submitted,
    Rejected,
}

pub struct IngestionPage {
    ctx: PageContext,
    app_name: String,
    schedule: Schedule,
    form: Mutex<FormState>,
}

impl IngestionPage {
    pub fn new(session: SessionHandle, logger: &Logger, clock: Arc<dyn Clock>, config: &E2eConfig) -> Self {
        Self {
            ctx: PageContext::new(
                "LogScalePage",
                HOME_PATH,
                session,
                logger.for_page("LogScalePage"),
                clock,
                config.timeouts.clone(),
            ),
            app_name: config.app_name.clone(),
            schedule: Schedule::from_config(&config.ingestion),
            form: Mutex::new(FormState::Empty),
        }
    }

    /// Replace the visibility schedule
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn form_state(&self) -> FormState {
        *self.form.lock()
    }

    fn set_form(&self, state: FormState) {
        *self.form.lock() = state;
    }

    /// Navigate to the app through the Custom apps menu
    pub async fn navigate_to_app(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Navigate to LogScale app", async {
                let ctx = &self.ctx;
                let session = ctx.session();
                let timeout = ctx.timeouts().default_timeout();
                ctx.logger().info("Navigating to LogScale app via Custom Apps");

                ctx.navigate_to_path(HOME_PATH, "Foundry Home").await?;

                ctx.logger().step("Open navigation menu");
                session.click(&locators::nav_trigger(), timeout).await?;
                ctx.settle().await?;

                ctx.logger().step("Click Custom apps button");
                session.click(&locators::custom_apps(), timeout).await?;
                ctx.settle().await?;

                ctx.logger().step(&format!("Click {} button", self.app_name));
                session
                    .click(&locators::app_entry(&self.app_name), timeout)
                    .await?;

                let submenu = locators::data_ingestion_link();
                if ctx.probe_visible(&submenu, SUBMENU_PROBE).await {
                    ctx.logger().step("Click Data Ingestion link");
                    session.click(&submenu, timeout).await?;
                }

                ctx.settle().await?;
                self.verify_loaded().await
            })
            .await
    }

    pub async fn fill_form(&self, record: &Record) -> E2eResult<()> {
        self.ctx
            .with_timing("Fill form", async {
                let session = self.ctx.session();
                let timeout = self.ctx.timeouts().default_timeout();
                self.ctx.logger().info(&format!(
                    "Filling form with event_type: {}, severity: {}",
                    record.event_type, record.severity
                ));

                session
                    .fill(&locators::event_type(), &record.event_type, timeout)
                    .await?;
                session
                    .select_option(&locators::severity(), &record.severity, timeout)
                    .await?;
                session
                    .fill(&locators::description(), &record.description, timeout)
                    .await?;
                if let Some(extra) = &record.additional_fields {
                    session
                        .fill(&locators::additional_fields(), extra, timeout)
                        .await?;
                }

                self.set_form(FormState::Filled);
                self.ctx.logger().success("Form filled successfully");
                Ok(())
            })
            .await
    }

    /// Let the app populate the form with its built-in sample
    pub async fn click_fill_with_test_data(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Click Fill with Test Data", async {
                self.ctx.logger().step("Click Fill with Test Data button");
                self.ctx
                    .session()
                    .click(
                        &locators::fill_test_data_button(),
                        self.ctx.timeouts().default_timeout(),
                    )
                    .await?;
                self.wait_for_success_toast(Some("Form populated")).await?;

                self.set_form(FormState::Filled);
                self.ctx.logger().success("Form populated with test data");
                Ok(())
            })
            .await
    }

    pub async fn submit_form(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Submit form", async {
                self.ctx.logger().step("Click submit button");
                self.ctx
                    .session()
                    .click(&locators::submit_button(), self.ctx.timeouts().default_timeout())
                    .await?;
                self.ctx.logger().success("Form submitted");
                Ok(())
            })
            .await
    }

    /// Wait for a success notification, optionally carrying `expected_text`
    pub async fn wait_for_success_toast(&self, expected_text: Option<&str>) -> E2eResult<()> {
        self.ctx
            .with_timing("Wait for success toast", async {
                let toast = match expected_text {
                    Some(text) => locators::success_toast_with(text),
                    None => locators::success_toast(),
                };
                self.ctx
                    .expect_visible(&toast, Duration::from_millis(self.ctx.timeouts().confirmation_ms))
                    .await?;
                self.ctx.logger().success("Success toast appeared");
                Ok(())
            })
            .await
    }

    /// Wait for the ingestion confirmation, telling app-side rejections apart
    pub async fn wait_for_ingestion_success(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Wait for ingestion success", async {
                let candidates = [
                    locators::success_toast_with("successfully ingested"),
                    locators::error_toast(),
                ];
                let timeout = self.ctx.timeouts().confirmation();
                match self.ctx.session().wait_for_any(&candidates, timeout).await {
                    Ok(0) => {
                        self.set_form(FormState::Submitted);
                        self.ctx.logger().success("Data ingested");
                        Ok(())
                    }
                    Ok(_) => {
                        self.set_form(FormState::Rejected);
                        let message = self.error_toast_text().await;
                        if message.contains("Invalid JSON") {
                            Err(E2eError::FormValidation(message))
                        } else {
                            Err(E2eError::SubmissionRejected(message))
                        }
                    }
                    Err(E2eError::Timeout(_)) => {
                        self.set_form(FormState::Rejected);
                        Err(E2eError::SubmissionRejected(format!(
                            "no confirmation within {:?}",
                            timeout
                        )))
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn error_toast_text(&self) -> String {
        match self.ctx.session().query(&locators::error_toast(), &[]).await {
            Ok(toasts) => toasts
                .first()
                .map(|t| t.text.trim().to_string())
                .unwrap_or_else(|| "error notification without text".to_string()),
            Err(e) => format!("error notification unreadable: {}", e),
        }
    }

    /// Fill, submit and wait for the confirmation
    pub async fn submit(&self, record: &Record) -> E2eResult<()> {
        self.ctx
            .with_timing("Submit record", async {
                self.fill_form(record).await?;
                self.submit_form().await?;
                self.wait_for_ingestion_success().await
            })
            .await
    }

    /// Read back what the form currently holds
    pub async fn form_values(&self) -> E2eResult<Record> {
        let session = self.ctx.session();
        let extra = session.input_value(&locators::additional_fields()).await?;
        Ok(Record {
            event_type: session.input_value(&locators::event_type()).await?,
            severity: session.input_value(&locators::severity()).await?,
            description: session.input_value(&locators::description()).await?,
            additional_fields: (!extra.is_empty()).then_some(extra),
        })
    }

    pub async fn refresh_recent_data(&self) -> E2eResult<()> {
        self.ctx
            .with_timing("Refresh recent data", async {
                let session = self.ctx.session();
                session
                    .click(&locators::refresh_button(), self.ctx.timeouts().default_timeout())
                    .await?;
                session
                    .wait_for(
                        &locators::loading_state(),
                        WaitState::Hidden,
                        self.ctx.bound(REFRESH_BOUND),
                    )
                    .await?;
                self.ctx.logger().debug("Recent data refreshed");
                Ok(())
            })
            .await
    }

    pub async fn get_recent_data_card_count(&self) -> E2eResult<usize> {
        self.ctx.session().count(&locators::cards()).await
    }

    /// Rendered result cards; supplementary signal only
    pub async fn count_visible(&self) -> E2eResult<usize> {
        self.get_recent_data_card_count().await
    }

    pub async fn recent_cards(&self) -> E2eResult<Vec<RecordCard>> {
        let snapshots = self
            .ctx
            .session()
            .query(&locators::cards(), &card_fields())
            .await?;
        Ok(snapshots.iter().map(RecordCard::from).collect())
    }

    /// Single check that `record` is in the results list
    pub async fn verify_data_in_recent(&self, record: &Record) -> E2eResult<RecordCard> {
        self.ctx
            .with_timing("Verify data in recent", async {
                self.ctx
                    .logger()
                    .info(&format!("Verifying data appears in recent section: {}", record.event_type));
                self.ctx.expect_visible(&locators::cards(), CARD_BOUND).await?;

                let cards = self.recent_cards().await?;
                match match_card(&cards, record) {
                    CardMatch::Match(card) => {
                        self.ctx
                            .logger()
                            .success(&format!("Data verified in recent section: {}", record.event_type));
                        Ok(card)
                    }
                    CardMatch::Mismatch(card) => Err(E2eError::AssertionFailed(format!(
                        "card {} does not match severity '{}' and description '{}'",
                        card.describe(),
                        record.severity,
                        record.description
                    ))),
                    CardMatch::Absent => Err(E2eError::AssertionFailed(format!(
                        "no card labelled '{}' among {} cards",
                        record.event_type,
                        cards.len()
                    ))),
                }
            })
            .await
    }

    /// Poll the results list until `record` is rendered with matching content
    pub async fn verify_visible(&self, record: &Record) -> E2eResult<Converged<RecordCard>> {
        self.ctx
            .with_timing("Verify record visible", async {
                let label = format!("Record '{}' visible", record.event_type);
                let mut observer = RecordVisibility { page: self, record };
                let converged = Poller::for_page(&self.ctx, label, self.schedule.clone())
                    .poll_until(&mut observer)
                    .await?;
                self.ctx.logger().info_with(
                    "Record visible",
                    log_context!(
                        "attempt" => converged.attempt,
                        "elapsed_ms" => converged.elapsed.as_millis() as u64,
                    ),
                );
                Ok(converged)
            })
            .await
    }

    pub async fn wait_for_empty_state(&self) -> E2eResult<()> {
        self.ctx
            .expect_visible(&locators::empty_state(), EMPTY_STATE_BOUND)
            .await
    }

    pub async fn has_recent_data(&self) -> E2eResult<bool> {
        Ok(self.get_recent_data_card_count().await? > 0)
    }
}

#[async_trait]
impl PageObject for IngestionPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    async fn navigate(&self) -> E2eResult<()> {
        self.navigate_to_app().await
    }

    async fn verify_loaded(&self) -> E2eResult<()> {
        self.ctx.expect_visible(&locators::app_frame(), LOADED_BOUND).await?;
        self.ctx.logger().info("App iframe is visible");
        self.ctx.expect_visible(&locators::heading(), LOADED_BOUND).await?;
        self.ctx.logger().success("LogScale app page loaded");
        Ok(())
    }
}

/// Refresh, then look for the record's card
struct RecordVisibility<'a> {
    page: &'a IngestionPage,
    record: &'a Record,
}

#[async_trait]
impl<'a> Observe for RecordVisibility<'a> {
    type Output = RecordCard;

    async fn resample(&mut self, _attempt: u32) -> E2eResult<()> {
        self.page.refresh_recent_data().await
    }

    async fn observe(&mut self) -> E2eResult<Observation<RecordCard>> {
        let cards = self.page.recent_cards().await?;
        Ok(match match_card(&cards, self.record) {
            CardMatch::Match(card) => {
                let snippet = card.describe();
                Observation::converged(card).with_snippet(snippet)
            }
            CardMatch::Mismatch(card) => {
                Observation::pending().with_snippet(format!("content mismatch: {}", card.describe()))
            }
            CardMatch::Absent => Observation::pending().with_snippet(format!(
                "{} cards, none labelled '{}'",
                cards.len(),
                self.record.event_type
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn card(label: &str, badge: &str, description: &str) -> RecordCard {
        RecordCard {
            label: label.to_string(),
            badge: Some(badge.to_string()),
            description: Some(description.to_string()),
        }
    }

    #[test]
    fn test_card_from_snapshot() {
        let snapshot = ElementSnapshot::new("e2e_test_event High ...")
            .with_field("label", &[" e2e_test_event "])
            .with_field("badge", &["High"])
            .with_field("description", &["E2E test event - automated test submission", "second"]);
        let card = RecordCard::from(&snapshot);
        assert_eq!(card.label, "e2e_test_event");
        assert!(card.content_matches(&Record::e2e_sample()));
    }

    #[test_case(vec![], CardMatch::Absent ; "empty list")]
    #[test_case(
        vec![card("e2e_test_event_old", "High", "E2E test event - automated test submission")],
        CardMatch::Absent ;
        "label superstring is not the record"
    )]
    #[test_case(
        vec![card("e2e_test_event", "Low", "E2E test event - automated test submission")],
        CardMatch::Mismatch(card("e2e_test_event", "Low", "E2E test event - automated test submission")) ;
        "wrong severity"
    )]
    #[test_case(
        vec![
            card("other", "High", "x"),
            card("e2e_test_event", "High", "Logged: E2E test event - automated test submission"),
        ],
        CardMatch::Match(card("e2e_test_event", "High", "Logged: E2E test event - automated test submission")) ;
        "description contained verbatim"
    )]
    fn test_match_card(cards: Vec<RecordCard>, expected: CardMatch) {
        assert_eq!(match_card(&cards, &Record::e2e_sample()), expected);
    }

    #[test]
    fn test_match_prefers_matching_card_over_first_labelled() {
        let cards = vec![
            card("e2e_test_event", "Low", "stale"),
            card("e2e_test_event", "high", "E2E test event - automated test submission"),
        ];
        assert!(matches!(
            match_card(&cards, &Record::e2e_sample()),
            CardMatch::Match(c) if c.badge.as_deref() == Some("high")
        ));
    }

    #[test]
    fn test_toast_locators_are_frame_scoped() {
        assert_eq!(
            locators::success_toast_with("Form populated").to_string(),
            "frame[iframe] >> css=[role=\"alertdialog\"].border-positive :has-text(~\"Form populated\")"
        );
        assert_eq!(locators::app_frame().frame, None);
    }
}
