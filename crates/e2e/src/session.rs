//! Remote browser capability
//!
//! Page objects never talk to a browser directly. They describe elements
//! with a [`Locator`] and drive them through a [`Session`], which may be a
//! Playwright driver or the in-memory fake used by tests.

use async_trait::async_trait;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

/// How element text is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Whole text, case-sensitive
    Exact(String),
    /// Case-insensitive literal containment
    Contains(String),
}

impl TextMatch {
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            TextMatch::Exact(t) | TextMatch::Contains(t) => t,
        }
    }

    /// Evaluate the match locally
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            TextMatch::Exact(t) => candidate.trim() == t,
            TextMatch::Contains(t) => candidate.to_lowercase().contains(&t.to_lowercase()),
        }
    }

    /// Driver-side pattern: the text with every pattern metacharacter escaped
    pub fn pattern(&self) -> String {
        regex::escape(self.text())
    }
}

impl Serialize for TextMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TextMatch", 3)?;
        s.serialize_field("text", self.text())?;
        s.serialize_field("exact", &matches!(self, TextMatch::Exact(_)))?;
        s.serialize_field("pattern", &self.pattern())?;
        s.end()
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(t) => write!(f, "\"{}\"", t),
            TextMatch::Contains(t) => write!(f, "~\"{}\"", t),
        }
    }
}

/// One way of selecting elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    Css { css: String },
    TestId { id: String },
    Role { role: String, name: Option<TextMatch> },
    Text { text: TextMatch },
    Placeholder { text: TextMatch },
    Label { text: TextMatch },
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css { css } => write!(f, "css={}", css),
            Selector::TestId { id } => write!(f, "testid={}", id),
            Selector::Role { role, name: None } => write!(f, "role={}", role),
            Selector::Role { role, name: Some(name) } => write!(f, "role={}[name={}]", role, name),
            Selector::Text { text } => write!(f, "text={}", text),
            Selector::Placeholder { text } => write!(f, "placeholder={}", text),
            Selector::Label { text } => write!(f, "label={}", text),
        }
    }
}

/// Narrowing applied to a step's matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum Filter {
    HasText { text: TextMatch },
    /// Keep matches containing a descendant matched by `locator` (frame ignored)
    Has { locator: Box<Locator> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub selector: Selector,
    pub filters: Vec<Filter>,
    pub nth: Option<usize>,
}

/// Serializable description of a set of elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    /// Selector of the embedded frame the chain runs in
    pub frame: Option<String>,
    pub steps: Vec<Step>,
}

impl Locator {
    fn root(selector: Selector) -> Self {
        Self {
            frame: None,
            steps: vec![Step {
                selector,
                filters: Vec::new(),
                nth: None,
            }],
        }
    }

    pub fn css(css: impl Into<String>) -> Self {
        Self::root(Selector::Css { css: css.into() })
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::root(Selector::TestId { id: id.into() })
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::root(Selector::Role {
            role: role.into(),
            name: None,
        })
    }

    pub fn role_named(role: impl Into<String>, name: TextMatch) -> Self {
        Self::root(Selector::Role {
            role: role.into(),
            name: Some(name),
        })
    }

    pub fn text(text: TextMatch) -> Self {
        Self::root(Selector::Text { text })
    }

    pub fn placeholder(text: TextMatch) -> Self {
        Self::root(Selector::Placeholder { text })
    }

    pub fn label(text: TextMatch) -> Self {
        Self::root(Selector::Label { text })
    }

    /// Run this chain inside the embedded frame matched by `frame`
    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    /// Descend into elements matched by `selector`
    pub fn then(mut self, selector: Selector) -> Self {
        self.steps.push(Step {
            selector,
            filters: Vec::new(),
            nth: None,
        });
        self
    }

    /// Descend into another locator's chain (its frame is ignored)
    pub fn within(mut self, child: Locator) -> Self {
        self.steps.extend(child.steps);
        self
    }

    pub fn has_text(mut self, text: TextMatch) -> Self {
        self.last_step().filters.push(Filter::HasText { text });
        self
    }

    pub fn has(mut self, locator: Locator) -> Self {
        self.last_step().filters.push(Filter::Has {
            locator: Box::new(locator),
        });
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.last_step().nth = Some(index);
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    fn last_step(&mut self) -> &mut Step {
        // Every constructor creates one step and nothing removes steps.
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(frame) = &self.frame {
            write!(f, "frame[{}] >> ", frame)?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " >> ")?;
            }
            write!(f, "{}", step.selector)?;
            for filter in &step.filters {
                match filter {
                    Filter::HasText { text } => write!(f, " :has-text({})", text)?,
                    Filter::Has { locator } => write!(f, " :has({})", locator)?,
                }
            }
            if let Some(n) = step.nth {
                write!(f, " >> nth={}", n)?;
            }
        }
        Ok(())
    }
}

/// A named sub-element read from every element a query matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub selector: Selector,
}

impl Field {
    pub fn css(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: Selector::Css { css: css.into() },
        }
    }
}

/// Rendered text of one matched element and of its requested fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub text: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ElementSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, values: &[&str]) -> Self {
        self.fields.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// First text rendered for `name`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn field_all(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// Remote browser-control primitive.
///
/// Bounded waits that expire return [`E2eError::Timeout`].
#[async_trait]
pub trait Session: Send + Sync {
    fn base_url(&self) -> &str;

    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn reload(&self) -> E2eResult<()>;

    /// Wait until the page reports network quiescence
    async fn wait_for_network_idle(&self, timeout: Duration) -> E2eResult<()>;

    async fn click(&self, locator: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn select_option(&self, locator: &Locator, value: &str, timeout: Duration)
        -> E2eResult<()>;

    async fn input_value(&self, locator: &Locator) -> E2eResult<String>;

    async fn press_key(&self, key: &str) -> E2eResult<()>;

    async fn type_text(&self, text: &str) -> E2eResult<()>;

    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration)
        -> E2eResult<()>;

    /// Wait until any locator is visible; returns its index
    async fn wait_for_any(&self, locators: &[Locator], timeout: Duration) -> E2eResult<usize>;

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool>;

    async fn count(&self, locator: &Locator) -> E2eResult<usize>;

    /// Snapshot every element `locator` matches, reading `fields` inside each
    async fn query(&self, locator: &Locator, fields: &[Field]) -> E2eResult<Vec<ElementSnapshot>>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    async fn close(&self) -> E2eResult<()>;
}

/// The one session a scenario owns
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<dyn Session>,
    poll_active: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            poll_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the session for a poll; at most one poll runs per session
    pub fn begin_poll(&self) -> E2eResult<PollGuard> {
        self.poll_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| E2eError::PollInProgress)?;
        Ok(PollGuard {
            flag: Arc::clone(&self.poll_active),
        })
    }

    pub fn is_polling(&self) -> bool {
        self.poll_active.load(Ordering::SeqCst)
    }

    /// Absolute URL for a path on the remote console
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.session.base_url().trim_end_matches('/'), path)
    }
}

impl Deref for SessionHandle {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

/// Releases the session's poll slot on drop
pub struct PollGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_locator_display() {
        let cards = Locator::css("#resultsContainer sl-card")
            .in_frame("iframe")
            .has(Locator::css("strong").has_text(TextMatch::contains("e2e")))
            .first();
        assert_eq!(
            cards.to_string(),
            "frame[iframe] >> css=#resultsContainer sl-card :has(css=strong :has-text(~\"e2e\")) >> nth=0"
        );

        let button = Locator::role("navigation")
            .then(Selector::Role {
                role: "button".into(),
                name: Some(TextMatch::exact("Fusion SOAR")),
            });
        assert_eq!(
            button.to_string(),
            "role=navigation >> role=button[name=\"Fusion SOAR\"]"
        );
    }

    #[test]
    fn test_text_match_serializes_escaped_pattern() {
        let json = serde_json::to_value(TextMatch::contains("Ingest (v2).*")).unwrap();
        assert_eq!(json["exact"], false);
        assert_eq!(json["text"], "Ingest (v2).*");
        assert_eq!(json["pattern"], r"Ingest \(v2\)\.\*");
    }

    #[test]
    fn test_locator_serializes_tagged_steps() {
        let locator = Locator::test_id("nav-trigger");
        let json = serde_json::to_value(&locator).unwrap();
        assert_eq!(json["frame"], serde_json::Value::Null);
        assert_eq!(json["steps"][0]["selector"]["by"], "test_id");
        assert_eq!(json["steps"][0]["selector"]["id"], "nav-trigger");
    }

    #[test_case(TextMatch::exact("Completed"), " Completed ", true ; "exact ignores padding")]
    #[test_case(TextMatch::exact("Completed"), "completed", false ; "exact is case sensitive")]
    #[test_case(TextMatch::contains("logscale"), "foundry-sample-LogScale", true ; "contains ignores case")]
    #[test_case(TextMatch::contains("a.b"), "axb", false ; "contains is literal")]
    fn test_text_match(matcher: TextMatch, candidate: &str, expected: bool) {
        assert_eq!(matcher.matches(candidate), expected);
    }

    #[test]
    fn test_snapshot_fields() {
        let snap = ElementSnapshot::new("row").with_field("cells", &["a", "b"]);
        assert_eq!(snap.field("cells"), Some("a"));
        assert_eq!(snap.field_all("cells").len(), 2);
        assert_eq!(snap.field("missing"), None);
    }
}
