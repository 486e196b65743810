//! In-memory session for deterministic tests
//!
//! `FakeSession` renders nothing. It keeps a [`FakeDom`] keyed by the
//! canonical text of each [`Locator`]: what is visible, what a query returns,
//! what inputs hold. Hooks run on clicks, navigations, reloads and queries so
//! a test can script how the remote application reacts. Bounded waits never sleep;
//! an unmet condition fails at once with [`E2eError::Timeout`].

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::session::{ElementSnapshot, Field, Locator, Session, WaitState};

/// Reaction to a user action
pub type Hook = Box<dyn FnMut(&mut FakeDom) + Send>;

/// Rendered state of the simulated application
#[derive(Debug, Default)]
pub struct FakeDom {
    pub url: Option<String>,
    pub visible: BTreeSet<String>,
    pub elements: BTreeMap<String, Vec<ElementSnapshot>>,
    pub values: BTreeMap<String, String>,
    pub disabled: BTreeSet<String>,
    /// Keyboard input since the last select-all
    pub typed: String,
    pub network_busy: bool,
    pub closed: bool,
    /// Every action received, in order
    pub actions: Vec<String>,
}

impl FakeDom {
    pub fn show(&mut self, locator: &Locator) {
        self.visible.insert(locator.to_string());
    }

    pub fn hide(&mut self, locator: &Locator) {
        self.visible.remove(&locator.to_string());
    }

    pub fn set_elements(&mut self, locator: &Locator, elements: Vec<ElementSnapshot>) {
        self.elements.insert(locator.to_string(), elements);
    }

    pub fn disable(&mut self, locator: &Locator) {
        self.disabled.insert(locator.to_string());
    }

    pub fn set_value(&mut self, locator: &Locator, value: &str) {
        self.values.insert(locator.to_string(), value.to_string());
    }

    pub fn value(&self, locator: &Locator) -> Option<&str> {
        self.values.get(&locator.to_string()).map(String::as_str)
    }

    pub fn is_shown(&self, locator: &Locator) -> bool {
        self.shown(&locator.to_string())
    }

    /// Actions starting with `prefix`
    pub fn actions_matching(&self, prefix: &str) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    fn shown(&self, key: &str) -> bool {
        self.visible.contains(key) || self.elements.get(key).is_some_and(|e| !e.is_empty())
    }
}

#[derive(Default)]
struct Hooks {
    click: HashMap<String, Vec<Hook>>,
    query: HashMap<String, Vec<Hook>>,
    goto: Vec<(String, Hook)>,
    reload: Vec<Hook>,
}

pub struct FakeSession {
    base_url: String,
    dom: Mutex<FakeDom>,
    hooks: Mutex<Hooks>,
}

impl FakeSession {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            dom: Mutex::new(FakeDom::default()),
            hooks: Mutex::new(Hooks::default()),
        }
    }

    pub fn dom(&self) -> MutexGuard<'_, FakeDom> {
        self.dom.lock()
    }

    /// Run `hook` each time `locator` is clicked
    pub fn on_click(&self, locator: &Locator, hook: impl FnMut(&mut FakeDom) + Send + 'static) {
        self.hooks
            .lock()
            .click
            .entry(locator.to_string())
            .or_default()
            .push(Box::new(hook));
    }

    /// Run `hook` on navigations to a URL ending in `path`
    pub fn on_goto(&self, path: &str, hook: impl FnMut(&mut FakeDom) + Send + 'static) {
        self.hooks.lock().goto.push((path.to_string(), Box::new(hook)));
    }

    /// Run `hook` before each query of `locator` returns, e.g. to render late
    pub fn on_query(&self, locator: &Locator, hook: impl FnMut(&mut FakeDom) + Send + 'static) {
        self.hooks
            .lock()
            .query
            .entry(locator.to_string())
            .or_default()
            .push(Box::new(hook));
    }

    pub fn on_reload(&self, hook: impl FnMut(&mut FakeDom) + Send + 'static) {
        self.hooks.lock().reload.push(Box::new(hook));
    }

    fn live(&self) -> E2eResult<MutexGuard<'_, FakeDom>> {
        let dom = self.dom.lock();
        if dom.closed {
            return Err(E2eError::Driver("session closed".to_string()));
        }
        Ok(dom)
    }

    /// Resolve an actionable element, failing like a bounded wait would
    fn actionable(&self, locator: &Locator, action: &str) -> E2eResult<(MutexGuard<'_, FakeDom>, String)> {
        let dom = self.live()?;
        let key = locator.to_string();
        if !dom.shown(&key) || dom.disabled.contains(&key) {
            return Err(E2eError::Timeout(format!("{} {}", action, key)));
        }
        Ok((dom, key))
    }
}

#[async_trait]
impl Session for FakeSession {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn goto(&self, url: &str) -> E2eResult<()> {
        let mut hooks = self.hooks.lock();
        let mut dom = self.live()?;
        dom.actions.push(format!("goto {}", url));
        dom.url = Some(url.to_string());
        for (path, hook) in hooks.goto.iter_mut() {
            if url.ends_with(path.as_str()) {
                hook(&mut *dom);
            }
        }
        Ok(())
    }

    async fn reload(&self) -> E2eResult<()> {
        let mut hooks = self.hooks.lock();
        let mut dom = self.live()?;
        dom.actions.push("reload".to_string());
        for hook in hooks.reload.iter_mut() {
            hook(&mut *dom);
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> E2eResult<()> {
        if self.live()?.network_busy {
            return Err(E2eError::Timeout("network idle".to_string()));
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator, _timeout: Duration) -> E2eResult<()> {
        let mut hooks = self.hooks.lock();
        let (mut dom, key) = self.actionable(locator, "click")?;
        dom.actions.push(format!("click {}", key));
        if let Some(list) = hooks.click.get_mut(&key) {
            for hook in list.iter_mut() {
                hook(&mut *dom);
            }
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str, _timeout: Duration) -> E2eResult<()> {
        let (mut dom, key) = self.actionable(locator, "fill")?;
        dom.actions.push(format!("fill {}", key));
        dom.values.insert(key, value.to_string());
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str, _timeout: Duration) -> E2eResult<()> {
        let (mut dom, key) = self.actionable(locator, "select")?;
        dom.actions.push(format!("select {}", key));
        dom.values.insert(key, value.to_string());
        Ok(())
    }

    async fn input_value(&self, locator: &Locator) -> E2eResult<String> {
        let dom = self.live()?;
        Ok(dom.value(locator).unwrap_or_default().to_string())
    }

    async fn press_key(&self, key: &str) -> E2eResult<()> {
        let mut dom = self.live()?;
        dom.actions.push(format!("press {}", key));
        if matches!(key, "Control+a" | "Meta+a") {
            dom.typed.clear();
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> E2eResult<()> {
        let mut dom = self.live()?;
        dom.actions.push("type".to_string());
        dom.typed.push_str(text);
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, state: WaitState, _timeout: Duration) -> E2eResult<()> {
        let dom = self.live()?;
        let key = locator.to_string();
        let shown = dom.shown(&key);
        let met = match state {
            WaitState::Visible | WaitState::Attached => shown,
            WaitState::Hidden | WaitState::Detached => !shown,
        };
        if met {
            Ok(())
        } else {
            Err(E2eError::Timeout(format!("{} to be {:?}", key, state)))
        }
    }

    async fn wait_for_any(&self, locators: &[Locator], _timeout: Duration) -> E2eResult<usize> {
        let dom = self.live()?;
        locators
            .iter()
            .position(|l| dom.shown(&l.to_string()))
            .ok_or_else(|| E2eError::Timeout(format!("any of {} locators", locators.len())))
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        Ok(self.live()?.is_shown(locator))
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        let dom = self.live()?;
        let key = locator.to_string();
        Ok(match dom.elements.get(&key) {
            Some(elements) => elements.len(),
            None => usize::from(dom.visible.contains(&key)),
        })
    }

    async fn query(&self, locator: &Locator, _fields: &[Field]) -> E2eResult<Vec<ElementSnapshot>> {
        let mut hooks = self.hooks.lock();
        let mut dom = self.live()?;
        let key = locator.to_string();
        if let Some(list) = hooks.query.get_mut(&key) {
            for hook in list.iter_mut() {
                hook(&mut *dom);
            }
        }
        Ok(dom.elements.get(&key).cloned().unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.live()?.actions.push(format!("screenshot {}", path.display()));
        tokio::fs::write(path, b"fake screenshot").await?;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        let mut dom = self.dom.lock();
        dom.actions.push("close".to_string());
        dom.closed = true;
        Ok(())
    }
}
