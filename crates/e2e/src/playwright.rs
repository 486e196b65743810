//! Playwright browser automation
//!
//! One `node` process per session runs a driver script generated from Rust.
//! Commands go to its stdin and replies come back on stdout, one JSON object
//! per line. Lines on stdout that are not replies are logged and skipped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use foundry_common::E2eConfig;

use crate::error::{E2eError, E2eResult};
use crate::session::{ElementSnapshot, Field, Locator, Session, WaitState};

/// Slack added to a command's own bound before the driver is declared stuck
const REPLY_GRACE: Duration = Duration::from_secs(5);

/// Bound for calls that carry no timeout of their own
const QUICK_CALL: Duration = Duration::from_secs(10);

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Playwright(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Pre-authenticated cookies and local storage
    pub storage_state: Option<PathBuf>,
    /// Directory whose `node_modules` provides `playwright`
    pub node_project_dir: PathBuf,
    /// Default per-action timeout inside the browser context
    pub default_timeout: Duration,
    /// Bound on page loads, reloads and screenshots
    pub page_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from_e2e_config(&E2eConfig::default()).unwrap_or(Self {
            base_url: "https://falcon.crowdstrike.com".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            storage_state: None,
            node_project_dir: PathBuf::from("."),
            default_timeout: Duration::from_secs(30),
            page_timeout: Duration::from_secs(30),
        })
    }
}

impl PlaywrightConfig {
    pub fn from_e2e_config(config: &E2eConfig) -> E2eResult<Self> {
        Ok(Self {
            base_url: config.base_url().to_string(),
            browser: config.browser.parse()?,
            headless: config.headless,
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            storage_state: config.storage_state.clone(),
            node_project_dir: config.node_project_dir.clone(),
            default_timeout: config.timeouts.default_timeout(),
            page_timeout: config.timeouts.default_timeout(),
        })
    }
}

/// Check if Playwright is installed for `project_dir`
pub fn check_playwright_installed(project_dir: &Path) -> E2eResult<()> {
    let status = Command::new("npx")
        .args(["playwright", "--version"])
        .current_dir(project_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

/// Settings baked into the generated driver
#[derive(Serialize)]
struct DriverSettings<'a> {
    browser: Browser,
    headless: bool,
    viewport: Viewport,
    storage_state: Option<&'a Path>,
    default_timeout_ms: u64,
}

#[derive(Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

/// Build the driver script for `config`
pub fn build_driver_script(config: &PlaywrightConfig) -> E2eResult<String> {
    let settings = DriverSettings {
        browser: config.browser,
        headless: config.headless,
        viewport: Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
        },
        storage_state: config.storage_state.as_deref(),
        default_timeout_ms: config.default_timeout.as_millis() as u64,
    };
    let mut script = format!("const CONFIG = {};\n", serde_json::to_string(&settings)?);
    script.push_str(DRIVER_BODY);
    Ok(script)
}

const DRIVER_BODY: &str = r#"
const readline = require('readline');
const playwright = require(require.resolve('playwright', { paths: [process.cwd()] }));

const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

function textArg(m) {
  return m.exact ? m.text : new RegExp(m.pattern, 'i');
}

function filterText(m) {
  return m.exact ? new RegExp('^\\s*' + m.pattern + '\\s*$') : new RegExp(m.pattern, 'i');
}

function select(scope, s) {
  switch (s.by) {
    case 'css': return scope.locator(s.css);
    case 'test_id': return scope.getByTestId(s.id);
    case 'role':
      return s.name
        ? scope.getByRole(s.role, { name: textArg(s.name), exact: s.name.exact })
        : scope.getByRole(s.role);
    case 'text': return scope.getByText(textArg(s.text), { exact: s.text.exact });
    case 'placeholder': return scope.getByPlaceholder(textArg(s.text), { exact: s.text.exact });
    case 'label': return scope.getByLabel(textArg(s.text), { exact: s.text.exact });
    default: throw new Error('unknown selector: ' + s.by);
  }
}

function chain(root, steps) {
  let loc = null;
  for (const step of steps) {
    loc = select(loc || root, step.selector);
    for (const f of step.filters) {
      if (f.filter === 'has_text') loc = loc.filter({ hasText: filterText(f.text) });
      else if (f.filter === 'has') loc = loc.filter({ has: chain(root, f.locator.steps) });
    }
    if (step.nth !== null && step.nth !== undefined) loc = loc.nth(step.nth);
  }
  return loc;
}

function isTimeout(err) {
  if (!err) return false;
  if (err.name === 'TimeoutError') return true;
  return Array.isArray(err.errors) && err.errors.length > 0
    && err.errors.every((e) => e && e.name === 'TimeoutError');
}

(async () => {
  let browser;
  let page;
  try {
    browser = await playwright[CONFIG.browser].launch({ headless: CONFIG.headless });
    const context = await browser.newContext({
      viewport: CONFIG.viewport,
      storageState: CONFIG.storage_state || undefined,
    });
    context.setDefaultTimeout(CONFIG.default_timeout_ms);
    page = await context.newPage();
  } catch (err) {
    emit({ fatal: String((err && err.message) || err) });
    process.exit(1);
  }

  const resolve = (l) => chain(l.frame ? page.frameLocator(l.frame) : page, l.steps);

  const handlers = {
    goto: async (c) => { await page.goto(c.url, { timeout: c.timeout_ms }); },
    reload: async (c) => { await page.reload({ timeout: c.timeout_ms }); },
    network_idle: (c) => page.waitForLoadState('networkidle', { timeout: c.timeout_ms }),
    click: (c) => resolve(c.locator).click({ timeout: c.timeout_ms }),
    fill: (c) => resolve(c.locator).fill(c.value, { timeout: c.timeout_ms }),
    select_option: async (c) => { await resolve(c.locator).selectOption(c.value, { timeout: c.timeout_ms }); },
    input_value: (c) => resolve(c.locator).inputValue({ timeout: c.timeout_ms }),
    press: (c) => page.keyboard.press(c.key),
    type: (c) => page.keyboard.type(c.text),
    wait_for: (c) => resolve(c.locator).first().waitFor({ state: c.state, timeout: c.timeout_ms }),
    wait_for_any: (c) => Promise.any(c.locators.map((l, i) =>
      resolve(l).first().waitFor({ state: 'visible', timeout: c.timeout_ms }).then(() => i))),
    is_visible: (c) => resolve(c.locator).first().isVisible(),
    count: (c) => resolve(c.locator).count(),
    query: async (c) => {
      const loc = resolve(c.locator);
      const out = [];
      const n = await loc.count();
      for (let i = 0; i < n; i++) {
        const el = loc.nth(i);
        const fields = {};
        for (const f of c.fields) fields[f.name] = await select(el, f.selector).allInnerTexts();
        out.push({ text: await el.innerText(), fields });
      }
      return out;
    },
    screenshot: async (c) => { await page.screenshot({ path: c.path, fullPage: true }); },
    close: async () => { await browser.close(); setImmediate(() => process.exit(0)); },
  };

  emit({ ready: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (err) {
      emit({ id: 0, ok: false, error: 'malformed command: ' + err.message });
      continue;
    }
    try {
      const handler = handlers[cmd.op];
      if (!handler) throw new Error('unknown op: ' + cmd.op);
      const value = await handler(cmd);
      emit({ id: cmd.id, ok: true, value: value === undefined ? null : value });
    } catch (err) {
      emit({ id: cmd.id, ok: false, error: String((err && err.message) || err), timeout: isTimeout(err) });
    }
  }
  await browser.close();
})();
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Goto { url: &'a str, timeout_ms: u64 },
    Reload { timeout_ms: u64 },
    NetworkIdle { timeout_ms: u64 },
    Click { locator: &'a Locator, timeout_ms: u64 },
    Fill { locator: &'a Locator, value: &'a str, timeout_ms: u64 },
    SelectOption { locator: &'a Locator, value: &'a str, timeout_ms: u64 },
    InputValue { locator: &'a Locator, timeout_ms: u64 },
    Press { key: &'a str },
    Type { text: &'a str },
    WaitFor { locator: &'a Locator, state: WaitState, timeout_ms: u64 },
    WaitForAny { locators: &'a [Locator], timeout_ms: u64 },
    IsVisible { locator: &'a Locator },
    Count { locator: &'a Locator },
    Query { locator: &'a Locator, fields: &'a [Field] },
    Screenshot { path: String },
    Close,
}

impl DriverCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Reload { .. } => "reload",
            DriverCommand::NetworkIdle { .. } => "network idle",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::SelectOption { .. } => "select option",
            DriverCommand::InputValue { .. } => "input value",
            DriverCommand::Press { .. } => "press",
            DriverCommand::Type { .. } => "type",
            DriverCommand::WaitFor { .. } => "wait for",
            DriverCommand::WaitForAny { .. } => "wait for any",
            DriverCommand::IsVisible { .. } => "is visible",
            DriverCommand::Count { .. } => "count",
            DriverCommand::Query { .. } => "query",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::Close => "close",
        }
    }

    /// What the command acts on, for error messages
    fn target(&self) -> String {
        match self {
            DriverCommand::Click { locator, .. }
            | DriverCommand::Fill { locator, .. }
            | DriverCommand::SelectOption { locator, .. }
            | DriverCommand::InputValue { locator, .. }
            | DriverCommand::WaitFor { locator, .. }
            | DriverCommand::IsVisible { locator }
            | DriverCommand::Count { locator }
            | DriverCommand::Query { locator, .. } => locator.to_string(),
            DriverCommand::Goto { url, .. } => url.to_string(),
            DriverCommand::WaitForAny { locators, .. } => locators
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
            _ => String::new(),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Browser session backed by a Playwright driver process
pub struct PlaywrightSession {
    base_url: String,
    io: tokio::sync::Mutex<DriverIo>,
    child: parking_lot::Mutex<Option<Child>>,
    next_id: AtomicU64,
    page_timeout: Duration,
    _script_dir: TempDir,
}

impl PlaywrightSession {
    /// Spawn the driver and wait until its browser page is open
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        check_playwright_installed(&config.node_project_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_driver_script(config)?)?;
        debug!("Playwright driver script: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&config.node_project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdout unavailable".to_string()))?;
        let mut stdout = BufReader::new(stdout).lines();

        tokio::time::timeout(LAUNCH_TIMEOUT, wait_until_ready(&mut stdout))
            .await
            .map_err(|_| E2eError::Timeout(format!("{} browser launch", config.browser.as_str())))??;

        info!(
            "Playwright {} ready (pid: {:?}, headless: {})",
            config.browser.as_str(),
            child.id(),
            config.headless
        );

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            io: tokio::sync::Mutex::new(DriverIo { stdin, stdout }),
            child: parking_lot::Mutex::new(Some(child)),
            next_id: AtomicU64::new(0),
            page_timeout: config.page_timeout,
            _script_dir: script_dir,
        })
    }

    async fn call(&self, command: DriverCommand<'_>, bound: Duration) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut line = serde_json::to_string(&Envelope {
            id,
            command: &command,
        })?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let reply = tokio::time::timeout(bound + REPLY_GRACE, read_reply(&mut io.stdout, id))
            .await
            .map_err(|_| {
                E2eError::Driver(format!(
                    "no reply to {} within {:?}",
                    command.name(),
                    bound + REPLY_GRACE
                ))
            })??;

        if reply.ok {
            return Ok(reply.value);
        }
        let error = reply.error.unwrap_or_else(|| "unknown driver error".to_string());
        let target = command.target();
        if reply.timeout {
            Err(E2eError::Timeout(format!("{} {}", command.name(), target)))
        } else {
            Err(E2eError::Playwright(format!(
                "{} {} failed: {}",
                command.name(),
                target,
                error
            )))
        }
    }

    async fn call_unit(&self, command: DriverCommand<'_>, bound: Duration) -> E2eResult<()> {
        self.call(command, bound).await.map(|_| ())
    }

    /// Terminate the driver: SIGTERM first, then kill
    fn terminate(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!("SIGTERM to driver {} failed: {}", pid, e);
                }
            }
        }

        if let Err(e) = child.start_kill() {
            debug!("Driver already exited: {}", e);
        }
    }
}

async fn wait_until_ready(stdout: &mut Lines<BufReader<ChildStdout>>) -> E2eResult<()> {
    while let Some(line) = stdout.next_line().await? {
        match serde_json::from_str::<Value>(&line) {
            Ok(msg) if msg["ready"] == Value::Bool(true) => return Ok(()),
            Ok(msg) if msg.get("fatal").is_some() => {
                return Err(E2eError::Playwright(format!(
                    "browser launch failed: {}",
                    msg["fatal"]
                )))
            }
            _ => debug!("driver: {}", line),
        }
    }
    Err(E2eError::Driver("driver exited before it was ready".to_string()))
}

async fn read_reply(stdout: &mut Lines<BufReader<ChildStdout>>, id: u64) -> E2eResult<Reply> {
    while let Some(line) = stdout.next_line().await? {
        match serde_json::from_str::<Reply>(&line) {
            Ok(reply) if reply.id == id => return Ok(reply),
            Ok(stale) => warn!("Discarding driver reply {} (waiting for {})", stale.id, id),
            Err(_) => debug!("driver: {}", line),
        }
    }
    Err(E2eError::Driver("driver exited".to_string()))
}

fn ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[async_trait]
impl Session for PlaywrightSession {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn goto(&self, url: &str) -> E2eResult<()> {
        let bound = self.page_timeout;
        self.call_unit(DriverCommand::Goto { url, timeout_ms: ms(bound) }, bound)
            .await
    }

    async fn reload(&self) -> E2eResult<()> {
        let bound = self.page_timeout;
        self.call_unit(DriverCommand::Reload { timeout_ms: ms(bound) }, bound)
            .await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> E2eResult<()> {
        self.call_unit(DriverCommand::NetworkIdle { timeout_ms: ms(timeout) }, timeout)
            .await
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        self.call_unit(
            DriverCommand::Click {
                locator,
                timeout_ms: ms(timeout),
            },
            timeout,
        )
        .await
    }

    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        self.call_unit(
            DriverCommand::Fill {
                locator,
                value,
                timeout_ms: ms(timeout),
            },
            timeout,
        )
        .await
    }

    async fn select_option(&self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        self.call_unit(
            DriverCommand::SelectOption {
                locator,
                value,
                timeout_ms: ms(timeout),
            },
            timeout,
        )
        .await
    }

    async fn input_value(&self, locator: &Locator) -> E2eResult<String> {
        let value = self
            .call(
                DriverCommand::InputValue {
                    locator,
                    timeout_ms: ms(QUICK_CALL),
                },
                QUICK_CALL,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn press_key(&self, key: &str) -> E2eResult<()> {
        self.call_unit(DriverCommand::Press { key }, QUICK_CALL).await
    }

    async fn type_text(&self, text: &str) -> E2eResult<()> {
        // Typing is paced per character by the browser.
        let bound = QUICK_CALL + Duration::from_millis(20 * text.len() as u64);
        self.call_unit(DriverCommand::Type { text }, bound).await
    }

    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration) -> E2eResult<()> {
        self.call_unit(
            DriverCommand::WaitFor {
                locator,
                state,
                timeout_ms: ms(timeout),
            },
            timeout,
        )
        .await
    }

    async fn wait_for_any(&self, locators: &[Locator], timeout: Duration) -> E2eResult<usize> {
        let value = self
            .call(
                DriverCommand::WaitForAny {
                    locators,
                    timeout_ms: ms(timeout),
                },
                timeout,
            )
            .await?;
        value
            .as_u64()
            .map(|i| i as usize)
            .filter(|i| *i < locators.len())
            .ok_or_else(|| E2eError::Driver(format!("bad wait_for_any reply: {}", value)))
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        let value = self
            .call(DriverCommand::IsVisible { locator }, QUICK_CALL)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        let value = self.call(DriverCommand::Count { locator }, QUICK_CALL).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn query(&self, locator: &Locator, fields: &[Field]) -> E2eResult<Vec<ElementSnapshot>> {
        let value = self
            .call(DriverCommand::Query { locator, fields }, QUICK_CALL * 3)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.call_unit(
            DriverCommand::Screenshot {
                path: path.display().to_string(),
            },
            self.page_timeout,
        )
        .await
    }

    async fn close(&self) -> E2eResult<()> {
        let result = self.call_unit(DriverCommand::Close, QUICK_CALL).await;
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => debug!("Driver exited: {}", status),
                _ => {
                    *self.child.lock() = Some(child);
                    self.terminate();
                }
            }
        }
        result
    }
}

impl Drop for PlaywrightSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TextMatch;

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }

    #[test]
    fn test_config_from_e2e_config() {
        let mut e2e = E2eConfig::default();
        e2e.base_url = "https://console.example.test/".to_string();
        e2e.browser = "webkit".to_string();
        e2e.timeouts.multiplier = 2.0;

        let config = PlaywrightConfig::from_e2e_config(&e2e).unwrap();
        assert_eq!(config.base_url, "https://console.example.test");
        assert_eq!(config.browser, Browser::Webkit);
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(config.page_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_driver_script_embeds_settings_as_json() {
        let config = PlaywrightConfig {
            storage_state: Some(PathBuf::from("auth/it's.json")),
            ..PlaywrightConfig::default()
        };
        let script = build_driver_script(&config).unwrap();
        let first = script.lines().next().unwrap();
        let json = first
            .strip_prefix("const CONFIG = ")
            .and_then(|s| s.strip_suffix(';'))
            .unwrap();
        let settings: Value = serde_json::from_str(json).unwrap();
        assert_eq!(settings["browser"], "chromium");
        assert_eq!(settings["storage_state"], "auth/it's.json");
        assert_eq!(settings["viewport"]["width"], 1280);
        assert!(script.contains("require.resolve('playwright'"));
    }

    #[test]
    fn test_command_envelope_shape() {
        let locator = Locator::role_named("button", TextMatch::contains("search workflows"));
        let command = DriverCommand::Click {
            locator: &locator,
            timeout_ms: 5000,
        };
        let json = serde_json::to_value(Envelope {
            id: 7,
            command: &command,
        })
        .unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["op"], "click");
        assert_eq!(json["timeout_ms"], 5000);
        assert_eq!(json["locator"]["steps"][0]["selector"]["name"]["pattern"], "search workflows");
        assert_eq!(command.target(), "role=button[name=~\"search workflows\"]");
    }

    #[test]
    fn test_reply_defaults() {
        let reply: Reply = serde_json::from_str(r#"{"id":3,"ok":false,"error":"boom"}"#).unwrap();
        assert!(!reply.ok);
        assert!(!reply.timeout);
        assert_eq!(reply.value, Value::Null);
    }
}
