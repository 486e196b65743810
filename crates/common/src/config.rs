//! E2E configuration

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Top-level configuration for a convergence run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Base URL of the remote console
    pub base_url: String,

    /// Name of the installed app under test
    pub app_name: String,

    /// Workflow executed by the workflow scenario
    pub workflow_name: String,

    /// Browser engine (chromium, firefox, webkit)
    pub browser: String,

    /// Run the browser without a window
    pub headless: bool,

    /// Pre-authenticated browser storage state (cookies/local storage)
    pub storage_state: Option<PathBuf>,

    /// Directory holding the `playwright` node package
    pub node_project_dir: PathBuf,

    /// Output directory for results and failure screenshots
    pub output_dir: PathBuf,

    /// Probe the base URL before launching browsers
    pub preflight: bool,

    /// Viewport dimensions
    pub viewport: Viewport,

    /// Bounded-wait configuration
    pub timeouts: TimeoutConfig,

    /// Poll schedule for ingestion visibility; omitted keys keep their defaults
    #[serde(deserialize_with = "ScheduleConfig::deserialize_ingestion")]
    pub ingestion: ScheduleConfig,

    /// Poll schedule for workflow execution completion; omitted keys keep their defaults
    #[serde(deserialize_with = "ScheduleConfig::deserialize_workflow")]
    pub workflow: ScheduleConfig,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: "https://falcon.crowdstrike.com".to_string(),
            app_name: "foundry-sample-logscale".to_string(),
            workflow_name: "Ingest Data to LogScale".to_string(),
            browser: "chromium".to_string(),
            headless: true,
            viewport: Viewport::default(),
            storage_state: None,
            node_project_dir: PathBuf::from("."),
            timeouts: TimeoutConfig::default(),
            ingestion: ScheduleConfig::ingestion(),
            workflow: ScheduleConfig::workflow(),
            output_dir: PathBuf::from("test-results"),
            preflight: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Bounded waits, in milliseconds before scaling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default per-action timeout handed to the browser
    pub default_ms: u64,

    /// Network/UI quiescence after a navigation
    pub navigation_ms: u64,

    /// Stable-marker assertions
    pub assertion_ms: u64,

    /// Transient confirmation notifications
    pub confirmation_ms: u64,

    /// Multiplier applied to every bounded wait (slow environments)
    pub multiplier: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: 30_000,
            navigation_ms: 15_000,
            assertion_ms: 10_000,
            confirmation_ms: 10_000,
            multiplier: 1.0,
        }
    }
}

impl TimeoutConfig {
    /// Apply the multiplier to a bound
    pub fn scale(&self, bound: Duration) -> Duration {
        bound.mul_f64(self.multiplier)
    }

    pub fn default_timeout(&self) -> Duration {
        self.scale(Duration::from_millis(self.default_ms))
    }

    pub fn navigation(&self) -> Duration {
        self.scale(Duration::from_millis(self.navigation_ms))
    }

    pub fn assertion(&self) -> Duration {
        self.scale(Duration::from_millis(self.assertion_ms))
    }

    pub fn confirmation(&self) -> Duration {
        self.scale(Duration::from_millis(self.confirmation_ms))
    }
}

/// A poll schedule as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Wait before each attempt
    pub waits_ms: Vec<u64>,

    /// Pause after an unsuccessful attempt, before the next one
    pub pause_after_miss_ms: u64,

    /// Wait before the authoritative check that follows an exhausted schedule
    pub final_wait_ms: u64,
}

impl ScheduleConfig {
    /// Six attempts: two at 15s, then four at 20s
    pub fn ingestion() -> Self {
        Self {
            waits_ms: vec![15_000, 15_000, 20_000, 20_000, 20_000, 20_000],
            pause_after_miss_ms: 0,
            final_wait_ms: 5_000,
        }
    }

    /// Twelve attempts at 5s, with a 5s pause (and a reload) between them
    pub fn workflow() -> Self {
        Self {
            waits_ms: vec![5_000; 12],
            pause_after_miss_ms: 5_000,
            final_wait_ms: 5_000,
        }
    }

    fn deserialize_ingestion<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(PartialSchedule::deserialize(deserializer)?.over(Self::ingestion()))
    }

    fn deserialize_workflow<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(PartialSchedule::deserialize(deserializer)?.over(Self::workflow()))
    }
}

/// A schedule table with any subset of keys
#[derive(Deserialize)]
struct PartialSchedule {
    waits_ms: Option<Vec<u64>>,
    pause_after_miss_ms: Option<u64>,
    final_wait_ms: Option<u64>,
}

impl PartialSchedule {
    fn over(self, base: ScheduleConfig) -> ScheduleConfig {
        ScheduleConfig {
            waits_ms: self.waits_ms.unwrap_or(base.waits_ms),
            pause_after_miss_ms: self.pause_after_miss_ms.unwrap_or(base.pause_after_miss_ms),
            final_wait_ms: self.final_wait_ms.unwrap_or(base.final_wait_ms),
        }
    }
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `E2E_*` environment overrides
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("E2E_BASE_URL") {
            self.base_url = url;
        }
        if let Some(name) = var("E2E_APP_NAME") {
            self.app_name = name;
        }
        if let Some(browser) = var("E2E_BROWSER") {
            self.browser = browser;
        }
        if let Some(headless) = var("E2E_HEADLESS") {
            self.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
        if let Some(multiplier) = var("E2E_TIMEOUT_MULTIPLIER").and_then(|m| m.parse().ok()) {
            self.timeouts.multiplier = multiplier;
        }
        if let Some(path) = var("E2E_STORAGE_STATE") {
            self.storage_state = Some(PathBuf::from(path));
        }
        self
    }

    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if !(self.timeouts.multiplier > 0.0 && self.timeouts.multiplier.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "timeout multiplier must be positive, got {}",
                self.timeouts.multiplier
            )));
        }
        for (name, schedule) in [("ingestion", &self.ingestion), ("workflow", &self.workflow)] {
            if schedule.waits_ms.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "{} schedule needs at least one attempt",
                    name
                )));
            }
        }
        if self.workflow_name.trim().is_empty() {
            return Err(Error::InvalidConfig("workflow_name is empty".to_string()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Lines for the one-shot configuration summary
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("Base URL: {}", self.base_url()),
            format!("App: {}", self.app_name),
            format!("Workflow: {}", self.workflow_name),
            format!("Browser: {} (headless: {})", self.browser, self.headless),
            format!(
                "Timeouts: navigation {:?}, assertion {:?}, confirmation {:?} (x{})",
                self.timeouts.navigation(),
                self.timeouts.assertion(),
                self.timeouts.confirmation(),
                self.timeouts.multiplier
            ),
            format!(
                "Schedules: ingestion {} attempts, workflow {} attempts",
                self.ingestion.waits_ms.len(),
                self.workflow.waits_ms.len()
            ),
            format!(
                "Storage state: {}",
                self.storage_state
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
        ]
    }
}
