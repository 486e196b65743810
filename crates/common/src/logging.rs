//! Structured logging service
//!
//! A `Logger` is created once at process start and handed to every page
//! object. Records are emitted through `tracing`; what reaches the sink depends
//! on the [`LogMode`]:
//!
//! - local runs print every step, success and info line
//! - CI runs keep only errors, warnings and summary lines, written as JSON
//! - debug runs additionally print debug lines and a JSON dump of the context

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Error;

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Step,
}

/// Structured context attached to a record
pub type LogContext = BTreeMap<String, Value>;

/// One emitted record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub context: LogContext,
}

/// Environment-driven verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogMode {
    /// Keep only errors, warnings and summary lines
    pub ci: bool,
    /// Print debug lines and context dumps
    pub debug: bool,
}

impl LogMode {
    /// `CI` set to anything non-empty enables CI mode; `DEBUG=true` enables debug mode
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            ci: var("CI").is_some_and(|v| !v.is_empty()),
            debug: var("DEBUG").as_deref() == Some("true"),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows the mode.
pub fn init_tracing(mode: LogMode) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if mode.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    subscriber(mode, filter, std::io::stdout)
        .try_init()
        .map_err(|e| Error::LoggingInit(e.to_string()))
}

/// JSON lines in CI, human-readable lines otherwise
fn subscriber<W>(mode: LogMode, filter: EnvFilter, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    if mode.ci {
        Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(false)
                    .with_writer(writer),
            ),
        )
    } else {
        Box::new(registry.with(fmt::layer().with_target(false).with_writer(writer)))
    }
}

/// Process-wide diagnostic logger
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    mode: LogMode,
    steps: AtomicU64,
    seq: AtomicU64,
    config_logged: AtomicBool,
    last_step: Mutex<Option<String>>,
    capture: Option<Mutex<Vec<LogEvent>>>,
}

impl Logger {
    pub fn new(mode: LogMode) -> Self {
        Self::build(mode, false)
    }

    /// A logger that also keeps every emitted record in memory
    pub fn capturing(mode: LogMode) -> Self {
        Self::build(mode, true)
    }

    fn build(mode: LogMode, capture: bool) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                mode,
                steps: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                config_logged: AtomicBool::new(false),
                last_step: Mutex::new(None),
                capture: capture.then(|| Mutex::new(Vec::new())),
            }),
        }
    }

    pub fn mode(&self) -> LogMode {
        self.inner.mode
    }

    /// Log a numbered test step
    pub fn step(&self, page: &str, action: &str, context: LogContext) {
        let n = self.inner.steps.fetch_add(1, Ordering::SeqCst) + 1;
        let message = format!("{} [{}] {}: {}", step_marker(action), n, page, action);
        *self.inner.last_step.lock() = Some(format!("{}: {}", page, action));

        let mut context = context;
        context.insert("page".into(), Value::from(page));
        context.insert("action".into(), Value::from(action));
        self.emit(LogLevel::Step, message, context, false);
    }

    pub fn success(&self, message: &str, context: LogContext) {
        self.emit(LogLevel::Info, format!("[OK] {}", message), context, false);
    }

    pub fn info(&self, message: &str, context: LogContext) {
        self.emit(LogLevel::Info, format!("[INFO] {}", message), context, false);
    }

    pub fn warn(&self, message: &str, context: LogContext) {
        self.emit(LogLevel::Warn, format!("[WARN] {}", message), context, false);
    }

    /// Log a blocking failure, with the underlying error when there is one
    pub fn error(&self, message: &str, err: Option<&dyn std::error::Error>, context: LogContext) {
        let mut context = context;
        let text = match err {
            Some(e) => {
                context.insert("error".into(), Value::from(e.to_string()));
                format!("[ERROR] {} - {}", message, e)
            }
            None => format!("[ERROR] {}", message),
        };
        self.emit(LogLevel::Error, text, context, false);
    }

    pub fn debug(&self, message: &str, context: LogContext) {
        if self.inner.mode.debug {
            self.emit(LogLevel::Debug, format!("[DEBUG] {}", message), context, false);
        }
    }

    /// Log how long an operation took
    pub fn performance(&self, operation: &str, duration: Duration, context: LogContext) {
        let mut context = context;
        context.insert("duration_ms".into(), Value::from(duration.as_millis() as u64));
        context.insert("performance".into(), Value::from(true));
        let message = format!(
            "[PERF] {} completed in {}",
            operation,
            format_duration(duration)
        );
        self.emit(LogLevel::Info, message, context, false);
    }

    /// Log a retry; the last attempt is logged as an error
    pub fn retry(&self, operation: &str, attempt: u32, max_attempts: u32, err: Option<&str>) {
        let last = attempt >= max_attempts;
        let mut context = LogContext::new();
        context.insert("operation".into(), Value::from(operation));
        context.insert("attempt".into(), Value::from(attempt));
        context.insert("max_attempts".into(), Value::from(max_attempts));
        context.insert("is_last_attempt".into(), Value::from(last));
        if let Some(e) = err {
            context.insert("error".into(), Value::from(e));
        }
        let level = if last { LogLevel::Error } else { LogLevel::Warn };
        let message = format!("[RETRY] {}/{}: {}", attempt, max_attempts, operation);
        self.emit(level, message, context, false);
    }

    /// Log a titled list; summaries survive CI filtering
    pub fn summary(&self, title: &str, items: &[String]) {
        self.emit(
            LogLevel::Info,
            format!("[SUMMARY] {}:", title),
            LogContext::new(),
            true,
        );
        for item in items {
            self.emit(LogLevel::Info, format!("  {}", item), LogContext::new(), true);
        }
    }

    /// Log the configuration summary the first time this is called.
    ///
    /// Returns whether the summary was written.
    pub fn log_config_summary_once(&self, lines: &[String]) -> bool {
        if self.inner.config_logged.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.summary("E2E Test Config", lines);
        true
    }

    /// Scoped logger tagging every record with `page`
    pub fn for_page(&self, page: &str) -> PageLogger {
        PageLogger {
            logger: self.clone(),
            page: Arc::from(page),
        }
    }

    /// The most recent step, as "page: action"
    pub fn last_step(&self) -> Option<String> {
        self.inner.last_step.lock().clone()
    }

    /// Forget the most recent step; step numbering continues
    pub fn clear_last_step(&self) {
        self.inner.last_step.lock().take();
    }

    /// Captured records, oldest first (empty unless built with [`Logger::capturing`])
    pub fn events(&self) -> Vec<LogEvent> {
        self.inner
            .capture
            .as_ref()
            .map(|c| c.lock().clone())
            .unwrap_or_default()
    }

    fn should_emit(&self, level: LogLevel, summary: bool) -> bool {
        if !self.inner.mode.ci {
            return true;
        }
        summary || matches!(level, LogLevel::Error | LogLevel::Warn)
    }

    fn emit(&self, level: LogLevel, message: String, context: LogContext, summary: bool) {
        if !self.should_emit(level, summary) {
            return;
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let page = context.get("page").and_then(Value::as_str).map(str::to_owned);
        let dump = if self.inner.mode.debug && !context.is_empty() {
            serde_json::to_string_pretty(&context).ok()
        } else {
            None
        };

        let page = page.as_deref();
        let dump = dump.as_deref();
        match level {
            LogLevel::Error => error!(seq, page, context = dump, "{}", message),
            LogLevel::Warn => warn!(seq, page, context = dump, "{}", message),
            LogLevel::Debug => debug!(seq, page, context = dump, "{}", message),
            LogLevel::Info | LogLevel::Step => info!(seq, page, context = dump, "{}", message),
        }

        if let Some(capture) = &self.inner.capture {
            capture.lock().push(LogEvent {
                seq,
                at: Utc::now(),
                level,
                message,
                context,
            });
        }
    }
}

/// Logger pre-bound to a page or feature name
#[derive(Clone)]
pub struct PageLogger {
    logger: Logger,
    page: Arc<str>,
}

impl PageLogger {
    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn scoped(&self, mut context: LogContext) -> LogContext {
        context.insert("page".into(), Value::from(&*self.page));
        context
    }

    pub fn step(&self, action: &str) {
        self.logger.step(&self.page, action, LogContext::new());
    }

    pub fn success(&self, message: &str) {
        self.logger.success(message, self.scoped(LogContext::new()));
    }

    pub fn info(&self, message: &str) {
        self.logger.info(message, self.scoped(LogContext::new()));
    }

    pub fn info_with(&self, message: &str, context: LogContext) {
        self.logger.info(message, self.scoped(context));
    }

    pub fn warn(&self, message: &str) {
        self.logger.warn(message, self.scoped(LogContext::new()));
    }

    pub fn warn_with(&self, message: &str, context: LogContext) {
        self.logger.warn(message, self.scoped(context));
    }

    pub fn error(&self, message: &str, err: Option<&dyn std::error::Error>) {
        self.logger.error(message, err, self.scoped(LogContext::new()));
    }

    pub fn error_with(
        &self,
        message: &str,
        err: Option<&dyn std::error::Error>,
        context: LogContext,
    ) {
        self.logger.error(message, err, self.scoped(context));
    }

    pub fn debug(&self, message: &str) {
        self.logger.debug(message, self.scoped(LogContext::new()));
    }

    pub fn debug_with(&self, message: &str, context: LogContext) {
        self.logger.debug(message, self.scoped(context));
    }

    pub fn performance(&self, operation: &str, duration: Duration) {
        self.logger
            .performance(operation, duration, self.scoped(LogContext::new()));
    }
}

/// Build a [`LogContext`] from `key => value` pairs
#[macro_export]
macro_rules! log_context {
    () => { $crate::logging::LogContext::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut context = $crate::logging::LogContext::new();
        $( context.insert(($key).to_string(), ::serde_json::json!($value)); )+
        context
    }};
}

fn step_marker(action: &str) -> &'static str {
    let action = action.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| action.contains(w));

    if has(&["navigate", "goto"]) {
        "->"
    } else if has(&["click"]) {
        "*"
    } else if has(&["type", "fill"]) {
        ">"
    } else if has(&["wait", "loading"]) {
        "..."
    } else if has(&["verify", "check"]) {
        "?"
    } else if has(&["install", "deploy"]) {
        "+"
    } else if has(&["screenshot"]) {
        "#"
    } else if has(&["menu", "button"]) {
        "o"
    } else {
        "-"
    }
}

fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms > 1000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", ms)
    }
}
