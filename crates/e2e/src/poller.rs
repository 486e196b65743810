//! Convergence poller
//!
//! Re-samples remote UI state on a schedule until an observation reports
//! convergence or the schedule runs out. The machine moves
//! `Idle -> Polling -> Converged | TimedOut`; a non-transient error moves it
//! to `Aborted` and is returned as-is.
//!
//! A schedule of N waits yields at most N + 1 observations: one per entry,
//! then one authoritative check after `final_wait`. The first converged
//! observation ends the poll.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use foundry_common::{log_context, ScheduleConfig, TerminalState};

use crate::error::{E2eError, E2eResult};
use crate::page::PageContext;

/// Ordered waits governing one bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Wait before each attempt
    pub waits: Vec<Duration>,
    /// Pause after an attempt that did not converge
    pub pause_after_miss: Duration,
    /// Wait before the authoritative check
    pub final_wait: Duration,
}

impl Schedule {
    pub fn new(waits: Vec<Duration>, final_wait: Duration) -> Self {
        Self {
            waits,
            pause_after_miss: Duration::ZERO,
            final_wait,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_after_miss = pause;
        self
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            waits: config
                .waits_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            pause_after_miss: Duration::from_millis(config.pause_after_miss_ms),
            final_wait: Duration::from_millis(config.final_wait_ms),
        }
    }

    /// Ingestion visibility: 15s, 15s, then four at 20s
    pub fn ingestion() -> Self {
        Self::from_config(&ScheduleConfig::ingestion())
    }

    /// Execution log: twelve 5s attempts with a 5s pause between
    pub fn workflow() -> Self {
        Self::from_config(&ScheduleConfig::workflow())
    }

    /// Scheduled attempts, not counting the authoritative check
    pub fn len(&self) -> usize {
        self.waits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    /// Total scheduled waiting when nothing converges
    pub fn ceiling(&self) -> Duration {
        let waits: Duration = self.waits.iter().sum();
        waits + self.pause_after_miss * self.waits.len() as u32 + self.final_wait
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { attempt: u32 },
    Converged { attempt: u32 },
    TimedOut,
    Aborted,
}

impl PollState {
    /// Terminal state reached, if any
    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            PollState::Idle => None,
            PollState::Polling { .. } => Some(TerminalState::InProgress),
            PollState::Converged { .. } => Some(TerminalState::Completed),
            PollState::TimedOut => Some(TerminalState::TimedOut),
            PollState::Aborted => Some(TerminalState::Failed),
        }
        .filter(TerminalState::is_terminal)
    }
}

/// One evaluation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAttempt {
    /// 1-based; the authoritative check is `len(schedule) + 1`
    pub sequence: u32,
    /// Waiting that preceded this attempt, including a pause after the previous miss
    pub waited_ms: u64,
    /// Time since the poll started, at evaluation
    pub elapsed_ms: u64,
    pub observed: bool,
    pub snippet: Option<String>,
    pub authoritative: bool,
    /// Transient failure absorbed by this attempt
    pub error: Option<String>,
}

/// Attempts of one poll, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollHistory(Vec<PollAttempt>);

impl PollHistory {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PollAttempt> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PollAttempt> {
        self.0.iter()
    }

    fn push(&mut self, attempt: PollAttempt) {
        self.0.push(attempt);
    }
}

impl fmt::Display for PollHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.0 {
            write!(
                f,
                "  #{}{} waited {:.1}s (t+{:.1}s): {}",
                a.sequence,
                if a.authoritative { " [final]" } else { "" },
                a.waited_ms as f64 / 1000.0,
                a.elapsed_ms as f64 / 1000.0,
                if a.observed { "converged" } else { "not converged" }
            )?;
            if let Some(s) = &a.snippet {
                write!(f, " | {}", s)?;
            }
            if let Some(e) = &a.error {
                write!(f, " | error: {}", e)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Result of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    /// `Some` once converged
    pub value: Option<T>,
    /// What was seen, for the attempt log
    pub snippet: Option<String>,
}

impl<T> Observation<T> {
    pub fn converged(value: T) -> Self {
        Self {
            value: Some(value),
            snippet: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            value: None,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Domain observation driven by the poller.
///
/// `observe` must be safely repeatable: it reads UI state and never changes
/// the data being observed.
#[async_trait]
pub trait Observe: Send {
    type Output: Send;

    /// Bring the rendered state up to date before attempt `attempt`
    async fn resample(&mut self, _attempt: u32) -> E2eResult<()> {
        Ok(())
    }

    async fn observe(&mut self) -> E2eResult<Observation<Self::Output>>;
}

/// A successful poll
#[derive(Debug, Clone)]
pub struct Converged<T> {
    pub value: T,
    pub attempt: u32,
    pub elapsed: Duration,
    pub history: PollHistory,
}

/// Bounded poll against one page's session
pub struct Poller<'a> {
    ctx: &'a PageContext,
    label: String,
    schedule: Schedule,
    state: PollState,
}

impl<'a> Poller<'a> {
    pub fn for_page(ctx: &'a PageContext, label: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            ctx,
            label: label.into(),
            schedule,
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Poll until `observer` converges or the schedule and final check are spent
    pub async fn poll_until<O: Observe>(&mut self, observer: &mut O) -> E2eResult<Converged<O::Output>> {
        let _guard = self.ctx.session().begin_poll()?;
        let clock = self.ctx.clock().clone();
        let logger = self.ctx.logger().clone();
        let origin = clock.elapsed();
        let max = self.schedule.len() as u32 + 1;
        let mut history = PollHistory::default();

        logger.info_with(
            &format!("Polling: {}", self.label),
            log_context!(
                "attempts" => max,
                "ceiling_ms" => self.schedule.ceiling().as_millis() as u64,
            ),
        );

        let waits = self
            .schedule
            .waits
            .iter()
            .copied()
            .map(|w| (w, false))
            .chain(std::iter::once((self.schedule.final_wait, true)));

        // Pause slept after the previous miss; part of the gap before this attempt.
        let mut paused = Duration::ZERO;
        for (index, (wait, authoritative)) in waits.enumerate() {
            let attempt = index as u32 + 1;
            self.state = PollState::Polling { attempt };
            if !wait.is_zero() {
                clock.sleep(wait).await;
            }
            let waited = std::mem::take(&mut paused) + wait;

            let outcome = match observer.resample(attempt).await {
                Ok(()) => observer.observe().await,
                Err(e) => Err(e),
            };
            let elapsed = clock.elapsed().saturating_sub(origin);
            let mut record = PollAttempt {
                sequence: attempt,
                waited_ms: waited.as_millis() as u64,
                elapsed_ms: elapsed.as_millis() as u64,
                observed: false,
                snippet: None,
                authoritative,
                error: None,
            };

            match outcome {
                Ok(observation) => {
                    record.observed = observation.value.is_some();
                    record.snippet = observation.snippet;
                    let converged = observation.value;
                    history.push(record);

                    if let Some(value) = converged {
                        self.state = PollState::Converged { attempt };
                        logger.success(&format!(
                            "{} converged on attempt {}/{} after {:.1}s",
                            self.label,
                            attempt,
                            max,
                            elapsed.as_secs_f64()
                        ));
                        return Ok(Converged {
                            value,
                            attempt,
                            elapsed,
                            history,
                        });
                    }

                    let last = history.last().and_then(|a| a.snippet.clone());
                    logger.info_with(
                        &format!("{}: attempt {}/{} not converged", self.label, attempt, max),
                        log_context!(
                            "attempt" => attempt,
                            "elapsed_ms" => elapsed.as_millis() as u64,
                            "observed" => last,
                        ),
                    );
                }
                Err(e) if e.is_transient() => {
                    let message = e.to_string();
                    logger
                        .logger()
                        .retry(&self.label, attempt, max, Some(message.as_str()));
                    record.error = Some(message);
                    history.push(record);
                }
                Err(e) => {
                    self.state = PollState::Aborted;
                    logger.error_with(
                        &format!("{} aborted on attempt {}/{}", self.label, attempt, max),
                        Some(&e),
                        log_context!("history" => history.to_string()),
                    );
                    return Err(e);
                }
            }

            if !authoritative && !self.schedule.pause_after_miss.is_zero() {
                clock.sleep(self.schedule.pause_after_miss).await;
                paused = self.schedule.pause_after_miss;
            }
        }

        self.state = PollState::TimedOut;
        logger.error_with(
            &format!("{} did not converge after {} observations", self.label, max),
            None,
            log_context!("history" => history.to_string()),
        );
        Err(E2eError::PollExhausted {
            label: self.label.clone(),
            history,
        })
    }
}
