//! Retry, backoff and fallback for output tools
//!
//! The output stage is the only place in the engine that retries. A call to
//! [`OutputToolExecutor::execute_with_retry`] runs one output tool:
//!
//! ```text
//! attempt 1 ──fail──▶ classify ──non-recoverable──▶ OutputFailure (recoverable = false)
//!    │                   │
//!    │               recoverable
//!    │                   ▼
//!    │            sleep backoff[1] ──▶ attempt 2 ──▶ ... ──▶ attempt max
//!    │                                                          │
//!  success ──▶ OutputSuccess (recovered = any earlier failure)  exhausted
//!                                                               ▼
//!                                                  OutputFailure (recoverable = true)
//! ```
//!
//! Every attempt is appended to a per-call history that is reset when the
//! next call starts. When a tool fails for good, the orchestrator picks the
//! next candidate with [`try_alternative_tool`].

use super::classify::{classify_error, ErrorKind};
use crate::config::OutputRetrySettings;
use agentgraph_core::{Capability, CapabilityError, NodeConfig, RuntimeState, StructuredResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One attempt of an output tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryHistoryEntry {
    /// 1-based attempt number
    pub attempt: u32,
    pub tool: String,
    pub timestamp: DateTime<Utc>,
    /// Offset of the attempt start from the start of the call
    pub start_offset_ms: u64,
    pub duration_ms: u64,
    /// `None` for the successful attempt
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Set on a success that followed at least one failure
    pub recovered: bool,
}

/// Successful output tool call
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSuccess {
    pub tool: String,
    pub result: StructuredResult,
    pub attempts: u32,
    pub recovered: bool,
    pub correlation_id: String,
}

/// Output tool call that did not produce a result
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Output tool '{tool}' failed after {attempts} attempt(s) [{kind}]: {message}")]
pub struct OutputFailure {
    pub tool: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Per-attempt error chain
    pub context: Vec<String>,
    pub attempts: u32,
    pub recoverable: bool,
    pub correlation_id: String,
}

/// An output tool that can stand in for another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCandidate {
    pub name: String,
    /// Lower is preferred
    pub priority: i64,
}

impl OutputCandidate {
    pub fn new(name: impl Into<String>, priority: i64) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }
}

/// Lowest-priority candidate that has not failed yet
///
/// Ties go to the candidate listed first.
pub fn try_alternative_tool<'a>(
    available: &'a [OutputCandidate],
    failed: &[String],
) -> Option<&'a OutputCandidate> {
    available
        .iter()
        .filter(|c| !failed.iter().any(|f| f == &c.name))
        .min_by_key(|c| c.priority)
}

/// Bounded retry wrapper around one output tool call
#[derive(Debug, Clone)]
pub struct OutputToolExecutor {
    settings: OutputRetrySettings,
    history: Vec<RetryHistoryEntry>,
}

impl OutputToolExecutor {
    pub fn new(settings: OutputRetrySettings) -> Self {
        Self {
            settings,
            history: Vec::new(),
        }
    }

    pub fn settings(&self) -> &OutputRetrySettings {
        &self.settings
    }

    /// Attempts of the last call, oldest first
    pub fn history(&self) -> Vec<RetryHistoryEntry> {
        self.history.clone()
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    /// Run an output tool with classification, backoff and retries
    ///
    /// The capability is invoked at most `max_attempts` times. A result with
    /// status `error` counts as a failed attempt.
    pub async fn execute_with_retry(
        &mut self,
        capability: &dyn Capability,
        tool: &str,
        state: &RuntimeState,
        input: Value,
        config: &NodeConfig,
        correlation_id: &str,
    ) -> std::result::Result<OutputSuccess, OutputFailure> {
        self.reset_history();
        let max_attempts = self.settings.max_attempts;
        let call_start = Instant::now();
        let mut context = Vec::new();
        let mut last_failure: Option<(ErrorKind, String)> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.settings.delay_before(attempt);
                info!(
                    tool = tool,
                    correlation_id = correlation_id,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying output tool"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let started = Instant::now();
            let timestamp = Utc::now();
            let outcome = capability.invoke(state, input.clone(), config).await;
            let start_offset_ms = started.duration_since(call_start).as_millis() as u64;
            let duration_ms = started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(result) if !result.is_error() => {
                    let recovered = attempt > 1;
                    self.history.push(RetryHistoryEntry {
                        attempt,
                        tool: tool.to_string(),
                        timestamp,
                        start_offset_ms,
                        duration_ms,
                        error: None,
                        error_kind: None,
                        recovered,
                    });
                    if recovered {
                        info!(
                            tool = tool,
                            correlation_id = correlation_id,
                            attempt = attempt,
                            "Output tool succeeded after retry"
                        );
                    }
                    return Ok(OutputSuccess {
                        tool: tool.to_string(),
                        result,
                        attempts: attempt,
                        recovered,
                        correlation_id: correlation_id.to_string(),
                    });
                }
                Ok(result) => CapabilityError::new(result.output_text()),
                Err(e) => e,
            };

            let kind = classify_error(&error);
            debug!(
                tool = tool,
                correlation_id = correlation_id,
                attempt = attempt,
                error = %error,
                classification = %kind,
                "Output tool attempt failed"
            );
            self.history.push(RetryHistoryEntry {
                attempt,
                tool: tool.to_string(),
                timestamp,
                start_offset_ms,
                duration_ms,
                error: Some(error.message.clone()),
                error_kind: Some(kind),
                recovered: false,
            });
            context.push(format!("attempt {}: [{}] {}", attempt, kind, error.message));

            if !kind.is_recoverable() {
                error!(
                    tool = tool,
                    correlation_id = correlation_id,
                    classification = %kind,
                    "Non-recoverable output error, aborting retries"
                );
                return Err(OutputFailure {
                    tool: tool.to_string(),
                    kind,
                    message: error.message,
                    context,
                    attempts: attempt,
                    recoverable: false,
                    correlation_id: correlation_id.to_string(),
                });
            }

            if attempt < max_attempts {
                warn!(
                    tool = tool,
                    correlation_id = correlation_id,
                    attempt = attempt,
                    classification = %kind,
                    "Recoverable output error, will retry"
                );
            }
            last_failure = Some((kind, error.message));
        }

        let (kind, message) = last_failure.unwrap_or((
            ErrorKind::TemporaryError,
            "no attempts were configured".to_string(),
        ));
        error!(
            tool = tool,
            correlation_id = correlation_id,
            max_attempts = max_attempts,
            "All output attempts exhausted"
        );
        Err(OutputFailure {
            tool: tool.to_string(),
            kind,
            message,
            context,
            attempts: max_attempts,
            recoverable: true,
            correlation_id: correlation_id.to_string(),
        })
    }
}
