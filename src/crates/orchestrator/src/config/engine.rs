//! Engine configuration
//!
//! ```yaml
//! checkpoint_root: ${AGENTGRAPH_CHECKPOINT_ROOT:./checkpoints}
//! max_steps: 200
//! max_duration_secs: 900
//! persist_final_snapshot: true
//! summary_limits:
//!   max_description_chars: 160
//!   max_key_results: 5
//!   max_key_result_chars: 200
//! output_retry:
//!   max_attempts: 3
//!   backoff_delays_secs: [0, 2, 4]
//! ```

use crate::{OrchestratorError, Result};
use agentgraph_core::{NodeConfig, SummaryLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest single backoff delay accepted in `backoff_delays_secs`
pub const MAX_BACKOFF_SECS: f64 = 300.0;

/// Retry policy for the output stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRetrySettings {
    /// Maximum attempts per output tool
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before attempt N is `backoff_delays_secs[N - 1]`; the last
    /// entry is reused when the list is short
    #[serde(default = "default_backoff_delays")]
    pub backoff_delays_secs: Vec<f64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_delays() -> Vec<f64> {
    vec![0.0, 2.0, 4.0]
}

impl Default for OutputRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_delays_secs: default_backoff_delays(),
        }
    }
}

impl OutputRetrySettings {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_backoff_delays(mut self, delays: Vec<Duration>) -> Self {
        self.backoff_delays_secs = delays.iter().map(Duration::as_secs_f64).collect();
        self
    }

    /// Settings for one output node; a node `retry_count` replaces
    /// `max_attempts`
    pub fn for_node(&self, config: &NodeConfig) -> Self {
        let mut settings = self.clone();
        if let Some(count) = config.retry_count {
            settings.max_attempts = count.max(1);
        }
        settings
    }

    /// Delay before the given 1-based attempt, clamped to
    /// `0..=MAX_BACKOFF_SECS`
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.backoff_delays_secs.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt as usize - 1).min(self.backoff_delays_secs.len() - 1);
        let secs = self.backoff_delays_secs[index];
        let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, MAX_BACKOFF_SECS) };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OrchestratorError::Config(
                "output_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        for delay in &self.backoff_delays_secs {
            if Duration::try_from_secs_f64(*delay).is_err() || *delay > MAX_BACKOFF_SECS {
                return Err(OrchestratorError::Config(format!(
                    "output_retry.backoff_delays_secs entries must be between 0 and {}, got {}",
                    MAX_BACKOFF_SECS, delay
                )));
            }
        }
        Ok(())
    }
}

/// Configuration of the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory of checkpoint trees
    #[serde(default = "default_checkpoint_root")]
    pub checkpoint_root: PathBuf,

    /// Ceiling on executed nodes per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Wall-clock budget per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,

    #[serde(default)]
    pub summary_limits: SummaryLimits,

    #[serde(default)]
    pub output_retry: OutputRetrySettings,

    /// Copy the final state into the task-record store at termination
    #[serde(default)]
    pub persist_final_snapshot: bool,
}

fn default_checkpoint_root() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_max_steps() -> u64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_root: default_checkpoint_root(),
            max_steps: default_max_steps(),
            max_duration_secs: None,
            summary_limits: SummaryLimits::default(),
            output_retry: OutputRetrySettings::default(),
            persist_final_snapshot: false,
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file with `$include` and `${ENV:default}` support
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = super::loader::load_yaml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_checkpoint_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.checkpoint_root = root.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration_secs = Some(duration.as_secs());
        self
    }

    pub fn with_summary_limits(mut self, limits: SummaryLimits) -> Self {
        self.summary_limits = limits;
        self
    }

    pub fn with_output_retry(mut self, settings: OutputRetrySettings) -> Self {
        self.output_retry = settings;
        self
    }

    pub fn with_persist_final_snapshot(mut self, persist: bool) -> Self {
        self.persist_final_snapshot = persist;
        self
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(OrchestratorError::Config(
                "max_steps must be at least 1".to_string(),
            ));
        }
        self.output_retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps, 200);
        assert!(config.max_duration().is_none());
        assert_eq!(config.output_retry.max_attempts, 3);
        assert_eq!(config.output_retry.backoff_delays_secs, vec![0.0, 2.0, 4.0]);
        assert!(!config.persist_final_snapshot);
        config.validate().unwrap();
    }

    #[test]
    fn test_delay_schedule() {
        let retry = OutputRetrySettings::default();
        assert_eq!(retry.delay_before(1), Duration::ZERO);
        assert_eq!(retry.delay_before(2), Duration::from_secs(2));
        assert_eq!(retry.delay_before(3), Duration::from_secs(4));
        // Short schedule reuses the last delay
        assert_eq!(retry.delay_before(7), Duration::from_secs(4));

        let none = OutputRetrySettings::new(3).with_backoff_delays(vec![]);
        assert_eq!(none.delay_before(3), Duration::ZERO);
    }

    #[test]
    fn test_node_retry_count_overrides_attempts() {
        let retry = OutputRetrySettings::default();
        let node = NodeConfig::new().output_tool().with_retry_count(5);
        assert_eq!(retry.for_node(&node).max_attempts, 5);
        assert_eq!(retry.for_node(&NodeConfig::default()).max_attempts, 3);
        let zero = NodeConfig::new().with_retry_count(0);
        assert_eq!(retry.for_node(&zero).max_attempts, 1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("max_steps: 12\noutput_retry: { max_attempts: 5 }").unwrap();
        assert_eq!(config.max_steps, 12);
        assert_eq!(config.output_retry.max_attempts, 5);
        assert_eq!(config.output_retry.backoff_delays_secs, vec![0.0, 2.0, 4.0]);
        assert_eq!(config.summary_limits, SummaryLimits::default());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(EngineConfig::default().with_max_steps(0).validate().is_err());
        let retry = OutputRetrySettings {
            max_attempts: 2,
            backoff_delays_secs: vec![-1.0],
        };
        assert!(retry.validate().is_err());
        assert!(OutputRetrySettings::new(0).validate().is_err());
    }

    #[test]
    fn test_oversized_delays_are_rejected_and_clamped() {
        let huge = OutputRetrySettings {
            max_attempts: 3,
            backoff_delays_secs: vec![0.0, 1e20],
        };
        assert!(huge.validate().is_err());
        // Unvalidated settings still yield a bounded delay
        assert_eq!(huge.delay_before(2), Duration::from_secs_f64(MAX_BACKOFF_SECS));

        let odd = OutputRetrySettings {
            max_attempts: 3,
            backoff_delays_secs: vec![0.0, f64::NAN, f64::INFINITY],
        };
        assert!(odd.validate().is_err());
        assert_eq!(odd.delay_before(2), Duration::ZERO);
        assert_eq!(odd.delay_before(3), Duration::from_secs_f64(MAX_BACKOFF_SECS));

        let at_cap = OutputRetrySettings {
            max_attempts: 2,
            backoff_delays_secs: vec![0.0, MAX_BACKOFF_SECS],
        };
        at_cap.validate().unwrap();
        assert!(EngineConfig::default().with_output_retry(huge).validate().is_err());
    }
}
