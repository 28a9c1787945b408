//! Stage worker pool configuration.
//!
//! Each stage runs on its own bounded pool. The latency model (uniform delay
//! in `[min_delay_ms, max_delay_ms]`) and `failure_rate` drive the built-in
//! simulated stages; custom stages only read `workers` and `queue_capacity`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::invalid;
use crate::error::Result;

/// Configuration for every stage in the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Event-to-text stage.
    #[serde(default = "StageConfig::event_to_text", alias = "eventToText")]
    pub event_to_text: StageConfig,

    /// Text-to-speech stage.
    #[serde(default = "StageConfig::text_to_speech", alias = "textToSpeech")]
    pub text_to_speech: StageConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            event_to_text: StageConfig::event_to_text(),
            text_to_speech: StageConfig::text_to_speech(),
        }
    }
}

/// Configuration for one stage's worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Maximum items processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pool intake queue capacity. `0` means "same as the window".
    #[serde(default, alias = "queueCapacity")]
    pub queue_capacity: usize,

    /// Lower bound of the simulated processing delay (ms).
    #[serde(default, alias = "minDelayMs")]
    pub min_delay_ms: u64,

    /// Upper bound of the simulated processing delay (ms).
    #[serde(default, alias = "maxDelayMs")]
    pub max_delay_ms: u64,

    /// Probability in `[0, 1]` that a simulated item fails.
    #[serde(default, alias = "failureRate")]
    pub failure_rate: f64,
}

fn default_workers() -> usize {
    2
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 0,
            min_delay_ms: 0,
            max_delay_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl StageConfig {
    /// Defaults for the event-to-text stage (0.5s to 2s of work).
    pub fn event_to_text() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2_000,
            ..Self::default()
        }
    }

    /// Defaults for the text-to-speech stage (0.1s to 1s of work).
    pub fn text_to_speech() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 1_000,
            ..Self::default()
        }
    }

    /// Intake queue capacity, falling back to `window` when unset.
    pub fn queue_capacity_or(&self, window: usize) -> usize {
        if self.queue_capacity == 0 {
            window.max(1)
        } else {
            self.queue_capacity
        }
    }

    /// Lower delay bound as a [`Duration`].
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Upper delay bound as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub(super) fn validate(&self, name: &str) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid(format!("stages.{name}.workers must be at least 1")));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(invalid(format!(
                "stages.{name}.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(invalid(format!(
                "stages.{name}.failure_rate must be within [0, 1]"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_defaults() {
        let stages = StagesConfig::default();
        assert_eq!(stages.event_to_text.workers, 2);
        assert_eq!(stages.event_to_text.min_delay(), Duration::from_millis(500));
        assert_eq!(stages.event_to_text.max_delay(), Duration::from_secs(2));
        assert_eq!(stages.text_to_speech.max_delay(), Duration::from_secs(1));
    }

    #[test]
    fn missing_stage_gets_its_own_defaults() {
        let stages: StagesConfig =
            serde_json::from_str(r#"{"textToSpeech": {"workers": 4}}"#).unwrap();
        assert_eq!(stages.event_to_text.min_delay_ms, 500);
        assert_eq!(stages.text_to_speech.workers, 4);
        assert_eq!(stages.text_to_speech.max_delay_ms, 0);
    }

    #[test]
    fn queue_capacity_falls_back_to_window() {
        let cfg = StageConfig::default();
        assert_eq!(cfg.queue_capacity_or(32), 32);
        let cfg = StageConfig {
            queue_capacity: 5,
            ..StageConfig::default()
        };
        assert_eq!(cfg.queue_capacity_or(32), 5);
    }

    #[test]
    fn inverted_delay_bounds_rejected() {
        let cfg = StageConfig {
            min_delay_ms: 10,
            max_delay_ms: 5,
            ..StageConfig::default()
        };
        let err = cfg.validate("x").unwrap_err();
        assert!(err.to_string().contains("exceeds max_delay_ms"));
    }

    #[test]
    fn failure_rate_out_of_range_rejected() {
        let cfg = StageConfig {
            failure_rate: 1.5,
            ..StageConfig::default()
        };
        assert!(cfg.validate("x").is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = StageConfig {
            workers: 0,
            ..StageConfig::default()
        };
        assert!(cfg.validate("x").is_err());
    }
}
