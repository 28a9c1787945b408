//! Configuration schema types.
//!
//! All structs support both `snake_case` and `camelCase` field names in JSON
//! via `#[serde(alias)]`. Unknown fields are silently ignored for forward
//! compatibility, and every field has a default so an empty object is a
//! valid configuration.
//!
//! # Module Structure
//!
//! - [`stages`] -- Per-stage worker pool and latency model settings

pub mod stages;

pub use stages::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration for a relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Reorder buffer and ingress window settings.
    #[serde(default)]
    pub sequencer: SequencerConfig,

    /// Per-stage worker pool settings.
    #[serde(default)]
    pub stages: StagesConfig,

    /// Playback sink settings.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Burst event source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// File logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.sequencer.validate()?;
        self.stages.event_to_text.validate("event_to_text")?;
        self.stages.text_to_speech.validate("text_to_speech")?;
        if self.source.burst_size == 0 {
            return Err(invalid("source.burst_size must be at least 1"));
        }
        Ok(())
    }
}

pub(crate) fn invalid(reason: impl Into<String>) -> RelayError {
    RelayError::ConfigInvalid {
        reason: reason.into(),
    }
}

// ── Sequencer ────────────────────────────────────────────────────────────

/// What ingress does when the in-flight window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until a window slot frees up.
    #[default]
    Block,
    /// Fail immediately with `Overloaded`.
    Reject,
}

/// Reorder buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Maximum number of issued-but-unreleased items.
    #[serde(default = "default_max_window", alias = "maxWindow")]
    pub max_window: usize,

    /// How long an item may stay pending before it is expired (ms).
    #[serde(default = "default_deadline_ms", alias = "perItemDeadlineMs")]
    pub per_item_deadline_ms: u64,

    /// First sequence number issued.
    #[serde(default = "default_sequence_base", alias = "sequenceBase")]
    pub sequence_base: u64,

    /// Ingress behavior when the window is full.
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_max_window() -> usize {
    64
}
fn default_deadline_ms() -> u64 {
    10_000
}
fn default_sequence_base() -> u64 {
    1
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_window: default_max_window(),
            per_item_deadline_ms: default_deadline_ms(),
            sequence_base: default_sequence_base(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl SequencerConfig {
    /// The per-item deadline as a [`Duration`].
    pub fn per_item_deadline(&self) -> Duration {
        Duration::from_millis(self.per_item_deadline_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_window == 0 {
            return Err(invalid("sequencer.max_window must be at least 1"));
        }
        if self.per_item_deadline_ms == 0 {
            return Err(invalid("sequencer.per_item_deadline_ms must be positive"));
        }
        Ok(())
    }
}

// ── Playback ─────────────────────────────────────────────────────────────

/// Playback sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Simulated playback time per clip (ms).
    #[serde(default = "default_playback_delay_ms", alias = "delayMs")]
    pub delay_ms: u64,
}

fn default_playback_delay_ms() -> u64 {
    500
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_playback_delay_ms(),
        }
    }
}

impl PlaybackConfig {
    /// Playback time per clip as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// ── Source ───────────────────────────────────────────────────────────────

/// Burst event source configuration.
///
/// The source emits `burst_size` events spaced `spacing_ms` apart, then
/// sleeps `pause_ms` before the next burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Events per burst.
    #[serde(default = "default_burst_size", alias = "burstSize")]
    pub burst_size: u32,

    /// Gap between events within a burst (ms).
    #[serde(default = "default_spacing_ms", alias = "spacingMs")]
    pub spacing_ms: u64,

    /// Pause between bursts (ms).
    #[serde(default = "default_pause_ms", alias = "pauseMs")]
    pub pause_ms: u64,

    /// Stop after this many events. `None` runs until cancelled.
    #[serde(default, alias = "totalEvents")]
    pub total_events: Option<u64>,
}

fn default_burst_size() -> u32 {
    2
}
fn default_spacing_ms() -> u64 {
    500
}
fn default_pause_ms() -> u64 {
    3_000
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            burst_size: default_burst_size(),
            spacing_ms: default_spacing_ms(),
            pause_ms: default_pause_ms(),
            total_events: None,
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────

/// File logging configuration.
///
/// Console output is always on and filtered by `RUST_LOG`. When `directory`
/// is set, every event at debug level and above is also written to
/// `<directory>/<component>.log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for log files. `None` disables file logging.
    #[serde(default)]
    pub directory: Option<String>,

    /// Log file stem.
    #[serde(default = "default_component")]
    pub component: String,
}

fn default_component() -> String {
    "seqrelay".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            component: default_component(),
        }
    }
}
