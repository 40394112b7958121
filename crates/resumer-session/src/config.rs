use resumer_core::{ResumerError, ResumerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `start` does when the conversation is already being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail the second `start` with a conflict error.
    #[default]
    Reject,
    /// Cancel the running recording and install a fresh one.
    Replace,
}

/// What a cancel request does when nothing is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSessionPolicy {
    /// Report a not-recording error to the caller.
    #[default]
    Error,
    /// Accept the request silently.
    Ignore,
}

/// Operational parameters of the recording engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumerConfig {
    /// Master switch for the feature.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How long a completed or cancelled session stays replayable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// A recording with no append for this long is treated as abandoned.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Period of the retention sweeper.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Maximum recorded length per session, in chars.
    #[serde(default = "default_max_session_chars")]
    pub max_session_chars: usize,
    /// Chunks that may be queued for one live reader before it is dropped.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
    /// Maximum live readers attached to one session.
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
    #[serde(default)]
    pub on_cancel_missing: MissingSessionPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_retention_secs() -> u64 {
    300
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

fn default_max_session_chars() -> usize {
    4 * 1024 * 1024
}

fn default_subscriber_queue_capacity() -> usize {
    256
}

fn default_max_subscribers() -> usize {
    64
}

impl Default for ResumerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            retention_secs: default_retention_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_session_chars: default_max_session_chars(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            max_subscribers: default_max_subscribers(),
            on_conflict: ConflictPolicy::default(),
            on_cancel_missing: MissingSessionPolicy::default(),
        }
    }
}

impl ResumerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Rejects values that would make the engine unusable.
    pub fn validate(&self) -> ResumerResult<()> {
        if self.subscriber_queue_capacity == 0 {
            return Err(ResumerError::Config(
                "subscriber_queue_capacity must be > 0".into(),
            ));
        }
        if self.max_subscribers == 0 {
            return Err(ResumerError::Config("max_subscribers must be > 0".into()));
        }
        if self.max_session_chars == 0 {
            return Err(ResumerError::Config("max_session_chars must be > 0".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ResumerError::Config("sweep_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}
