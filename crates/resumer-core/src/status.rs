use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session.
///
/// Transitions are monotonic: `Recording` moves to exactly one of the two
/// terminal states and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// The producer may still append output.
    Recording,
    /// The producer finished normally.
    Completed,
    /// The recording was stopped early (requested cancel or abandonment).
    Cancelled,
}

impl RecordingStatus {
    /// Returns true for `Completed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordingStatus::Recording)
    }

    /// Lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::Recording => "recording",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a non-consuming status probe for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordingProbe {
    /// Whether a recording is currently in progress.
    pub recording: bool,
    /// Number of chars recorded so far (0 when nothing is known).
    pub length: usize,
}
