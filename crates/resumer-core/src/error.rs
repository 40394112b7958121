use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`ResumerError`].
pub type ResumerResult<T> = Result<T, ResumerError>;

/// Top-level error type for the resumer service.
///
/// The first group of variants is produced by the recording engine itself;
/// the remaining ones wrap failures of the collaborators around it.
#[derive(Error, Debug)]
pub enum ResumerError {
    /// `start` was called while a recording is already in progress.
    #[error("Conversation {conversation_id} already has a recording in progress")]
    Conflict {
        /// Conversation that is already being recorded.
        conversation_id: Uuid,
    },

    /// An append was attempted on a session that already reached a terminal state.
    #[error("Recording for conversation {conversation_id} is closed")]
    SessionClosed {
        /// Conversation whose session is terminal.
        conversation_id: Uuid,
    },

    /// The append would grow the session beyond the configured size cap.
    #[error("Recording for conversation {conversation_id} exceeds {limit} chars")]
    SessionTooLarge {
        /// Conversation being recorded.
        conversation_id: Uuid,
        /// Configured maximum session length in chars.
        limit: usize,
    },

    /// No recording exists for the conversation (never started or evicted).
    #[error("No recording found for conversation {conversation_id}")]
    ResumeNotFound {
        /// Conversation that was looked up.
        conversation_id: Uuid,
    },

    /// The requested resume offset lies past the end of the recorded output.
    #[error("Resume position {requested} is past the recorded length {available}")]
    InvalidPosition {
        /// Offset supplied by the client.
        requested: usize,
        /// Length recorded so far.
        available: usize,
    },

    /// A cancel was requested but the conversation has no active recording.
    #[error("Conversation {conversation_id} has no recording in progress")]
    NotRecording {
        /// Conversation that was targeted.
        conversation_id: Uuid,
    },

    /// The reader could not keep up with the producer and was disconnected.
    #[error("Replay fell behind at position {position} and was dropped")]
    SubscriberLagged {
        /// Last offset delivered to the reader; resume from here.
        position: usize,
    },

    /// The session already has the maximum number of live readers attached.
    #[error("Recording already has {max_subscribers} live readers")]
    SubscriberLimit {
        /// Configured reader cap.
        max_subscribers: usize,
    },

    /// Response recording is switched off in this deployment.
    #[error("Response recording is disabled")]
    Disabled,

    /// The upstream response generator failed.
    #[error("Generator error: {0}")]
    Generator(String),

    /// The memory store rejected a read or write.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResumerError {
    /// Whether the error was caused by the caller (bad id, stale cursor,
    /// conflicting request) rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ResumerError::Conflict { .. }
                | ResumerError::SessionClosed { .. }
                | ResumerError::ResumeNotFound { .. }
                | ResumerError::InvalidPosition { .. }
                | ResumerError::NotRecording { .. }
                | ResumerError::SubscriberLimit { .. }
        )
    }
}
