use crate::registry::SessionRegistry;
use crate::session::RecordingSession;
use futures_util::{Stream, StreamExt};
use resumer_core::{RecordingStatus, ResumerResult};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The producer's right to append to one recording.
///
/// Only [`Recorder::start`] hands these out, one per running session.
#[derive(Debug)]
pub struct SessionHandle {
    session: Arc<RecordingSession>,
}

impl SessionHandle {
    pub fn conversation_id(&self) -> Uuid {
        self.session.conversation_id()
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub fn status(&self) -> RecordingStatus {
        self.session.status()
    }

    /// Chars recorded so far.
    pub fn len(&self) -> usize {
        self.session.total_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll point for cooperative cancellation.
    pub fn is_cancel_requested(&self) -> bool {
        self.session.is_cancel_requested()
    }

    /// Resolves once a cancel has been requested for this recording.
    pub async fn cancelled(&self) {
        let mut watch = self.session.cancel_watch();
        // The sender lives as long as the session we hold, so this cannot
        // fail while `self` is alive.
        let _ = watch.wait_for(|requested| *requested).await;
    }

    pub fn session(&self) -> &Arc<RecordingSession> {
        &self.session
    }
}

/// How a producer loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingOutcome {
    pub status: RecordingStatus,
    /// Final length in chars.
    pub length: usize,
    /// Everything that was recorded.
    pub content: String,
}

/// Producer-facing API.
#[derive(Clone)]
pub struct Recorder {
    registry: Arc<SessionRegistry>,
}

impl Recorder {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Begins a new recording; fails if one is already running.
    pub fn start(&self, conversation_id: Uuid) -> ResumerResult<SessionHandle> {
        let session = self.registry.start(conversation_id)?;
        Ok(SessionHandle { session })
    }

    /// Appends the next chunk of output.
    pub fn append(&self, handle: &SessionHandle, data: &str) -> ResumerResult<usize> {
        handle.session.append(data)
    }

    /// Marks the recording as completed. No-op when already terminal.
    pub fn complete(&self, handle: &SessionHandle) {
        handle.session.finish(RecordingStatus::Completed);
    }

    /// Marks the recording as cancelled. No-op when already terminal.
    pub fn cancel(&self, handle: &SessionHandle) {
        handle.session.finish(RecordingStatus::Cancelled);
    }

    /// Drives a producer loop: records every token from `tokens` until the
    /// stream ends or cancellation is requested.
    ///
    /// The cancel flag is checked before and after every append, and the
    /// loop also wakes on a cancel request while the upstream is idle. An
    /// upstream error completes the recording with what was produced so far
    /// and is then returned.
    pub async fn record_stream<S>(
        &self,
        handle: SessionHandle,
        tokens: S,
    ) -> ResumerResult<RecordingOutcome>
    where
        S: Stream<Item = ResumerResult<String>> + Send,
    {
        let mut tokens = std::pin::pin!(tokens);
        let conversation_id = handle.conversation_id();
        let mut failure = None;

        loop {
            if handle.is_cancel_requested() {
                self.cancel(&handle);
                break;
            }
            let next = tokio::select! {
                biased;
                _ = handle.cancelled() => {
                    self.cancel(&handle);
                    break;
                }
                next = tokens.next() => next,
            };
            match next {
                Some(Ok(token)) => {
                    if let Err(e) = self.append(&handle, &token) {
                        // Someone else terminated the session (replace or
                        // abandonment) or it hit the size cap.
                        warn!(conversation_id = %conversation_id, error = %e, "Stopped recording");
                        self.cancel(&handle);
                        failure = Some(e);
                        break;
                    }
                    if handle.is_cancel_requested() {
                        self.cancel(&handle);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(conversation_id = %conversation_id, error = %e, "Generator failed");
                    self.complete(&handle);
                    failure = Some(e);
                    break;
                }
                None => {
                    self.complete(&handle);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        let outcome = RecordingOutcome {
            status: handle.status(),
            length: handle.len(),
            content: handle.session.content(),
        };
        info!(
            conversation_id = %conversation_id,
            status = %outcome.status,
            length = outcome.length,
            "Producer loop finished"
        );
        Ok(outcome)
    }
}
