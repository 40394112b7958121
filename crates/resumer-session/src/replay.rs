use crate::chunk::Chunk;
use crate::registry::SessionRegistry;
use crate::session::{LiveTail, RecordingSession};
use futures_util::Stream;
use resumer_core::{RecordingStatus, ResumerError, ResumerResult};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One item delivered by a [`Replay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    /// Output starting at `offset`.
    Chunk {
        offset: usize,
        data: Arc<str>,
    },
    /// The recording reached a terminal state and everything was delivered.
    End(RecordingStatus),
}

/// Consumer-facing entry point: attaches cursors to recordings by id.
#[derive(Clone)]
pub struct Replayer {
    registry: Arc<SessionRegistry>,
}

impl Replayer {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Opens a replay of `conversation_id` starting at char offset `from`.
    ///
    /// Fails with `ResumeNotFound` when no session exists and with
    /// `InvalidPosition` when `from` lies past what was recorded.
    pub fn replay(&self, conversation_id: Uuid, from: usize) -> ResumerResult<Replay> {
        let session = self
            .registry
            .get(conversation_id)
            .ok_or(ResumerError::ResumeNotFound { conversation_id })?;
        Replay::attach(session, from)
    }
}

/// An independent cursor over one recording.
///
/// Yields the buffered suffix first, then (while the session is recording)
/// each newly appended chunk, then a single [`ReplayEvent::End`]. Dropping
/// the replay detaches it without affecting the producer or other readers.
pub struct Replay {
    session: Arc<RecordingSession>,
    backlog: VecDeque<Chunk>,
    live: Option<LiveTail>,
    position: usize,
    finished: bool,
}

impl Replay {
    pub(crate) fn attach(session: Arc<RecordingSession>, from: usize) -> ResumerResult<Self> {
        let attachment = session.attach(from)?;
        debug!(
            conversation_id = %session.conversation_id(),
            from,
            buffered = attachment.backlog.len(),
            live = attachment.live.is_some(),
            "Replay opened"
        );
        Ok(Self {
            session,
            backlog: attachment.backlog.into(),
            live: attachment.live,
            position: from,
            finished: false,
        })
    }

    /// Offset of the next char this cursor will deliver.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn conversation_id(&self) -> Uuid {
        self.session.conversation_id()
    }

    /// Whether this cursor is still receiving live output.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Next event, or `None` once the end marker (or an error) was returned.
    ///
    /// Suspends only when caught up with a still-recording session.
    pub async fn next_event(&mut self) -> Option<ResumerResult<ReplayEvent>> {
        if self.finished {
            return None;
        }
        if let Some(chunk) = self.backlog.pop_front() {
            return Some(Ok(self.deliver(chunk)));
        }
        if let Some(live) = self.live.as_mut() {
            if let Some(chunk) = live.rx.recv().await {
                return Some(Ok(self.deliver(chunk)));
            }
            let lagged = live.lagged.load(Ordering::Acquire);
            self.detach();
            if lagged {
                self.finished = true;
                return Some(Err(ResumerError::SubscriberLagged {
                    position: self.position,
                }));
            }
        }

        self.finished = true;
        let status = self.session.status();
        if !status.is_terminal() {
            return Some(Err(ResumerError::SubscriberLagged {
                position: self.position,
            }));
        }
        debug_assert_eq!(self.position, self.session.total_len());
        Some(Ok(ReplayEvent::End(status)))
    }

    /// Adapts the replay into a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = ResumerResult<ReplayEvent>> + Send {
        futures_util::stream::unfold(self, |mut replay| async move {
            replay.next_event().await.map(|event| (event, replay))
        })
    }

    fn deliver(&mut self, chunk: Chunk) -> ReplayEvent {
        debug_assert_eq!(chunk.start(), self.position, "replay cursor out of step");
        self.position = chunk.end();
        ReplayEvent::Chunk {
            offset: chunk.start(),
            data: chunk.shared_text(),
        }
    }

    fn detach(&mut self) {
        if let Some(live) = self.live.take() {
            self.session.detach(live.id);
        }
    }
}

impl Drop for Replay {
    fn drop(&mut self) {
        self.detach();
    }
}
