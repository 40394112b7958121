use crate::chunk::{Chunk, ChunkLog};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use resumer_core::{RecordingProbe, RecordingStatus, ResumerError, ResumerResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-session resource limits, derived from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_chars: usize,
    pub queue_capacity: usize,
    pub max_subscribers: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_chars: 4 * 1024 * 1024,
            queue_capacity: 256,
            max_subscribers: 64,
        }
    }
}

/// Fan-out slot for one live reader.
struct Subscriber {
    tx: mpsc::Sender<Chunk>,
    lagged: Arc<AtomicBool>,
}

/// Receiving half of a live reader registration.
pub(crate) struct LiveTail {
    pub(crate) id: u64,
    pub(crate) rx: mpsc::Receiver<Chunk>,
    pub(crate) lagged: Arc<AtomicBool>,
}

/// What a reader gets when it attaches: the buffered suffix, plus a live
/// queue if the session is still recording.
pub(crate) struct Attachment {
    pub(crate) backlog: Vec<Chunk>,
    pub(crate) live: Option<LiveTail>,
}

struct SessionState {
    status: RecordingStatus,
    log: ChunkLog,
    completed_at: Option<DateTime<Utc>>,
    last_activity: Instant,
    terminal_at: Option<Instant>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber_id: u64,
}

/// One conversation's in-flight (or recently finished) response.
///
/// All mutation happens under a single short lock: appends push a shared
/// chunk and hand it to every live reader with a non-blocking `try_send`;
/// attaching a reader snapshots the backlog and registers its queue in the
/// same critical section, so no chunk is ever missed or delivered twice.
/// A terminal transition drops every reader queue, which is how readers
/// learn that the stream ended.
pub struct RecordingSession {
    id: Uuid,
    conversation_id: Uuid,
    created_at: DateTime<Utc>,
    limits: SessionLimits,
    state: Mutex<SessionState>,
    cancel_tx: watch::Sender<bool>,
}

impl RecordingSession {
    pub fn new(conversation_id: Uuid, limits: SessionLimits) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            created_at: Utc::now(),
            limits,
            state: Mutex::new(SessionState {
                status: RecordingStatus::Recording,
                log: ChunkLog::new(),
                completed_at: None,
                last_activity: Instant::now(),
                terminal_at: None,
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
            }),
            cancel_tx,
        }
    }

    /// Identifier of this particular recording (distinct per `start`).
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wall-clock time of the terminal transition, if any.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().completed_at
    }

    pub fn status(&self) -> RecordingStatus {
        self.state.lock().status
    }

    /// Recorded length in chars.
    pub fn total_len(&self) -> usize {
        self.state.lock().log.total_len()
    }

    pub fn probe(&self) -> RecordingProbe {
        let state = self.state.lock();
        RecordingProbe {
            recording: state.status == RecordingStatus::Recording,
            length: state.log.total_len(),
        }
    }

    /// Number of live readers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Everything recorded so far, concatenated.
    pub fn content(&self) -> String {
        self.state.lock().log.concat()
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Sets the cancellation flag. Returns `true` only for the call that
    /// actually flipped it.
    pub fn request_cancel(&self) -> bool {
        let flipped = self.cancel_tx.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        });
        if flipped {
            info!(
                conversation_id = %self.conversation_id,
                session_id = %self.id,
                "Cancellation requested"
            );
        }
        flipped
    }

    /// A receiver that observes the cancellation flag.
    pub fn cancel_watch(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Appends `text` as the next chunk and hands it to every live reader.
    ///
    /// Returns the new total length. Never waits on a reader: one whose queue
    /// is full is dropped and told it lagged.
    pub fn append(&self, text: &str) -> ResumerResult<usize> {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return Err(ResumerError::SessionClosed {
                conversation_id: self.conversation_id,
            });
        }
        let added = ChunkLog::measure(text);
        if state.log.total_len() + added > self.limits.max_chars {
            return Err(ResumerError::SessionTooLarge {
                conversation_id: self.conversation_id,
                limit: self.limits.max_chars,
            });
        }
        state.last_activity = Instant::now();
        let Some(chunk) = state.log.push(text) else {
            return Ok(state.log.total_len());
        };

        let conversation_id = self.conversation_id;
        state.subscribers.retain(|id, sub| {
            match sub.tx.try_send(chunk.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.lagged.store(true, Ordering::Release);
                    warn!(
                        conversation_id = %conversation_id,
                        subscriber = id,
                        "Dropping replay reader that fell behind"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        Ok(state.log.total_len())
    }

    /// Moves the session to a terminal state. Returns `false` if it already
    /// was terminal.
    pub fn finish(&self, status: RecordingStatus) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.completed_at = Some(Utc::now());
        state.terminal_at = Some(Instant::now());
        let readers = state.subscribers.len();
        // Dropping the senders ends every live tail once its queue drains.
        state.subscribers.clear();
        info!(
            conversation_id = %self.conversation_id,
            session_id = %self.id,
            status = %status,
            length = state.log.total_len(),
            readers,
            "Recording finished"
        );
        true
    }

    pub(crate) fn attach(&self, from: usize) -> ResumerResult<Attachment> {
        let mut state = self.state.lock();
        let available = state.log.total_len();
        if from > available {
            return Err(ResumerError::InvalidPosition {
                requested: from,
                available,
            });
        }
        let backlog = state.log.suffix_from(from);
        if state.status.is_terminal() {
            return Ok(Attachment {
                backlog,
                live: None,
            });
        }
        if state.subscribers.len() >= self.limits.max_subscribers {
            return Err(ResumerError::SubscriberLimit {
                max_subscribers: self.limits.max_subscribers,
            });
        }
        let (tx, rx) = mpsc::channel(self.limits.queue_capacity);
        let lagged = Arc::new(AtomicBool::new(false));
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(
            id,
            Subscriber {
                tx,
                lagged: Arc::clone(&lagged),
            },
        );
        debug!(conversation_id = %self.conversation_id, subscriber = id, from, "Reader attached");
        Ok(Attachment {
            backlog,
            live: Some(LiveTail { id, rx, lagged }),
        })
    }

    pub(crate) fn detach(&self, subscriber: u64) {
        if self.state.lock().subscribers.remove(&subscriber).is_some() {
            debug!(conversation_id = %self.conversation_id, subscriber, "Reader detached");
        }
    }

    /// How long a still-recording session has gone without an append.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        let state = self.state.lock();
        if state.status.is_terminal() {
            return None;
        }
        Some(now.saturating_duration_since(state.last_activity))
    }

    /// How long ago the session reached its terminal state.
    pub fn terminal_for(&self, now: Instant) -> Option<Duration> {
        self.state
            .lock()
            .terminal_at
            .map(|at| now.saturating_duration_since(at))
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("id", &self.id)
            .field("conversation_id", &self.conversation_id)
            .field("status", &self.status())
            .field("total_len", &self.total_len())
            .finish()
    }
}
