use crate::config::{ConflictPolicy, ResumerConfig};
use crate::session::{RecordingSession, SessionLimits};
use parking_lot::RwLock;
use resumer_core::{RecordingProbe, RecordingStatus, ResumerError, ResumerResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Counts reported by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Recordings force-cancelled for inactivity.
    pub abandoned: usize,
    /// Terminal sessions removed after their retention period.
    pub evicted: usize,
}

/// Process-wide map from conversation id to its current session.
///
/// The registry is the only place sessions are created or removed, which is
/// what makes the one-writer-per-conversation rule enforceable.
pub struct SessionRegistry {
    config: ResumerConfig,
    sessions: RwLock<HashMap<Uuid, Arc<RecordingSession>>>,
}

impl SessionRegistry {
    pub fn new(config: ResumerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ResumerConfig {
        &self.config
    }

    /// Whether response recording is active in this deployment.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_chars: self.config.max_session_chars,
            queue_capacity: self.config.subscriber_queue_capacity,
            max_subscribers: self.config.max_subscribers,
        }
    }

    /// Creates a new recording for `conversation_id`.
    ///
    /// A terminal session for the same conversation is replaced. A running
    /// one is either a conflict or is cancelled first, per `on_conflict`.
    pub fn start(&self, conversation_id: Uuid) -> ResumerResult<Arc<RecordingSession>> {
        if !self.is_enabled() {
            return Err(ResumerError::Disabled);
        }
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(&conversation_id) {
            if existing.status() == RecordingStatus::Recording {
                match self.config.on_conflict {
                    ConflictPolicy::Reject => {
                        warn!(conversation_id = %conversation_id, "Rejected concurrent recording");
                        return Err(ResumerError::Conflict { conversation_id });
                    }
                    ConflictPolicy::Replace => {
                        existing.request_cancel();
                        existing.finish(RecordingStatus::Cancelled);
                        info!(
                            conversation_id = %conversation_id,
                            replaced = %existing.id(),
                            "Replacing in-flight recording"
                        );
                    }
                }
            }
        }
        let session = Arc::new(RecordingSession::new(conversation_id, self.limits()));
        sessions.insert(conversation_id, Arc::clone(&session));
        info!(
            conversation_id = %conversation_id,
            session_id = %session.id(),
            "Recording started"
        );
        Ok(session)
    }

    /// The current session for a conversation, running or terminal.
    pub fn get(&self, conversation_id: Uuid) -> Option<Arc<RecordingSession>> {
        if !self.is_enabled() {
            return None;
        }
        self.sessions.read().get(&conversation_id).cloned()
    }

    /// The session for a conversation only if it is still recording.
    pub fn get_recording(&self, conversation_id: Uuid) -> Option<Arc<RecordingSession>> {
        self.get(conversation_id)
            .filter(|s| s.status() == RecordingStatus::Recording)
    }

    pub fn has_response_in_progress(&self, conversation_id: Uuid) -> bool {
        self.get_recording(conversation_id).is_some()
    }

    /// Non-consuming status probe. Unknown ids report nothing recorded.
    pub fn check_recordings(&self, conversation_ids: &[Uuid]) -> HashMap<Uuid, RecordingProbe> {
        if !self.is_enabled() {
            return conversation_ids
                .iter()
                .map(|id| (*id, RecordingProbe::default()))
                .collect();
        }
        let sessions = self.sessions.read();
        conversation_ids
            .iter()
            .map(|id| {
                let probe = sessions
                    .get(id)
                    .map(|s| s.probe())
                    .unwrap_or_default();
                (*id, probe)
            })
            .collect()
    }

    /// Removes the session for `conversation_id` if it is still `session_id`.
    pub fn remove(&self, conversation_id: Uuid, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(&conversation_id) {
            Some(current) if current.id() == session_id => {
                sessions.remove(&conversation_id);
                true
            }
            _ => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Force-cancels abandoned recordings and evicts expired terminal ones.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let idle_timeout = self.config.idle_timeout();
        let retention = self.config.retention();
        let mut report = SweepReport::default();

        let mut sessions = self.sessions.write();
        for session in sessions.values() {
            if let Some(idle) = session.idle_for(now) {
                if idle < idle_timeout {
                    continue;
                }
                // Raise the flag first so a producer parked on `cancelled()`
                // wakes up instead of waiting on a stalled upstream.
                session.request_cancel();
                if session.finish(RecordingStatus::Cancelled) {
                    warn!(
                        conversation_id = %session.conversation_id(),
                        idle_secs = idle.as_secs(),
                        "Cancelled abandoned recording"
                    );
                    report.abandoned += 1;
                }
            }
        }
        sessions.retain(|conversation_id, session| match session.terminal_for(now) {
            Some(age) if age >= retention => {
                info!(conversation_id = %conversation_id, "Evicted expired recording");
                report.evicted += 1;
                false
            }
            _ => true,
        });
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_conflict_rejected_by_default() {
        let registry = SessionRegistry::new(ResumerConfig::default());
        let id = Uuid::new_v4();
        registry.start(id).unwrap();
        let err = registry.start(id).unwrap_err();
        assert!(matches!(err, ResumerError::Conflict { conversation_id } if conversation_id == id));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_start_replaces_terminal_session() {
        let registry = SessionRegistry::new(ResumerConfig::default());
        let id = Uuid::new_v4();
        let first = registry.start(id).unwrap();
        first.finish(RecordingStatus::Completed);
        let second = registry.start(id).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.get(id).unwrap().id(), second.id());
    }

    #[test]
    fn test_replace_policy_cancels_running_session() {
        let registry = SessionRegistry::new(ResumerConfig {
            on_conflict: ConflictPolicy::Replace,
            ..ResumerConfig::default()
        });
        let id = Uuid::new_v4();
        let first = registry.start(id).unwrap();
        first.append("partial").unwrap();
        let second = registry.start(id).unwrap();
        assert_eq!(first.status(), RecordingStatus::Cancelled);
        assert!(first.is_cancel_requested());
        assert_eq!(second.status(), RecordingStatus::Recording);
        assert_eq!(second.total_len(), 0);
    }

    #[test]
    fn test_disabled_registry() {
        let registry = SessionRegistry::new(ResumerConfig {
            enabled: false,
            ..ResumerConfig::default()
        });
        let id = Uuid::new_v4();
        assert!(!registry.is_enabled());
        assert!(matches!(registry.start(id), Err(ResumerError::Disabled)));
        assert!(!registry.check_recordings(&[id])[&id].recording);
    }

    #[test]
    fn test_check_recordings_reports_all_ids() {
        let registry = SessionRegistry::new(ResumerConfig::default());
        let live = Uuid::new_v4();
        let done = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        registry.start(live).unwrap().append("abc").unwrap();
        let finished = registry.start(done).unwrap();
        finished.append("hello").unwrap();
        finished.finish(RecordingStatus::Completed);

        let probes = registry.check_recordings(&[live, done, unknown]);
        assert_eq!(probes.len(), 3);
        assert_eq!(
            probes[&live],
            RecordingProbe {
                recording: true,
                length: 3
            }
        );
        assert_eq!(
            probes[&done],
            RecordingProbe {
                recording: false,
                length: 5
            }
        );
        assert_eq!(probes[&unknown], RecordingProbe::default());
        assert!(registry.has_response_in_progress(live));
        assert!(!registry.has_response_in_progress(done));
    }

    #[test]
    fn test_remove_only_matching_session() {
        let registry = SessionRegistry::new(ResumerConfig::default());
        let id = Uuid::new_v4();
        let old = registry.start(id).unwrap();
        old.finish(RecordingStatus::Completed);
        let new = registry.start(id).unwrap();
        assert!(!registry.remove(id, old.id()));
        assert!(registry.remove(id, new.id()));
        assert!(registry.get(id).is_none());
    }
}
