use crate::cancel::CancellationController;
use crate::config::ResumerConfig;
use crate::recorder::{Recorder, SessionHandle};
use crate::registry::SessionRegistry;
use crate::replay::{Replay, Replayer};
use crate::sweeper::{RetentionSweeper, SweeperHandle};
use resumer_core::{RecordingProbe, ResumerResult};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a transport adapter needs, behind one shareable value.
pub struct ResponseResumer {
    registry: Arc<SessionRegistry>,
    recorder: Recorder,
    replayer: Replayer,
    cancellation: CancellationController,
}

impl ResponseResumer {
    pub fn new(config: ResumerConfig) -> ResumerResult<Arc<Self>> {
        config.validate()?;
        let registry = SessionRegistry::new(config);
        Ok(Arc::new(Self {
            recorder: Recorder::new(Arc::clone(&registry)),
            replayer: Replayer::new(Arc::clone(&registry)),
            cancellation: CancellationController::new(Arc::clone(&registry)),
            registry,
        }))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn replayer(&self) -> &Replayer {
        &self.replayer
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    pub fn start(&self, conversation_id: Uuid) -> ResumerResult<SessionHandle> {
        self.recorder.start(conversation_id)
    }

    pub fn replay(&self, conversation_id: Uuid, from: usize) -> ResumerResult<Replay> {
        self.replayer.replay(conversation_id, from)
    }

    pub fn request_cancel(&self, conversation_id: Uuid) -> ResumerResult<()> {
        self.cancellation.request_cancel(conversation_id)
    }

    pub fn check_recordings(&self, conversation_ids: &[Uuid]) -> HashMap<Uuid, RecordingProbe> {
        self.registry.check_recordings(conversation_ids)
    }

    pub fn has_response_in_progress(&self, conversation_id: Uuid) -> bool {
        self.registry.has_response_in_progress(conversation_id)
    }

    /// Spawns the retention sweeper for this engine.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        RetentionSweeper::new(Arc::clone(&self.registry)).spawn()
    }
}
