use crate::config::MissingSessionPolicy;
use crate::registry::SessionRegistry;
use resumer_core::{ResumerError, ResumerResult};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Lets any caller ask the producer of a conversation to stop.
///
/// Only the flag is set here; the producer observes it and performs the
/// terminal transition itself.
#[derive(Clone)]
pub struct CancellationController {
    registry: Arc<SessionRegistry>,
    policy: MissingSessionPolicy,
}

impl CancellationController {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let policy = registry.config().on_cancel_missing;
        Self { registry, policy }
    }

    pub fn with_policy(mut self, policy: MissingSessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MissingSessionPolicy {
        self.policy
    }

    /// Flags the current recording of `conversation_id` for cancellation.
    ///
    /// Repeated requests are accepted. With no recording in progress the
    /// result depends on the configured policy.
    pub fn request_cancel(&self, conversation_id: Uuid) -> ResumerResult<()> {
        match self.registry.get_recording(conversation_id) {
            Some(session) => {
                session.request_cancel();
                Ok(())
            }
            None => match self.policy {
                MissingSessionPolicy::Error => {
                    Err(ResumerError::NotRecording { conversation_id })
                }
                MissingSessionPolicy::Ignore => {
                    debug!(conversation_id = %conversation_id, "Ignored cancel without recording");
                    Ok(())
                }
            },
        }
    }
}
