use axum::extract::ws::{close_code, CloseFrame, Message};
use resumer_core::{RecordingStatus, ResumerError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Close code for a recording that does not exist (or was evicted).
pub const CLOSE_NOT_FOUND: u16 = 4404;
/// Close code for a resume position past the recorded length or a
/// malformed client frame.
pub const CLOSE_BAD_REQUEST: u16 = 4400;
/// Close code for a reader dropped for falling behind, and for a second
/// producer on a conversation that is already recording.
pub const CLOSE_CONFLICT: u16 = 4409;
/// Close code for too many readers on one recording.
pub const CLOSE_TOO_MANY_READERS: u16 = 4429;
/// Close code when recording is switched off.
pub const CLOSE_DISABLED: u16 = 4503;
/// Close code for anything else that went wrong server-side.
pub const CLOSE_INTERNAL: u16 = 4500;

const MAX_CLOSE_REASON: usize = 123;

/// Frames the gateway sends to WebSocket clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    Chunk { offset: usize, data: &'a str },
    End { status: RecordingStatus },
    CancelRequested,
    Recorded { status: RecordingStatus, offset: usize },
    Error { message: String },
}

impl ServerFrame<'_> {
    pub fn to_message(&self) -> Message {
        // Serializing these variants cannot fail.
        let text = serde_json::to_string(self).unwrap_or_default();
        Message::Text(text.into())
    }
}

/// First frame of a chat connection.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
}

/// Frames a producer sends on the record socket. The first one must carry
/// the conversation id.
#[derive(Debug, Default, Deserialize)]
pub struct RecordFrame {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub complete: bool,
}

/// Control frame a reader may send while a reply streams.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    Cancel,
}

pub fn close_code_for(error: &ResumerError) -> u16 {
    match error {
        ResumerError::ResumeNotFound { .. } | ResumerError::NotRecording { .. } => CLOSE_NOT_FOUND,
        ResumerError::InvalidPosition { .. } => CLOSE_BAD_REQUEST,
        ResumerError::SubscriberLagged { .. } | ResumerError::Conflict { .. } => CLOSE_CONFLICT,
        ResumerError::SubscriberLimit { .. } => CLOSE_TOO_MANY_READERS,
        ResumerError::Disabled => CLOSE_DISABLED,
        _ => CLOSE_INTERNAL,
    }
}

/// Close frame describing `error`. A lagged reader gets the offset it
/// should resume from as the reason.
pub fn close_for(error: &ResumerError) -> Message {
    let reason = match error {
        ResumerError::SubscriberLagged { position } => position.to_string(),
        other => truncate_reason(other.to_string()),
    };
    close_with(close_code_for(error), reason)
}

/// Close frame for a client frame that could not be understood.
pub fn close_bad_request(reason: impl Into<String>) -> Message {
    close_with(CLOSE_BAD_REQUEST, truncate_reason(reason.into()))
}

pub fn close_normal() -> Message {
    close_with(close_code::NORMAL, String::new())
}

fn close_with(code: u16, reason: String) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut cut = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }
    reason
}
