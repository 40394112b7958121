//! Reader-side WebSocket endpoints.
//!
//! Both the resume and the chat connection end up in [`pump_replay`], which
//! forwards a [`Replay`] to the socket while watching the socket for a
//! disconnect or a cancel request. Leaving the socket only detaches the
//! reader; the recording carries on.

use crate::frames::{
    close_bad_request, close_for, close_normal, ChatRequest, ClientControl, ServerFrame,
};
use crate::generator::TokenStream;
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use resumer_core::{Entry, RecordingStatus, ResumerError, ResumerResult};
use resumer_session::{Replay, ReplayEvent, SessionHandle};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ResumeQuery {
    #[serde(default)]
    pub position: usize,
}

/// `GET /v1/conversations/{id}/resume?position=N`
pub async fn resume_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<ResumeQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // Attach before the handshake so the snapshot reflects the request time.
    let replay = if state.resumer.is_enabled() {
        state.resumer.replay(conversation_id, query.position)
    } else {
        Err(ResumerError::Disabled)
    };
    ws.on_upgrade(move |socket| pump_replay(socket, state, conversation_id, replay))
}

/// `GET /v1/conversations/{id}/chat`
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat(socket, state, conversation_id))
}

async fn handle_chat(mut socket: WebSocket, state: Arc<AppState>, conversation_id: Uuid) {
    let request = match read_chat_request(&mut socket).await {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            let message = format!("Invalid chat request: {e}");
            let _ = socket.send(ServerFrame::Error { message }.to_message()).await;
            let _ = socket.send(close_bad_request("expected {\"content\": ...}")).await;
            return;
        }
        None => return,
    };

    let replay = match begin_reply(&state, conversation_id, &request.content).await {
        Ok(replay) => replay,
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Chat request refused");
            let message = e.to_string();
            let _ = socket.send(ServerFrame::Error { message }.to_message()).await;
            let _ = socket.send(close_for(&e)).await;
            return;
        }
    };
    pump_replay(socket, state, conversation_id, Ok(replay)).await;
}

async fn read_chat_request(
    socket: &mut WebSocket,
) -> Option<Result<ChatRequest, serde_json::Error>> {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str())),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Starts the recording, persists the prompt and launches the producer.
///
/// The producer task is not tied to the socket, so the reply keeps being
/// generated (and stays resumable) if the client goes away.
async fn begin_reply(
    state: &Arc<AppState>,
    conversation_id: Uuid,
    content: &str,
) -> ResumerResult<Replay> {
    let handle = state.resumer.start(conversation_id)?;
    let tokens = match state.generator.generate(conversation_id, content).await {
        Ok(tokens) => tokens,
        Err(e) => {
            // Nothing was produced, so leave no trace a reader could mistake
            // for a finished empty reply.
            state.resumer.recorder().cancel(&handle);
            state
                .resumer
                .registry()
                .remove(conversation_id, handle.session_id());
            return Err(e);
        }
    };
    if let Err(e) = state
        .entries
        .append(Entry::user(content, conversation_id))
        .await
    {
        error!(conversation_id = %conversation_id, error = %e, "Failed to persist prompt");
    }

    let replay = state.resumer.replay(conversation_id, 0)?;
    tokio::spawn(produce(Arc::clone(state), handle, tokens));
    Ok(replay)
}

async fn produce(state: Arc<AppState>, handle: SessionHandle, tokens: TokenStream) {
    let conversation_id = handle.conversation_id();
    let session = Arc::clone(handle.session());
    if let Err(e) = state.resumer.recorder().record_stream(handle, tokens).await {
        warn!(conversation_id = %conversation_id, error = %e, "Reply ended with error");
    }
    if session.status() != RecordingStatus::Completed {
        return;
    }
    let entry = Entry::assistant(session.content(), conversation_id)
        .with_metadata("session_id", serde_json::json!(session.id()));
    match state.entries.append(entry).await {
        Ok(()) => info!(
            conversation_id = %conversation_id,
            length = session.total_len(),
            "Reply persisted"
        ),
        Err(e) => error!(conversation_id = %conversation_id, error = %e, "Failed to persist reply"),
    }
}

/// Streams `replay` to the client until the end marker, an error, or a
/// disconnect.
pub(crate) async fn pump_replay(
    socket: WebSocket,
    state: Arc<AppState>,
    conversation_id: Uuid,
    replay: ResumerResult<Replay>,
) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut replay = match replay {
        Ok(replay) => replay,
        Err(e) => {
            debug!(conversation_id = %conversation_id, error = %e, "Replay refused");
            let _ = ws_sender.send(close_for(&e)).await;
            return;
        }
    };
    info!(
        connection_id = %connection_id,
        conversation_id = %conversation_id,
        position = replay.position(),
        "Reader connected"
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = replay.next_event().await {
            let sent = match event {
                Ok(ReplayEvent::Chunk { offset, data }) => {
                    ws_sender
                        .send(ServerFrame::Chunk { offset, data: &data }.to_message())
                        .await
                }
                Ok(ReplayEvent::End(status)) => {
                    let _ = ws_sender
                        .send(ServerFrame::End { status }.to_message())
                        .await;
                    let _ = ws_sender.send(close_normal()).await;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Replay interrupted");
                    let _ = ws_sender.send(close_for(&e)).await;
                    break;
                }
            };
            if sent.is_err() {
                break;
            }
        }
    });

    let resumer = Arc::clone(&state.resumer);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientControl>(text.as_str()) {
                    Ok(ClientControl::Cancel) => {
                        if let Err(e) = resumer.request_cancel(conversation_id) {
                            debug!(conversation_id = %conversation_id, error = %e, "Cancel ignored");
                        }
                    }
                    Err(_) => debug!("Ignoring unrecognised client frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(connection_id = %connection_id, conversation_id = %conversation_id, "Reader disconnected");
}
