use crate::frames::{close_bad_request, close_for, close_normal, RecordFrame, ServerFrame};
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use resumer_core::ResumerResult;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Tokens buffered between the socket and the recorder.
const TOKEN_BUFFER: usize = 64;

/// `GET /v1/responses/record`: an external producer streams its output here.
pub async fn record_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_record(socket, state))
}

enum Flow {
    Continue,
    Complete,
    Stopped,
}

async fn forward(
    frame: RecordFrame,
    tokens: &mpsc::Sender<ResumerResult<String>>,
) -> Flow {
    if let Some(token) = frame.token {
        if tokens.send(Ok(token)).await.is_err() {
            return Flow::Stopped;
        }
    }
    if frame.complete {
        Flow::Complete
    } else {
        Flow::Continue
    }
}

/// Resolves once cancellation is requested, including a request made before
/// `cancel` was subscribed. Returns `false` if the flag can no longer change.
async fn cancel_requested(cancel: &mut watch::Receiver<bool>) -> bool {
    cancel.wait_for(|requested| *requested).await.is_ok()
}

async fn next_frame(socket: &mut WebSocket) -> Option<Result<RecordFrame, serde_json::Error>> {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str())),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn handle_record(mut socket: WebSocket, state: Arc<AppState>) {
    let first = match next_frame(&mut socket).await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            let _ = socket
                .send(close_bad_request(format!("invalid frame: {e}")))
                .await;
            return;
        }
        None => return,
    };
    let Some(conversation_id) = first.conversation_id else {
        let _ = socket
            .send(close_bad_request("first frame needs conversation_id"))
            .await;
        return;
    };

    let handle = match state.resumer.start(conversation_id) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Producer refused");
            let message = e.to_string();
            let _ = socket.send(ServerFrame::Error { message }.to_message()).await;
            let _ = socket.send(close_for(&e)).await;
            return;
        }
    };
    info!(
        conversation_id = %conversation_id,
        session_id = %handle.session_id(),
        "Producer connected"
    );

    let session = Arc::clone(handle.session());
    let mut cancel = session.cancel_watch();
    let (tokens_tx, tokens_rx) = mpsc::channel(TOKEN_BUFFER);
    let recorder = state.resumer.recorder().clone();
    let producer = tokio::spawn(async move {
        recorder
            .record_stream(handle, ReceiverStream::new(tokens_rx))
            .await
    });

    let mut flow = forward(first, &tokens_tx).await;
    let mut disconnected = false;
    let mut watching_cancel = true;
    while matches!(flow, Flow::Continue) {
        tokio::select! {
            requested = cancel_requested(&mut cancel), if watching_cancel => {
                watching_cancel = false;
                if requested {
                    let _ = socket.send(ServerFrame::CancelRequested.to_message()).await;
                    flow = Flow::Stopped;
                }
            }
            frame = next_frame(&mut socket) => match frame {
                Some(Ok(frame)) => flow = forward(frame, &tokens_tx).await,
                Some(Err(e)) => {
                    let message = format!("invalid frame: {e}");
                    let _ = socket.send(ServerFrame::Error { message }.to_message()).await;
                }
                None => {
                    disconnected = true;
                    flow = Flow::Stopped;
                }
            },
        }
    }

    if disconnected {
        // A producer that vanishes without completing is treated as cancelled.
        session.request_cancel();
    }
    drop(tokens_tx);

    let result = match producer.await {
        Ok(result) => result,
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Recorder task failed");
            return;
        }
    };
    if disconnected {
        return;
    }
    match result {
        Ok(outcome) => {
            let frame = ServerFrame::Recorded {
                status: outcome.status,
                offset: outcome.length,
            };
            let _ = socket.send(frame.to_message()).await;
            let _ = socket.send(close_normal()).await;
        }
        Err(e) => {
            let message = e.to_string();
            let _ = socket.send(ServerFrame::Error { message }.to_message()).await;
            let _ = socket.send(close_for(&e)).await;
        }
    }
}
