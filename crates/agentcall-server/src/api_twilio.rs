//! Webhooks Twilio calls back into.

use crate::AppState;
use agentcall_voice::twilio::{connect_twiml, MediaStreamMessage};
use agentcall_voice::MediaStreamHub;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Form,
    },
    http::{header, StatusCode},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

/// Handler for `POST /voice`: TwiML that streams the answered call's audio
/// to `/media-stream`.
pub async fn voice_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/xml")],
        connect_twiml(&state.public_url),
    )
}

/// Fields of a Twilio status callback. Twilio sends many more.
#[derive(Debug, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

/// Handler for `POST /status`.
pub async fn status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(callback): Form<StatusCallback>,
) -> StatusCode {
    match state
        .media
        .record_status(&callback.call_sid, &callback.call_status)
    {
        Some(status) => tracing::debug!(
            call_sid = %callback.call_sid,
            twilio_status = %callback.call_status,
            %status,
            "status callback"
        ),
        None => tracing::debug!(
            call_sid = %callback.call_sid,
            twilio_status = %callback.call_status,
            "ignoring final status for untracked call"
        ),
    }
    StatusCode::OK
}

/// Handler for `GET /media-stream`.
pub async fn media_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.media.clone();
    ws.on_upgrade(move |socket| handle_media_stream(socket, hub))
}

/// Bridges one Media Streams socket to the hub until Twilio stops the stream
/// or the socket closes.
async fn handle_media_stream(socket: WebSocket, hub: MediaStreamHub) {
    let (sender, mut receiver) = socket.split();
    let mut sender = Some(sender);
    let mut session = None;
    let mut send_task = None;

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let message = match serde_json::from_str::<MediaStreamMessage>(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse media stream message");
                continue;
            }
        };

        match message {
            MediaStreamMessage::Start { stream_sid, start } => {
                let mut attached = hub.attach(&start.call_sid, &stream_sid);
                if let (Some(mut outbound), Some(mut sender)) =
                    (attached.take_outbound(), sender.take())
                {
                    send_task = Some(tokio::spawn(async move {
                        while let Some(message) = outbound.next_message().await {
                            if sender.send(Message::Text(message.into())).await.is_err() {
                                break;
                            }
                        }
                    }));
                }
                session = Some(attached);
            }
            MediaStreamMessage::Media { media } => {
                let Some(session) = &session else { continue };
                if media.track.as_deref().is_some_and(|track| track != "inbound") {
                    continue;
                }
                if let Err(e) = session.push_inbound_payload(&media.payload) {
                    tracing::debug!(call_sid = %session.call_sid(), error = %e, "dropping inbound media");
                }
            }
            MediaStreamMessage::Stop {} => break,
            MediaStreamMessage::Connected {} | MediaStreamMessage::Other => {}
        }
    }

    // Detaches the stream and ends the call's inbound audio.
    drop(session);
    if let Some(task) = send_task {
        task.abort();
    }
}
