//! services/api/src/web/chat_task.rs
//!
//! This module contains the chat orchestration for one connection: text, voice and
//! image submissions, the single in-flight request, and switching between chats.

use crate::{
    capture::AudioRecording,
    web::{
        protocol::{Outbox, ServerMessage},
        state::{AppState, ConnectionState},
    },
};
use std::sync::Arc;
use std::time::Instant;
use study_companion_core::{
    domain::{Message, MultimodalQuery, IMAGE_MESSAGE_PLACEHOLDER, VOICE_MESSAGE_PLACEHOLDER},
    media::DataUri,
    ports::PortResult,
    session::ChatSession,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

//=========================================================================================
// Loading Chats
//=========================================================================================

/// Fetches a chat's stored transcript and wraps it in a fresh session.
pub async fn open_chat(app_state: &AppState, chat_id: &str) -> PortResult<ChatSession> {
    let history = app_state.history.load_history(chat_id).await?;
    info!("Loaded chat '{}' with {} stored messages.", chat_id, history.len());
    Ok(ChatSession::new(chat_id, history))
}

/// Makes `chat_id` the active chat of this connection.
///
/// Any pending response belongs to the old session and will be dropped when it
/// arrives. An unfinished voice recording is thrown away.
pub async fn switch_chat(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    chat_id: &str,
) {
    // The history lookup happens before taking the connection lock.
    let session = match open_chat(app_state, chat_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to load chat '{}': {}", chat_id, e);
            let _ = outbox.send(ServerMessage::Error {
                message: format!("Could not load chat '{}'.", chat_id),
            });
            return;
        }
    };

    let mut state = conn.lock().await;
    if let Some(recording) = state.recording.take() {
        info!("Discarding voice recording on chat switch.");
        recording.discard();
        let _ = outbox.send(ServerMessage::RecordingChanged { recording: false });
    }

    state.session = session;
    let _ = outbox.send(ServerMessage::session_loaded(
        chat_id,
        state.session.visible_messages(),
    ));
    let _ = outbox.send(ServerMessage::AwaitingResponse { awaiting: false });
}

//=========================================================================================
// Submissions
//=========================================================================================

/// Submits a typed question. Returns the handle of the spawned completion, or
/// `None` when nothing was sent (blank input or a response already pending).
pub async fn submit_text(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    text: &str,
) -> Option<JoinHandle<()>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut state = conn.lock().await;
    if state.session.is_awaiting_response() {
        info!("Ignoring text submission: a response is already pending.");
        return None;
    }

    Some(dispatch_query(
        app_state,
        conn,
        outbox,
        &mut state,
        Message::user(text),
        MultimodalQuery::text(text),
    ))
}

/// Submits an image, optionally with a typed question about it.
///
/// `data` must be an `image/*` data URI. Returns `None` when nothing was sent.
pub async fn submit_image(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    data: &str,
    text: Option<&str>,
) -> Option<JoinHandle<()>> {
    let data = data.trim();
    match DataUri::parse(data) {
        Ok(uri) if uri.mime_type().starts_with("image/") && !uri.payload().is_empty() => {}
        Ok(uri) => {
            warn!("Rejecting image submission with type '{}'.", uri.mime_type());
            let _ = outbox.send(ServerMessage::failure(
                "Image Error",
                "Only image files can be sent.",
            ));
            return None;
        }
        Err(e) => {
            warn!("Rejecting image submission: {}", e);
            let _ = outbox.send(ServerMessage::failure(
                "Image Error",
                "The image could not be read.",
            ));
            return None;
        }
    }

    let mut state = conn.lock().await;
    if state.session.is_awaiting_response() {
        info!("Ignoring image submission: a response is already pending.");
        return None;
    }

    let text = text.map(str::trim).filter(|t| !t.is_empty());
    let user_message = Message::user(text.unwrap_or(IMAGE_MESSAGE_PLACEHOLDER));
    let query = MultimodalQuery {
        text_query: text.map(str::to_string),
        ..MultimodalQuery::image(data)
    };
    Some(dispatch_query(
        app_state,
        conn,
        outbox,
        &mut state,
        user_message,
        query,
    ))
}

/// Starts a voice recording, or stops the running one and submits it.
pub async fn toggle_voice(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    sample_rate: Option<u32>,
) -> Option<JoinHandle<()>> {
    let mut guard = conn.lock().await;
    let state = &mut *guard;

    if let Some(recording) = state.recording.take() {
        let _ = outbox.send(ServerMessage::RecordingChanged { recording: false });
        return stop_recording(app_state, conn, outbox, state, recording);
    }

    if state.session.is_awaiting_response() {
        info!("Ignoring voice toggle: a response is already pending.");
        return None;
    }

    match state.devices.acquire_audio_stream().await {
        Ok(stream) => {
            let rate = sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(app_state.config.default_sample_rate);
            state.recording = Some(AudioRecording::start(
                stream,
                rate,
                app_state.config.max_recording,
            ));
            info!("Voice recording started.");
            let _ = outbox.send(ServerMessage::RecordingChanged { recording: true });
        }
        Err(e) => {
            warn!("Could not start voice recording: {}", e);
            let _ = outbox.send(ServerMessage::failure(
                "Microphone Error",
                "Could not access microphone.",
            ));
        }
    }
    None
}

fn stop_recording(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    state: &mut ConnectionState,
    recording: AudioRecording,
) -> Option<JoinHandle<()>> {
    if state.session.is_awaiting_response() {
        info!("Discarding voice recording: a response is already pending.");
        recording.discard();
        return None;
    }
    if recording.is_empty() {
        info!("Voice recording captured no audio; nothing to send.");
        recording.discard();
        return None;
    }

    let recorded_bytes = recording.byte_len();
    let voice_data_uri = match recording.finish() {
        Ok(uri) => uri,
        Err(e) => {
            error!("Failed to package voice recording: {}", e);
            let _ = outbox.send(ServerMessage::failure(
                "Voice Error",
                "Could not process the recording.",
            ));
            return None;
        }
    };
    info!("Voice recording stopped ({} bytes of PCM).", recorded_bytes);

    Some(dispatch_query(
        app_state,
        conn,
        outbox,
        state,
        Message::user(VOICE_MESSAGE_PLACEHOLDER),
        MultimodalQuery::voice(voice_data_uri),
    ))
}

/// Buffers one binary audio frame into the running recording, if any.
///
/// A recording that reaches its length limit is stopped and submitted as if the
/// user had pressed the button.
pub async fn push_audio_chunk(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    chunk: &[u8],
) -> Option<JoinHandle<()>> {
    let mut guard = conn.lock().await;
    let state = &mut *guard;

    let full = match state.recording.as_mut() {
        Some(recording) => recording.push_chunk(chunk),
        None => {
            warn!("Received audio while not recording; dropping {} bytes.", chunk.len());
            return None;
        }
    };
    if !full {
        return None;
    }

    let recording = state.recording.take()?;
    info!("Voice recording hit its length limit; stopping it.");
    let _ = outbox.send(ServerMessage::RecordingChanged { recording: false });
    let _ = outbox.send(ServerMessage::notification(
        "Recording Limit",
        format!(
            "Recordings are limited to {} seconds, so this one was sent as is.",
            app_state.config.max_recording.as_secs()
        ),
    ));
    stop_recording(app_state, conn, outbox, state, recording)
}

//=========================================================================================
// The Request Cycle
//=========================================================================================

/// Appends the user's message, raises the in-flight flag and spawns the model call.
///
/// Must be called with the connection lock held and no response pending.
fn dispatch_query(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    state: &mut ConnectionState,
    user_message: Message,
    query: MultimodalQuery,
) -> JoinHandle<()> {
    let chat_id = state.session.chat_id().to_string();
    let appended = state.session.append(user_message);
    let _ = outbox.send(ServerMessage::message_appended(&chat_id, appended));

    state.session.set_awaiting_response(true);
    let _ = outbox.send(ServerMessage::AwaitingResponse { awaiting: true });

    tokio::spawn(complete_query(
        app_state.clone(),
        conn.clone(),
        outbox.clone(),
        state.session.instance_id(),
        query,
    ))
}

async fn complete_query(
    app_state: Arc<AppState>,
    conn: Arc<Mutex<ConnectionState>>,
    outbox: Outbox,
    instance_id: Uuid,
    query: MultimodalQuery,
) {
    let start_time = Instant::now();
    let result = app_state.query_adapter.process_multimodal_query(&query).await;
    info!("⏱️ Multimodal query took: {:?}", start_time.elapsed());

    let mut state = conn.lock().await;
    if state.session.instance_id() != instance_id {
        warn!("Chat changed while a response was pending; dropping the response.");
        return;
    }

    let chat_id = state.session.chat_id().to_string();
    match result {
        Ok(answer) => {
            let appended = state.session.append(Message::from_answer(answer));
            if appended.is_renderable() {
                let _ = outbox.send(ServerMessage::message_appended(&chat_id, appended));
            } else {
                warn!("Model returned an empty response; nothing to show.");
            }
        }
        Err(e) => {
            error!("Multimodal query failed: {}", e);
            let _ = outbox.send(ServerMessage::failure(
                "AI Error",
                "The assistant could not answer right now. Please try again.",
            ));
        }
    }

    state.session.set_awaiting_response(false);
    let _ = outbox.send(ServerMessage::AwaitingResponse { awaiting: false });
}
