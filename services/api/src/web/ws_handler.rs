//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a chat WebSocket connection.
//! It owns the connection's state and delegates work to the chat and engagement tasks.

use crate::{
    adapters::ClientMediaDevices,
    web::{
        chat_task::{push_audio_chunk, submit_image, submit_text, switch_chat, toggle_voice},
        engagement_task::{present_video_frame, set_engagement_detection},
        protocol::{ClientMessage, Outbox, ServerMessage},
        state::{AppState, ConnectionState},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use study_companion_core::{domain::NEW_CHAT_ID, session::ChatSession};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");

    // Every task writes through the outbox; a single writer owns the sink.
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to send message; client may have disconnected.");
                break;
            }
        }
    });

    // --- 1. Initialization Phase ---
    let chat_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
                Ok(ClientMessage::Init { chat_id }) => chat_id,
                _ => {
                    error!("First message was not a valid Init message.");
                    let _ = outbox.send(ServerMessage::Error {
                        message: "Expected an init message.".to_string(),
                    });
                    drop(outbox);
                    let _ = writer.await;
                    return;
                }
            }
        }
        _ => {
            error!("Client disconnected before sending Init message.");
            writer.abort();
            return;
        }
    };

    info!("Initializing connection with chat '{}'.", chat_id);
    let devices = Arc::new(ClientMediaDevices::new());
    let conn = Arc::new(Mutex::new(ConnectionState::new(
        ChatSession::new(NEW_CHAT_ID, Vec::new()),
        devices.clone(),
        app_state.config.default_learning_module.clone(),
    )));
    switch_chat(&app_state, &conn, &outbox, &chat_id).await;

    // --- 2. Main Message Loop ---
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(text.as_str(), &app_state, &conn, &devices, &outbox).await;
            }
            Some(Ok(Message::Binary(data))) => {
                let _ = push_audio_chunk(&app_state, &conn, &outbox, &data).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    conn.lock().await.shutdown().await;
    writer.abort();
    info!("WebSocket connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    devices: &ClientMediaDevices,
    outbox: &Outbox,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let _ = outbox.send(ServerMessage::Error {
                message: "Unrecognized message.".to_string(),
            });
            return;
        }
    };

    match client_msg {
        ClientMessage::Init { .. } => {
            warn!("Received a second Init message; use switch_chat instead.");
        }
        ClientMessage::SwitchChat { chat_id } => {
            switch_chat(app_state, conn, outbox, &chat_id).await;
        }
        ClientMessage::SendText { text } => {
            // The completion runs detached; its result reaches the client through the outbox.
            let _ = submit_text(app_state, conn, outbox, &text).await;
        }
        ClientMessage::SendImage { data, text } => {
            let _ = submit_image(app_state, conn, outbox, &data, text.as_deref()).await;
        }
        ClientMessage::ToggleVoice { sample_rate } => {
            let _ = toggle_voice(app_state, conn, outbox, sample_rate).await;
        }
        ClientMessage::DevicePermissions { microphone, camera } => {
            devices.set_permissions(microphone, camera);
            revoke_released_devices(app_state, conn, outbox, microphone, camera).await;
        }
        ClientMessage::SetEngagementDetection {
            enabled,
            learning_module,
        } => {
            set_engagement_detection(app_state, conn, outbox, enabled, learning_module).await;
        }
        ClientMessage::VideoFrame { data } => present_video_frame(conn, &data).await,
    }
}

/// Stops whatever was using a device the user just revoked.
async fn revoke_released_devices(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    microphone: bool,
    camera: bool,
) {
    let monitor_running = {
        let mut state = conn.lock().await;
        if !microphone {
            if let Some(recording) = state.recording.take() {
                info!("Microphone revoked; discarding the active recording.");
                recording.discard();
                let _ = outbox.send(ServerMessage::RecordingChanged { recording: false });
            }
        }
        state.monitor.is_enabled()
    };

    if !camera && monitor_running {
        info!("Camera revoked; disabling engagement detection.");
        set_engagement_detection(app_state, conn, outbox, false, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        drain, test_app_state, FakeDetector, FakeMediaDevices, FakeQueryService,
    };
    use study_companion_core::media::MediaKind;

    fn connection(devices: Arc<FakeMediaDevices>) -> Arc<Mutex<ConnectionState>> {
        Arc::new(Mutex::new(ConnectionState::new(
            ChatSession::new("1", Vec::new()),
            devices,
            "Biology",
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn revoking_both_devices_stops_monitor_and_recording() {
        let app_state = test_app_state(
            Arc::new(FakeQueryService::new()),
            Arc::new(FakeDetector::new()),
        );
        let devices = Arc::new(FakeMediaDevices::granted());
        let conn = connection(devices.clone());
        let (outbox, mut rx) = mpsc::unbounded_channel();

        set_engagement_detection(&app_state, &conn, &outbox, true, None).await;
        toggle_voice(&app_state, &conn, &outbox, None).await;
        assert!(conn.lock().await.monitor.is_enabled());
        assert!(conn.lock().await.recording.is_some());
        drain(&mut rx);

        revoke_released_devices(&app_state, &conn, &outbox, false, false).await;

        let state = conn.lock().await;
        assert!(!state.monitor.is_enabled());
        assert!(state.recording.is_none());
        drop(state);
        assert_eq!(devices.live_tracks(MediaKind::Video), 0);
        assert_eq!(devices.live_tracks(MediaKind::Audio), 0);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerMessage::RecordingChanged { recording: false })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerMessage::EngagementDetectionChanged { enabled: false })));
    }

    #[tokio::test(start_paused = true)]
    async fn keeping_permissions_leaves_devices_running() {
        let app_state = test_app_state(
            Arc::new(FakeQueryService::new()),
            Arc::new(FakeDetector::new()),
        );
        let devices = Arc::new(FakeMediaDevices::granted());
        let conn = connection(devices.clone());
        let (outbox, mut rx) = mpsc::unbounded_channel();

        set_engagement_detection(&app_state, &conn, &outbox, true, None).await;
        toggle_voice(&app_state, &conn, &outbox, None).await;
        drain(&mut rx);

        revoke_released_devices(&app_state, &conn, &outbox, true, true).await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(devices.live_tracks(MediaKind::Video), 1);
        assert_eq!(devices.live_tracks(MediaKind::Audio), 1);

        conn.lock().await.shutdown().await;
        assert_eq!(devices.live_tracks(MediaKind::Video), 0);
        assert_eq!(devices.live_tracks(MediaKind::Audio), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn revoking_only_the_camera_keeps_the_recording() {
        let app_state = test_app_state(
            Arc::new(FakeQueryService::new()),
            Arc::new(FakeDetector::new()),
        );
        let devices = Arc::new(FakeMediaDevices::granted());
        let conn = connection(devices.clone());
        let (outbox, _rx) = mpsc::unbounded_channel();

        set_engagement_detection(&app_state, &conn, &outbox, true, None).await;
        toggle_voice(&app_state, &conn, &outbox, None).await;

        revoke_released_devices(&app_state, &conn, &outbox, true, false).await;

        let state = conn.lock().await;
        assert!(!state.monitor.is_enabled());
        assert!(state.recording.is_some());
        assert_eq!(devices.live_tracks(MediaKind::Audio), 1);
    }
}
