//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::{
    capture::{AudioRecording, VideoFeed},
    config::Config,
    web::engagement_task::EngagementMonitor,
};
use study_companion_core::{
    ports::{
        ChatHistoryService, ContextualResponseService, EngagementDetectionService, MediaDevices,
        QueryAnsweringService,
    },
    session::ChatSession,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub history: Arc<dyn ChatHistoryService>,
    pub query_adapter: Arc<dyn QueryAnsweringService>,
    pub engagement_adapter: Arc<dyn EngagementDetectionService>,
    pub contextual_adapter: Arc<dyn ContextualResponseService>,
}

//=========================================================================================
// ConnectionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection.
pub struct ConnectionState {
    /// The transcript of the active chat and its in-flight flag.
    pub session: ChatSession,
    pub devices: Arc<dyn MediaDevices>,
    /// The microphone recording, present only while the user is recording.
    pub recording: Option<AudioRecording>,
    pub video_feed: VideoFeed,
    pub monitor: EngagementMonitor,
    pub learning_module: String,
}

impl ConnectionState {
    pub fn new(
        session: ChatSession,
        devices: Arc<dyn MediaDevices>,
        learning_module: impl Into<String>,
    ) -> Self {
        Self {
            session,
            devices,
            recording: None,
            video_feed: VideoFeed::new(),
            monitor: EngagementMonitor::new(),
            learning_module: learning_module.into(),
        }
    }

    /// Stops everything that holds hardware: the monitor's camera and any recording.
    pub async fn shutdown(&mut self) {
        self.monitor.disable(&self.video_feed).await;
        if let Some(recording) = self.recording.take() {
            recording.discard();
        }
    }
}
