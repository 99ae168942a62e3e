//! crates/study_companion_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted model, the chat history source and the
//! capture hardware.

use async_trait::async_trait;

use crate::domain::{
    ChatSummary, ContextualAnswer, ContextualQuery, DisengagementCheck, DisengagementReport,
    Message, MultimodalAnswer, MultimodalQuery,
};
use crate::media::{MediaKind, MediaStream};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (network, model, devices).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Permission denied for the {0}")]
    PermissionDenied(MediaKind),
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Inference Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait QueryAnsweringService: Send + Sync {
    /// Answers a student query given as text, voice, image or any mix of them.
    async fn process_multimodal_query(&self, query: &MultimodalQuery)
        -> PortResult<MultimodalAnswer>;
}

#[async_trait]
pub trait EngagementDetectionService: Send + Sync {
    /// Estimates from a face image whether the student has lost interest.
    async fn detect_student_disengagement(
        &self,
        check: &DisengagementCheck,
    ) -> PortResult<DisengagementReport>;
}

#[async_trait]
pub trait ContextualResponseService: Send + Sync {
    async fn provide_contextual_response(
        &self,
        query: &ContextualQuery,
    ) -> PortResult<ContextualAnswer>;
}

//=========================================================================================
// Chat History and Device Ports
//=========================================================================================

#[async_trait]
pub trait ChatHistoryService: Send + Sync {
    async fn list_chats(&self) -> PortResult<Vec<ChatSummary>>;

    /// Loads the transcript of a chat. Unknown chats load as empty.
    async fn load_history(&self, chat_id: &str) -> PortResult<Vec<Message>>;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens the microphone. Fails with `PermissionDenied` without holding any track.
    async fn acquire_audio_stream(&self) -> PortResult<MediaStream>;

    /// Opens the camera. Fails with `PermissionDenied` without holding any track.
    async fn acquire_video_stream(&self) -> PortResult<MediaStream>;
}
