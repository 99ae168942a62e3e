//! services/api/src/test_support.rs
//!
//! Scripted stand-ins for the model-backed ports and the client's devices.

use crate::{
    adapters::InMemoryHistoryAdapter,
    config::Config,
    web::{
        protocol::{NotificationVariant, ServerMessage},
        state::AppState,
    },
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use study_companion_core::{
    domain::{
        ContextualAnswer, ContextualQuery, DisengagementCheck, DisengagementReport,
        MultimodalAnswer, MultimodalQuery,
    },
    media::{MediaKind, MediaStream, MediaTrack},
    ports::{
        ContextualResponseService, EngagementDetectionService, MediaDevices, PortError,
        PortResult, QueryAnsweringService,
    },
};
use tokio::sync::{mpsc::UnboundedReceiver, Notify};

pub(crate) fn answer(text: &str) -> MultimodalAnswer {
    MultimodalAnswer {
        response: text.to_string(),
        includes_chart: false,
        chart: None,
    }
}

//=========================================================================================
// Query Answering
//=========================================================================================

pub(crate) struct FakeQueryService {
    replies: Mutex<VecDeque<PortResult<MultimodalAnswer>>>,
    queries: Mutex<Vec<MultimodalQuery>>,
    gate: Option<Arc<Notify>>,
}

impl FakeQueryService {
    pub(crate) fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub(crate) fn with_replies(self, replies: Vec<PortResult<MultimodalAnswer>>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    /// Every call waits for one `notify_one` on the returned handle before replying.
    pub(crate) fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn queries(&self) -> Vec<MultimodalQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryAnsweringService for FakeQueryService {
    async fn process_multimodal_query(
        &self,
        query: &MultimodalQuery,
    ) -> PortResult<MultimodalAnswer> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(answer("Here is what I found.")))
    }
}

//=========================================================================================
// Engagement Detection
//=========================================================================================

pub(crate) struct FakeDetector {
    reports: Mutex<VecDeque<PortResult<DisengagementReport>>>,
    checks: Mutex<Vec<DisengagementCheck>>,
    hang: bool,
}

impl FakeDetector {
    pub(crate) fn new() -> Self {
        Self {
            reports: Mutex::new(VecDeque::new()),
            checks: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    pub(crate) fn with_reports(self, reports: Vec<PortResult<DisengagementReport>>) -> Self {
        *self.reports.lock().unwrap() = reports.into();
        self
    }

    /// Calls are recorded but never complete.
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.checks.lock().unwrap().len()
    }

    pub(crate) fn last_module(&self) -> Option<String> {
        self.checks
            .lock()
            .unwrap()
            .last()
            .map(|c| c.learning_module.clone())
    }
}

#[async_trait]
impl EngagementDetectionService for FakeDetector {
    async fn detect_student_disengagement(
        &self,
        check: &DisengagementCheck,
    ) -> PortResult<DisengagementReport> {
        assert!(check.face_data_uri.starts_with("data:image/jpeg;base64,"));
        self.checks.lock().unwrap().push(check.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.reports.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(DisengagementReport {
                is_disengaged: false,
                boredom_level: 10.0,
                suggested_intervention: String::new(),
            })
        })
    }
}

//=========================================================================================
// Contextual Response
//=========================================================================================

pub(crate) struct FakeContextualService {
    reply: Mutex<Option<PortResult<ContextualAnswer>>>,
}

impl FakeContextualService {
    pub(crate) fn replying(reply: PortResult<ContextualAnswer>) -> Self {
        Self {
            reply: Mutex::new(Some(reply)),
        }
    }
}

#[async_trait]
impl ContextualResponseService for FakeContextualService {
    async fn provide_contextual_response(
        &self,
        _query: &ContextualQuery,
    ) -> PortResult<ContextualAnswer> {
        self.reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(PortError::Unexpected("no scripted reply".to_string())))
    }
}

//=========================================================================================
// Media Devices
//=========================================================================================

/// Hands out fresh streams and keeps a clone of every track so tests can check
/// that each one was stopped.
pub(crate) struct FakeMediaDevices {
    microphone: bool,
    camera: bool,
    tracks: Mutex<Vec<MediaTrack>>,
}

impl FakeMediaDevices {
    pub(crate) fn with_permissions(microphone: bool, camera: bool) -> Self {
        Self {
            microphone,
            camera,
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn granted() -> Self {
        Self::with_permissions(true, true)
    }

    pub(crate) fn denied() -> Self {
        Self::with_permissions(false, false)
    }

    pub(crate) fn live_tracks(&self, kind: MediaKind) -> usize {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.kind() == kind && t.is_live())
            .count()
    }

    pub(crate) fn acquired(&self, kind: MediaKind) -> usize {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.kind() == kind)
            .count()
    }

    fn acquire(&self, kind: MediaKind, allowed: bool) -> PortResult<MediaStream> {
        if !allowed {
            return Err(PortError::PermissionDenied(kind));
        }
        let stream = MediaStream::single(kind);
        self.tracks
            .lock()
            .unwrap()
            .extend(stream.tracks().iter().cloned());
        Ok(stream)
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn acquire_audio_stream(&self) -> PortResult<MediaStream> {
        self.acquire(MediaKind::Audio, self.microphone)
    }

    async fn acquire_video_stream(&self) -> PortResult<MediaStream> {
        self.acquire(MediaKind::Video, self.camera)
    }
}

//=========================================================================================
// Application State and Outbox Helpers
//=========================================================================================

pub(crate) fn test_app_state(
    query: Arc<dyn QueryAnsweringService>,
    detector: Arc<dyn EngagementDetectionService>,
) -> Arc<AppState> {
    test_app_state_with(
        query,
        detector,
        Arc::new(FakeContextualService::replying(Err(PortError::Unexpected(
            "unused".to_string(),
        )))),
    )
}

pub(crate) fn test_app_state_with(
    query: Arc<dyn QueryAnsweringService>,
    detector: Arc<dyn EngagementDetectionService>,
    contextual: Arc<dyn ContextualResponseService>,
) -> Arc<AppState> {
    let config = Config::from_vars(|_| None).unwrap();
    Arc::new(AppState {
        config: Arc::new(config),
        history: Arc::new(InMemoryHistoryAdapter::with_sample_chats()),
        query_adapter: query,
        engagement_adapter: detector,
        contextual_adapter: contextual,
    })
}

pub(crate) fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Drains the outbox and keeps only the toasts, as `(title, description, variant)`.
pub(crate) fn notifications(
    rx: &mut UnboundedReceiver<ServerMessage>,
) -> Vec<(String, String, NotificationVariant)> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event {
            ServerMessage::Notification {
                title,
                description,
                variant,
            } => Some((title, description, variant)),
            _ => None,
        })
        .collect()
}
