//! services/api/src/adapters/devices.rs
//!
//! The microphone and camera live in the browser. This adapter implements the
//! `MediaDevices` port on top of the permissions the client reports over the
//! WebSocket. A granted device yields a fresh live stream whose data is then
//! fed in by the client.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use study_companion_core::{
    media::{MediaKind, MediaStream},
    ports::{MediaDevices, PortError, PortResult},
};
use tracing::{info, warn};

/// Device access for one client connection. Every device starts out denied.
#[derive(Debug, Default)]
pub struct ClientMediaDevices {
    microphone_granted: AtomicBool,
    camera_granted: AtomicBool,
}

impl ClientMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permissions(&self, microphone: bool, camera: bool) {
        info!(
            "Client reported device permissions: microphone={}, camera={}",
            microphone, camera
        );
        self.microphone_granted.store(microphone, Ordering::Release);
        self.camera_granted.store(camera, Ordering::Release);
    }

    fn acquire(&self, kind: MediaKind) -> PortResult<MediaStream> {
        let granted = match kind {
            MediaKind::Audio => &self.microphone_granted,
            MediaKind::Video => &self.camera_granted,
        };
        if granted.load(Ordering::Acquire) {
            Ok(MediaStream::single(kind))
        } else {
            warn!("Access to the {} was denied.", kind);
            Err(PortError::PermissionDenied(kind))
        }
    }
}

#[async_trait]
impl MediaDevices for ClientMediaDevices {
    async fn acquire_audio_stream(&self) -> PortResult<MediaStream> {
        self.acquire(MediaKind::Audio)
    }

    async fn acquire_video_stream(&self) -> PortResult<MediaStream> {
        self.acquire(MediaKind::Video)
    }
}
