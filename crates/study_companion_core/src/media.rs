//! crates/study_companion_core/src/media.rs
//!
//! Owned handles for microphone and camera streams, and the data URI codec
//! used to move captured media across the inference boundary.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

//=========================================================================================
// Streams and Tracks
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("microphone"),
            MediaKind::Video => f.write_str("camera"),
        }
    }
}

/// One hardware track of a stream.
///
/// Clones observe the same track, so a device can keep a clone to see when the
/// owner of the stream stops it.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    kind: MediaKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// An exclusively owned set of live tracks. Dropping the stream stops every track.
#[derive(Debug)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    /// A stream holding a single live track of the given kind.
    pub fn single(kind: MediaKind) -> Self {
        Self::new(vec![MediaTrack::new(kind)])
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn active_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn is_live(&self) -> bool {
        self.active_track_count() > 0
    }

    /// Stops every track. Calling it again is harmless.
    pub fn release(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Releases a stream that may not exist.
pub fn release_stream(stream: Option<&MediaStream>) {
    if let Some(stream) = stream {
        stream.release();
    }
}

//=========================================================================================
// Data URIs
//=========================================================================================

/// Binary media embedded inline as `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    payload: Vec<u8>,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The base64 payload without the `data:` header.
    pub fn base64_payload(&self) -> String {
        STANDARD.encode(&self.payload)
    }

    pub fn parse(uri: &str) -> PortResult<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| PortError::InvalidInput("data URI must start with 'data:'".to_string()))?;
        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| PortError::InvalidInput("data URI has no payload".to_string()))?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            PortError::InvalidInput("data URI payload must be base64 encoded".to_string())
        })?;
        if mime_type.is_empty() {
            return Err(PortError::InvalidInput(
                "data URI must include a MIME type".to_string(),
            ));
        }
        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| PortError::InvalidInput(format!("invalid base64 payload: {}", e)))?;
        Ok(Self::new(mime_type, payload))
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.base64_payload())
    }
}
