//! services/api/src/capture.rs
//!
//! Turns client-fed media into data URIs: PCM audio chunks become a WAV
//! recording, and camera frames are held by a `VideoFeed` until a JPEG snapshot
//! is taken.

use hound::{WavSpec, WavWriter};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use study_companion_core::{
    media::{DataUri, MediaStream},
    ports::{PortError, PortResult},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const JPEG_QUALITY: u8 = 85;

//=========================================================================================
// Audio Recording
//=========================================================================================

/// An in-progress microphone recording of PCM16-LE mono chunks.
///
/// The recording owns its stream. `finish` is the stop signal: it releases the
/// microphone and only then produces the data URI. The buffer never grows past
/// `max_duration` worth of samples.
pub struct AudioRecording {
    stream: MediaStream,
    sample_rate: u32,
    chunks: Vec<Vec<u8>>,
    byte_len: usize,
    max_bytes: usize,
}

impl AudioRecording {
    pub fn start(stream: MediaStream, sample_rate: u32, max_duration: Duration) -> Self {
        let max_bytes = max_duration
            .as_secs()
            .saturating_mul(u64::from(sample_rate))
            .saturating_mul(2);
        debug!(
            "Recording started on stream {} at {} Hz (limit {:?})",
            stream.id(),
            sample_rate,
            max_duration
        );
        Self {
            stream,
            sample_rate,
            chunks: Vec::new(),
            byte_len: 0,
            max_bytes: usize::try_from(max_bytes).unwrap_or(usize::MAX),
        }
    }

    /// Buffers one chunk and reports whether the recording is now full.
    ///
    /// Chunks arriving after the track stopped are dropped. Bytes past the limit
    /// are dropped too.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> bool {
        if !self.stream.is_live() {
            warn!("Dropping audio chunk for a stopped microphone stream.");
            return self.is_full();
        }

        let room = self.max_bytes - self.byte_len;
        let kept = chunk.len().min(room);
        if kept < chunk.len() {
            warn!(
                "Recording reached its {} byte limit; dropping {} bytes.",
                self.max_bytes,
                chunk.len() - kept
            );
        }
        if kept > 0 {
            self.chunks.push(chunk[..kept].to_vec());
            self.byte_len += kept;
        }
        self.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    pub fn is_full(&self) -> bool {
        self.byte_len >= self.max_bytes
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Stops the microphone and encodes everything recorded as a WAV data URI.
    pub fn finish(self) -> PortResult<String> {
        self.stream.release();
        let pcm: Vec<u8> = self.chunks.concat();
        let wav = pcm16_to_wav(&pcm, self.sample_rate)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;
        Ok(DataUri::new("audio/wav", wav).to_string())
    }

    /// Stops the microphone and throws the recording away.
    pub fn discard(self) {
        self.stream.release();
    }
}

fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    // A trailing odd byte cannot form a sample and is ignored.
    for chunk in pcm_data.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

//=========================================================================================
// Video Feed
//=========================================================================================

#[derive(Default)]
struct FeedInner {
    stream: Option<MediaStream>,
    frame: Option<RgbImage>,
}

/// The server-side stand-in for a `<video>` element: an attached camera stream
/// plus the most recent frame the client pushed for it.
#[derive(Clone, Default)]
pub struct VideoFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl VideoFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, stream: MediaStream) {
        let mut inner = self.inner.lock().await;
        inner.frame = None;
        inner.stream = Some(stream);
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.lock().await.stream.is_some()
    }

    /// Stops the attached stream's tracks but leaves it attached.
    pub async fn release_stream(&self) {
        let inner = self.inner.lock().await;
        study_companion_core::media::release_stream(inner.stream.as_ref());
    }

    /// Removes the attached stream and clears the buffered frame.
    pub async fn detach(&self) -> Option<MediaStream> {
        let mut inner = self.inner.lock().await;
        inner.frame = None;
        inner.stream.take()
    }

    /// Decodes and buffers a PNG or JPEG frame from the client.
    ///
    /// Frames are ignored while no live stream is attached.
    pub async fn present_frame(&self, encoded: &[u8]) -> PortResult<()> {
        if !self.has_live_stream().await {
            debug!("Ignoring camera frame: no live stream attached.");
            return Ok(());
        }

        let bytes = encoded.to_vec();
        let frame = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .map_err(|e| PortError::InvalidInput(format!("undecodable camera frame: {}", e)))?
            .to_rgb8();

        let mut inner = self.inner.lock().await;
        // The stream may have been released while the frame was decoding.
        if inner.stream.as_ref().is_some_and(MediaStream::is_live) {
            inner.frame = Some(frame);
        }
        Ok(())
    }

    async fn has_live_stream(&self) -> bool {
        self.inner
            .lock()
            .await
            .stream
            .as_ref()
            .is_some_and(MediaStream::is_live)
    }

    /// True when a live stream is attached and a frame with real dimensions is buffered.
    pub async fn is_ready(&self) -> bool {
        let inner = self.inner.lock().await;
        let live = inner.stream.as_ref().is_some_and(MediaStream::is_live);
        let sized = inner
            .frame
            .as_ref()
            .is_some_and(|f| f.width() > 0 && f.height() > 0);
        live && sized
    }

    /// Snapshots the current frame at its native resolution as a JPEG data URI.
    ///
    /// Returns `None` when the feed is not ready, so the caller can skip this
    /// round instead of sending a degenerate frame.
    pub async fn capture_frame_as_data_uri(&self) -> PortResult<Option<String>> {
        let frame = {
            let inner = self.inner.lock().await;
            let live = inner.stream.as_ref().is_some_and(MediaStream::is_live);
            match inner.frame.as_ref() {
                Some(f) if live && f.width() > 0 && f.height() > 0 => f.clone(),
                _ => return Ok(None),
            }
        };

        let jpeg = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&frame)?;
            Ok::<_, image::ImageError>(buf)
        })
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .map_err(|e| PortError::Unexpected(format!("Failed to encode JPEG: {}", e)))?;

        Ok(Some(DataUri::new("image/jpeg", jpeg).to_string()))
    }
}
