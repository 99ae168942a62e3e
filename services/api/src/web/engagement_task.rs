//! services/api/src/web/engagement_task.rs
//!
//! This module contains the engagement monitor: a timer-driven task that
//! periodically snapshots the camera feed and asks the model whether the
//! student has checked out.

use crate::{
    capture::VideoFeed,
    web::{
        protocol::{Outbox, ServerMessage},
        state::{AppState, ConnectionState},
    },
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use study_companion_core::{
    domain::{DisengagementCheck, DisengagementReport},
    ports::{EngagementDetectionService, MediaDevices, PortError, PortResult},
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

//=========================================================================================
// The Monitor Handle
//=========================================================================================

/// Two states only: Disabled (no task) and Enabled (a running task that owns a
/// cancellation token). The camera stream lives in the `VideoFeed` meanwhile.
#[derive(Default)]
pub struct EngagementMonitor {
    cancellation_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    /// The running loop reads the module from here on every tick.
    learning_module: Option<watch::Sender<String>>,
}

impl EngagementMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquires the camera, attaches it to the feed and starts the periodic checks.
    ///
    /// If the camera cannot be acquired the monitor stays disabled and nothing is attached.
    /// Enabling a running monitor only updates the learning module it reports.
    pub async fn enable(
        &mut self,
        devices: &dyn MediaDevices,
        feed: &VideoFeed,
        detector: Arc<dyn EngagementDetectionService>,
        learning_module: String,
        period: Duration,
        outbox: Outbox,
    ) -> PortResult<()> {
        if self.is_enabled() {
            debug!("Engagement monitor already enabled.");
            self.set_learning_module(learning_module);
            return Ok(());
        }

        let stream = devices.acquire_video_stream().await?;
        info!(
            "Engagement monitor enabled for '{}' (stream {}, every {:?}).",
            learning_module,
            stream.id(),
            period
        );
        feed.attach(stream).await;

        let token = CancellationToken::new();
        let (module_tx, module_rx) = watch::channel(learning_module);
        let handle = tokio::spawn(engagement_process(
            feed.clone(),
            detector,
            module_rx,
            period,
            outbox,
            token.clone(),
        ));

        self.cancellation_token = Some(token);
        self.handle = Some(handle);
        self.learning_module = Some(module_tx);
        Ok(())
    }

    /// Points the running checks at another learning module. A no-op while disabled.
    pub fn set_learning_module(&self, learning_module: String) {
        let Some(module_tx) = &self.learning_module else {
            return;
        };
        module_tx.send_if_modified(|current| {
            if *current == learning_module {
                return false;
            }
            info!(
                "Engagement monitor switched from '{}' to '{}'.",
                current, learning_module
            );
            *current = learning_module;
            true
        });
    }

    /// Stops the timer, then releases the camera, then detaches it from the feed.
    pub async fn disable(&mut self, feed: &VideoFeed) {
        if let Some(token) = self.cancellation_token.take() {
            token.cancel();
        }
        self.learning_module = None;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Engagement monitor task failed to join: {:?}", e);
            }
            info!("Engagement monitor disabled.");
        }

        feed.release_stream().await;
        feed.detach().await;
    }
}

//=========================================================================================
// The Polling Loop
//=========================================================================================

/// The long-running monitor loop. The first check happens one full period after start.
///
/// Checks never overlap: each one is awaited before the next tick is taken,
/// and ticks missed meanwhile are skipped. Cancelling the token also abandons a
/// check that is still waiting on the model.
async fn engagement_process(
    feed: VideoFeed,
    detector: Arc<dyn EngagementDetectionService>,
    learning_module: watch::Receiver<String>,
    period: Duration,
    outbox: Outbox,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let module = learning_module.borrow().clone();
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                info!("Engagement check abandoned: monitor disabled mid-check.");
                break;
            }
            outcome = check_engagement(&feed, detector.as_ref(), &module) => {
                match outcome {
                    Ok(None) => debug!("Camera feed not ready; skipping engagement check."),
                    Ok(Some(report)) if report.warrants_intervention() => {
                        info!(
                            "Student disengaged (boredom {}); suggesting an intervention.",
                            report.boredom_level
                        );
                        let _ = outbox.send(ServerMessage::notification(
                            "Engagement Check",
                            report.suggested_intervention,
                        ));
                    }
                    Ok(Some(report)) => debug!(
                        "Engagement check passed (disengaged={}, boredom={}).",
                        report.is_disengaged, report.boredom_level
                    ),
                    Err(e) => warn!("Engagement check failed: {}", e),
                }
            }
        }
    }

    info!("Engagement monitor loop stopped.");
}

/// One tick: snapshot the feed and ask the model. `None` means the feed had no
/// usable frame and no remote call was made.
async fn check_engagement(
    feed: &VideoFeed,
    detector: &dyn EngagementDetectionService,
    learning_module: &str,
) -> PortResult<Option<DisengagementReport>> {
    let Some(face_data_uri) = feed.capture_frame_as_data_uri().await? else {
        return Ok(None);
    };

    let check = DisengagementCheck {
        face_data_uri,
        learning_module: learning_module.to_string(),
    };
    detector.detect_student_disengagement(&check).await.map(Some)
}

//=========================================================================================
// Connection Handlers
//=========================================================================================

/// Handles the client's engagement detection toggle.
pub async fn set_engagement_detection(
    app_state: &Arc<AppState>,
    conn: &Arc<Mutex<ConnectionState>>,
    outbox: &Outbox,
    enabled: bool,
    learning_module: Option<String>,
) {
    let mut guard = conn.lock().await;
    let state = &mut *guard;

    if let Some(module) = learning_module.filter(|m| !m.trim().is_empty()) {
        state.learning_module = module;
    }

    if !enabled {
        state.monitor.disable(&state.video_feed).await;
        let _ = outbox.send(ServerMessage::EngagementDetectionChanged { enabled: false });
        return;
    }

    let result = state
        .monitor
        .enable(
            state.devices.as_ref(),
            &state.video_feed,
            app_state.engagement_adapter.clone(),
            state.learning_module.clone(),
            app_state.config.engagement_interval,
            outbox.clone(),
        )
        .await;

    match result {
        Ok(()) => {
            let _ = outbox.send(ServerMessage::EngagementDetectionChanged { enabled: true });
        }
        Err(e) => {
            warn!("Could not enable engagement detection: {}", e);
            let _ = outbox.send(ServerMessage::failure(
                "Webcam Error",
                "Could not access webcam for engagement detection.",
            ));
            let _ = outbox.send(ServerMessage::EngagementDetectionChanged { enabled: false });
        }
    }
}

/// Feeds a base64-encoded camera frame from the client into the video feed.
pub async fn present_video_frame(conn: &Arc<Mutex<ConnectionState>>, data: &str) {
    let feed = conn.lock().await.video_feed.clone();

    let result = match STANDARD.decode(data.trim()) {
        Ok(bytes) => feed.present_frame(&bytes).await,
        Err(e) => Err(PortError::InvalidInput(format!("frame is not base64: {}", e))),
    };
    if let Err(e) = result {
        warn!("Dropping camera frame: {}", e);
    }
}
