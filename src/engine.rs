//! Recording engine: session lifecycle and the control tick loop.
//!
//! The engine owns the only mutable recording state in the crate. A
//! session is acquired in a fixed order (display metadata, geometry map,
//! encoder and pipeline, capture stream, control loop, overlay) and torn
//! down in reverse. Failures during acquisition roll back whatever was
//! already acquired, surface `Error`, and recover to `Idle` on their own.
//!
//! While recording, a 60 Hz tokio task drives the zoom animation: it
//! snapshots trigger state, picks a winner, advances the zoom controller,
//! repositions the capture crop when it moved meaningfully, and pushes
//! overlay updates. The task never blocks on I/O and is cancelled through
//! a `CancellationToken` drop guard.

use std::path::PathBuf;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::Either;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::capture::{CaptureBackend, CaptureStream, DisplayInfo, StreamConfig};
use crate::encoder::{EncoderConfig, EncoderFactory};
use crate::error::{ZoomcastError, ZoomcastResult};
use crate::geometry::{CoordinateMap, DisplaySpace, Rect, ScreenSpace, Size};
use crate::overlay::{OverlayFrame, OverlaySink};
use crate::pipeline::{FramePipeline, PipelineStatsSnapshot, DEFAULT_FINALIZE_TIMEOUT};
use crate::settings::{OutputSettings, ZoomSettings};
use crate::trigger::{arbitrate, TriggerSnapshot, TriggerSource};
use crate::zoom::ZoomController;

/// Control loop interval (60 Hz).
const CONTROL_TICK_INTERVAL_MS: u64 = 16;

/// Crop movement below this many pixels never reaches the backend.
const REPOSITION_EPSILON: f64 = 0.25;

/// How long a failed session shows `Error` before recovering to `Idle`.
const ERROR_RESET_DELAY: Duration = Duration::from_secs(2);

const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_STOP_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// State and events
// ============================================================================

/// Recording lifecycle. All transitions go through the engine; `Error`
/// recovers to `Idle` on its own after a short delay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Error { message: String },
}

/// Events broadcast to engine observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RecordingEvent {
    StateChanged { state: RecordingState },
    Completed { summary: RecordingSummary },
}

/// What a finished session produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub session_id: String,
    pub output_path: PathBuf,
    pub duration_secs: f64,
    pub frames_appended: u64,
    pub frames_dropped: u64,
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to the control tick loop. Dropping the guard cancels the task.
struct ControlLoop {
    stop: Option<DropGuard>,
}

impl ControlLoop {
    fn stop(&mut self) {
        drop(self.stop.take());
    }
}

/// What the blocking acquisition phase hands back to the async side.
struct AcquiredCapture {
    map: CoordinateMap,
    region: Rect<DisplaySpace>,
    output_path: PathBuf,
    pipeline: FramePipeline,
    stream: Box<dyn CaptureStream>,
    error_rx: crossbeam_channel::Receiver<ZoomcastError>,
    show_cursor: bool,
}

/// Everything owned by one recording session.
struct ActiveSession {
    id: String,
    started_at: Instant,
    output_path: PathBuf,
    pipeline: FramePipeline,
    stream: Arc<Mutex<Box<dyn CaptureStream>>>,
    control: ControlLoop,
}

/// Orchestrates capture, zoom, overlay and encoding for one display.
pub struct RecordingEngine {
    backend: Arc<dyn CaptureBackend>,
    encoder_factory: Arc<dyn EncoderFactory>,
    overlay: Arc<dyn OverlaySink>,
    triggers: Arc<dyn TriggerSource>,

    zoom_settings: Arc<RwLock<ZoomSettings>>,
    output_settings: RwLock<OutputSettings>,
    /// Requested capture region in global screen coordinates. `None`
    /// records the full display.
    base_region: RwLock<Option<Rect<ScreenSpace>>>,
    display_id: RwLock<Option<u32>>,

    state: Arc<RwLock<RecordingState>>,
    stop_requested: AtomicBool,
    events: broadcast::Sender<RecordingEvent>,
    session: Mutex<Option<ActiveSession>>,
}

impl RecordingEngine {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        encoder_factory: Arc<dyn EncoderFactory>,
        overlay: Arc<dyn OverlaySink>,
        triggers: Arc<dyn TriggerSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            backend,
            encoder_factory,
            overlay,
            triggers,
            zoom_settings: Arc::new(RwLock::new(ZoomSettings::default())),
            output_settings: RwLock::new(OutputSettings::default()),
            base_region: RwLock::new(None),
            display_id: RwLock::new(None),
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            stop_requested: AtomicBool::new(false),
            events,
            session: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn state(&self) -> RecordingState {
        self.state.read().clone()
    }

    /// True while frames are still being produced or drained.
    pub fn is_recording(&self) -> bool {
        matches!(
            *self.state.read(),
            RecordingState::Recording | RecordingState::Stopping
        )
    }

    /// True during a transition; callers should retry later.
    pub fn is_busy(&self) -> bool {
        matches!(
            *self.state.read(),
            RecordingState::Starting | RecordingState::Stopping
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    pub fn zoom_settings(&self) -> ZoomSettings {
        self.zoom_settings.read().clone()
    }

    pub fn base_region(&self) -> Option<Rect<ScreenSpace>> {
        *self.base_region.read()
    }

    /// Frame counters for the active session, if any.
    pub fn stats(&self) -> Option<PipelineStatsSnapshot> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.pipeline.stats().snapshot())
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.started_at.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Replace the zoom settings. Allowed at any time; the control loop
    /// picks up the new values on its next tick.
    pub fn set_zoom_settings(&self, mut settings: ZoomSettings) {
        settings.validate();
        *self.zoom_settings.write() = settings;
    }

    /// Adjust only the magnification. Allowed mid-recording.
    pub fn set_zoom_scale(&self, scale: f64) {
        let mut settings = self.zoom_settings.write();
        settings.zoom_scale = scale.clamp(settings.min_zoom_scale, settings.max_zoom_scale);
        log::debug!("[ENGINE] zoom scale set to {:.2}", settings.zoom_scale);
    }

    /// Replace the output settings. Ignored unless idle; a session keeps
    /// the settings it started with.
    pub fn set_output_settings(&self, mut settings: OutputSettings) {
        if *self.state.read() != RecordingState::Idle {
            log::warn!("[ENGINE] output settings ignored while recording");
            return;
        }
        settings.validate();
        *self.output_settings.write() = settings;
    }

    /// Set the capture region in global screen coordinates, or `None` for
    /// the full display. Ignored unless idle; the session region is fixed
    /// at start so the output file keeps constant dimensions.
    pub fn set_base_region(&self, region: Option<Rect<ScreenSpace>>) {
        if *self.state.read() != RecordingState::Idle {
            log::warn!("[ENGINE] capture region ignored while recording");
            return;
        }
        *self.base_region.write() = region;
    }

    /// Record a specific display, or `None` for the primary.
    pub fn set_display(&self, id: Option<u32>) {
        if *self.state.read() != RecordingState::Idle {
            log::warn!("[ENGINE] display change ignored while recording");
            return;
        }
        *self.display_id.write() = id;
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin a recording session. A no-op unless the engine is idle.
    pub async fn start(&self) -> ZoomcastResult<()> {
        {
            let mut state = self.state.write();
            if *state != RecordingState::Idle {
                log::warn!("[ENGINE] start ignored: state is {:?}", *state);
                return Ok(());
            }
            *state = RecordingState::Starting;
            // Clearing the latch under the same lock keeps a stale stop
            // from a previous session out of this one.
            self.stop_requested.store(false, Ordering::SeqCst);
        }
        self.emit_state(RecordingState::Starting);

        let backend = self.backend.clone();
        let factory = self.encoder_factory.clone();
        let output_settings = self.output_settings.read().clone();
        let base_region = *self.base_region.read();
        let display_id = *self.display_id.read();

        // Display probing, encoder spawn and the bounded stream-start wait
        // all block; keep them off the async workers.
        let acquired = tokio::task::spawn_blocking(move || {
            acquire_capture(backend, factory, output_settings, base_region, display_id)
        })
        .await
        .map_err(|e| ZoomcastError::Other(format!("acquisition task failed: {}", e)));

        let acquired = match acquired {
            Ok(Ok(acquired)) => acquired,
            Ok(Err(e)) | Err(e) => {
                self.fail(&format!("start failed: {}", e));
                return Err(e);
            }
        };

        let stream = Arc::new(Mutex::new(acquired.stream));
        let control = self.spawn_control_loop(
            acquired.region,
            acquired.map,
            stream.clone(),
            acquired.error_rx,
            acquired.show_cursor,
        );
        self.overlay.show();

        let session = ActiveSession {
            id: Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            output_path: acquired.output_path,
            pipeline: acquired.pipeline,
            stream,
            control,
        };
        log::info!(
            "[ENGINE] session {} recording to {:?}",
            session.id,
            session.output_path
        );
        *self.session.lock() = Some(session);
        self.transition(RecordingState::Recording);

        // A stop that landed while we were starting wins now.
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            log::info!("[ENGINE] honoring stop requested during startup");
            if let Err(e) = self.finish_session().await {
                log::warn!("[ENGINE] deferred stop failed: {}", e);
            }
        }
        Ok(())
    }

    /// End the current session and finish the output file.
    ///
    /// Idempotent: stopping while idle or already stopping is a no-op
    /// returning `None`. A stop during `Starting` is latched and honored
    /// as soon as acquisition completes.
    pub async fn stop(&self) -> ZoomcastResult<Option<RecordingSummary>> {
        let state = self.state.read().clone();
        match state {
            RecordingState::Idle | RecordingState::Error { .. } => {
                log::debug!("[ENGINE] stop ignored: state is {:?}", state);
                return Ok(None);
            }
            RecordingState::Starting => {
                self.stop_requested.store(true, Ordering::SeqCst);
                // Startup may have reached Recording between the state read
                // and the store; whoever swaps the latch first owns the stop.
                if *self.state.read() == RecordingState::Recording
                    && self.stop_requested.swap(false, Ordering::SeqCst)
                {
                    return self.finish_session().await;
                }
                log::info!("[ENGINE] stop requested during startup; latched");
                return Ok(None);
            }
            RecordingState::Stopping => {
                log::debug!("[ENGINE] stop ignored: already stopping");
                return Ok(None);
            }
            RecordingState::Recording => {}
        }

        self.finish_session().await
    }

    // ------------------------------------------------------------------
    // Session internals
    // ------------------------------------------------------------------

    /// Tear the session down in reverse acquisition order and finish the
    /// file. Returns `None` when another caller already claimed the stop.
    /// A finalize timeout keeps the best-effort file and still lands in
    /// `Idle`; other finalize failures surface `Error`.
    async fn finish_session(&self) -> ZoomcastResult<Option<RecordingSummary>> {
        {
            let mut state = self.state.write();
            if *state != RecordingState::Recording {
                log::debug!("[ENGINE] stop already claimed (state {:?})", *state);
                return Ok(None);
            }
            *state = RecordingState::Stopping;
        }
        self.emit_state(RecordingState::Stopping);

        let session = self.session.lock().take();
        let Some(mut session) = session else {
            self.transition(RecordingState::Idle);
            return Err(ZoomcastError::Other(
                "recording session missing".to_string(),
            ));
        };

        session.control.stop();
        self.overlay.hide();
        session.pipeline.begin_stop();

        // The backend's bounded stop wait blocks; run it off the workers.
        let stream = session.stream.clone();
        match tokio::task::spawn_blocking(move || stream.lock().stop(STREAM_STOP_TIMEOUT)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[ENGINE] capture stream stop failed: {}", e),
            Err(e) => log::warn!("[ENGINE] capture stream stop task failed: {}", e),
        }

        let stats = session.pipeline.stats();
        let pipeline = session.pipeline;
        let finalized = match tokio::task::spawn_blocking(move || pipeline.finalize()).await {
            Ok(result) => result,
            Err(e) => Err(ZoomcastError::PipelineError(format!(
                "finalize task failed: {}",
                e
            ))),
        };

        let path = match finalized {
            Ok(path) => path,
            // A slow encoder drain is not a failed recording: the file on
            // disk stays as best effort and the engine comes back clean.
            Err(ZoomcastError::Timeout { context }) => {
                log::warn!(
                    "[ENGINE] finalize timed out ({}); keeping best-effort file {:?}",
                    context,
                    session.output_path
                );
                session.output_path.clone()
            }
            Err(e) => {
                self.fail(&format!("finalize failed: {}", e));
                return Err(e);
            }
        };

        let summary = RecordingSummary {
            session_id: session.id,
            output_path: path,
            duration_secs: session.started_at.elapsed().as_secs_f64(),
            frames_appended: stats.frames_appended(),
            frames_dropped: stats.total_dropped(),
        };
        log::info!(
            "[ENGINE] recording complete: {:?} ({:.1}s, {} frames)",
            summary.output_path,
            summary.duration_secs,
            summary.frames_appended
        );
        self.transition(RecordingState::Idle);
        self.emit(RecordingEvent::Completed {
            summary: summary.clone(),
        });
        Ok(Some(summary))
    }

    fn spawn_control_loop(
        &self,
        region: Rect<DisplaySpace>,
        map: CoordinateMap,
        stream: Arc<Mutex<Box<dyn CaptureStream>>>,
        stream_errors: crossbeam_channel::Receiver<ZoomcastError>,
        show_cursor: bool,
    ) -> ControlLoop {
        let stop_token = CancellationToken::new();
        let cancelled = stop_token.child_token();
        let zoom_settings = self.zoom_settings.clone();
        let triggers = self.triggers.clone();
        let overlay = self.overlay.clone();

        tokio::spawn(async move {
            let mut zoom = ZoomController::new(region);
            let mut last_crop = region;

            loop {
                let sleep = tokio::time::sleep(Duration::from_millis(CONTROL_TICK_INTERVAL_MS));
                let Either::Right(_) =
                    futures::future::select(pin!(cancelled.cancelled()), pin!(sleep)).await
                else {
                    break;
                };

                while let Ok(e) = stream_errors.try_recv() {
                    log::warn!("[ENGINE] capture stream error: {}", e);
                }

                let settings = zoom_settings.read().clone();
                let recency = Duration::from_secs_f64(settings.trigger_recency_secs);
                let snapshot = TriggerSnapshot::capture(triggers.as_ref(), recency);
                let trigger = arbitrate(&snapshot, &settings, &map, &region);
                let frame = zoom.tick(
                    Instant::now(),
                    &settings,
                    trigger,
                    snapshot.typed_text.as_deref(),
                );

                // Reconfigure is fire-and-forget; sub-pixel jitter stays
                // local so the backend is not flooded with updates.
                if crop_moved(&last_crop, &frame.crop) {
                    stream.lock().reconfigure(frame.crop, show_cursor);
                    last_crop = frame.crop;
                }

                let overlay_frame = OverlayFrame::from_zoom(
                    &frame,
                    &map,
                    settings.show_indicator,
                    settings.dim_background,
                );
                overlay.update(&overlay_frame);
            }

            log::debug!("[ENGINE] control loop done");
        });

        ControlLoop {
            stop: Some(stop_token.drop_guard()),
        }
    }

    fn fail(&self, message: &str) {
        log::error!("[ENGINE] {}", message);
        self.transition(RecordingState::Error {
            message: message.to_string(),
        });
        self.schedule_error_reset();
    }

    /// After a failure the engine parks in `Error` long enough for
    /// observers to see it, then returns to `Idle` so recording can be
    /// retried without intervention.
    fn schedule_error_reset(&self) {
        let state = self.state.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_RESET_DELAY).await;
            let recovered = {
                let mut state = state.write();
                if matches!(*state, RecordingState::Error { .. }) {
                    *state = RecordingState::Idle;
                    true
                } else {
                    false
                }
            };
            if recovered {
                log::info!("[ENGINE] recovered to idle after error");
                let _ = events.send(RecordingEvent::StateChanged {
                    state: RecordingState::Idle,
                });
            }
        });
    }

    fn transition(&self, next: RecordingState) {
        *self.state.write() = next.clone();
        self.emit_state(next);
    }

    fn emit_state(&self, state: RecordingState) {
        log::info!("[ENGINE] state changed: {:?}", state);
        self.emit(RecordingEvent::StateChanged { state });
    }

    fn emit(&self, event: RecordingEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

/// Blocking half of session startup: resolve the display, spawn the
/// encoder and pipeline, then open and start the capture stream. Runs on
/// the blocking pool; failure rolls back whatever was already acquired,
/// in reverse order.
fn acquire_capture(
    backend: Arc<dyn CaptureBackend>,
    factory: Arc<dyn EncoderFactory>,
    output_settings: OutputSettings,
    base_region: Option<Rect<ScreenSpace>>,
    display_id: Option<u32>,
) -> ZoomcastResult<AcquiredCapture> {
    let displays = backend.displays()?;
    let display = resolve_display(&displays, display_id)?;
    let map = build_map(&displays, &display);

    let region = match base_region {
        Some(screen_rect) => screen_rect
            .to_display(&map)
            .clamp_within(&map.display_bounds()),
        None => map.display_bounds(),
    };
    if region.size.width < 1.0 || region.size.height < 1.0 {
        return Err(ZoomcastError::CaptureError(
            "capture region does not intersect the display".to_string(),
        ));
    }

    let encoder_config = EncoderConfig::build(
        &output_settings,
        region.size.width.round() as u32,
        region.size.height.round() as u32,
    )?;
    let output_path = encoder_config.output_path.clone();
    let encoder = factory.create(&encoder_config)?;
    let pipeline = FramePipeline::start(encoder, DEFAULT_FINALIZE_TIMEOUT)?;

    let (error_tx, error_rx) = crossbeam_channel::bounded::<ZoomcastError>(16);
    let stream_config = StreamConfig {
        display: display.clone(),
        crop: region,
        output_width: encoder_config.width,
        output_height: encoder_config.height,
        fps: output_settings.fps,
        show_cursor: output_settings.show_cursor,
    };
    let mut stream = match backend.open(
        stream_config,
        pipeline.sender(),
        Box::new(move |e| {
            let _ = error_tx.try_send(e);
        }),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            rollback_pipeline(pipeline);
            return Err(e);
        }
    };
    if let Err(e) = stream.start(STREAM_START_TIMEOUT) {
        if let Err(stop_err) = stream.stop(STREAM_STOP_TIMEOUT) {
            log::warn!("[ENGINE] rollback stream stop failed: {}", stop_err);
        }
        rollback_pipeline(pipeline);
        return Err(e);
    }

    Ok(AcquiredCapture {
        map,
        region,
        output_path,
        pipeline,
        stream,
        error_rx,
        show_cursor: output_settings.show_cursor,
    })
}

fn resolve_display(displays: &[DisplayInfo], id: Option<u32>) -> ZoomcastResult<DisplayInfo> {
    match id {
        Some(id) => displays
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(ZoomcastError::DisplayNotFound { id }),
        None => displays
            .iter()
            .find(|d| d.is_primary)
            .or_else(|| displays.first())
            .cloned()
            .ok_or_else(|| ZoomcastError::CaptureError("no displays available".to_string())),
    }
}

/// Build the coordinate map for the chosen display. The global height
/// spans all displays so y-axis flips stay correct off the primary.
fn build_map(displays: &[DisplayInfo], display: &DisplayInfo) -> CoordinateMap {
    let global_height = displays
        .iter()
        .map(|d| d.bounds.origin.y + d.bounds.size.height)
        .fold(0.0, f64::max);
    CoordinateMap::new(
        global_height,
        display.bounds.origin,
        Size::new(display.bounds.size.width, display.bounds.size.height),
    )
}

fn crop_moved(a: &Rect<DisplaySpace>, b: &Rect<DisplaySpace>) -> bool {
    (a.origin.x - b.origin.x).abs() > REPOSITION_EPSILON
        || (a.origin.y - b.origin.y).abs() > REPOSITION_EPSILON
        || (a.size.width - b.size.width).abs() > REPOSITION_EPSILON
        || (a.size.height - b.size.height).abs() > REPOSITION_EPSILON
}

fn rollback_pipeline(pipeline: FramePipeline) {
    // Best effort; the partial file stays on disk for inspection.
    if let Err(e) = pipeline.finalize() {
        log::warn!("[ENGINE] rollback finalize failed: {}", e);
    }
}
