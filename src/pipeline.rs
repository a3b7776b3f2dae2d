//! Frame pipeline between capture delivery and the encoder.
//!
//! Two concurrency domains touch frames. Capture callbacks push into a
//! bounded flume channel and never block; a dedicated writer thread owns
//! the encoder and is the only context that appends. Per received frame
//! the writer:
//!
//! 1. discards everything once the stopping flag is set
//! 2. drops frames while the encoder is not ready, so a slow encoder
//!    sheds load instead of queueing
//! 3. drops malformed frames (buffer does not match dimensions)
//! 4. anchors the timeline epoch on the first valid frame
//! 5. appends with an epoch-relative timestamp; append failures are
//!    logged and counted, never escalated
//!
//! Finalize stops intake, lets the encoder drain within a bounded
//! timeout, and releases resources whether or not the drain made it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::CapturedFrame;
use crate::encoder::VideoEncoder;
use crate::error::{ZoomcastError, ZoomcastResult};

/// Capacity of the capture-to-writer frame channel. Roughly a tenth of a
/// second at 60 fps; anything beyond that means the writer is stuck and
/// frames are better dropped than queued.
const FRAME_BUFFER_SIZE: usize = 8;

/// How long finalize waits for the encoder to drain.
pub const DEFAULT_FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame counters shared between the writer thread and observers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    frames_appended: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_not_ready: AtomicU64,
    discarded_stopping: AtomicU64,
    append_failures: AtomicU64,
}

impl PipelineStats {
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::SeqCst)
    }

    pub fn frames_appended(&self) -> u64 {
        self.frames_appended.load(Ordering::SeqCst)
    }

    pub fn dropped_invalid(&self) -> u64 {
        self.dropped_invalid.load(Ordering::SeqCst)
    }

    pub fn dropped_not_ready(&self) -> u64 {
        self.dropped_not_ready.load(Ordering::SeqCst)
    }

    pub fn discarded_stopping(&self) -> u64 {
        self.discarded_stopping.load(Ordering::SeqCst)
    }

    pub fn append_failures(&self) -> u64 {
        self.append_failures.load(Ordering::SeqCst)
    }

    /// Everything received that never made it into the file. The two
    /// counters are read independently, so a frame appended between the
    /// loads could briefly push appended past received.
    pub fn total_dropped(&self) -> u64 {
        self.frames_received().saturating_sub(self.frames_appended())
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_received: self.frames_received(),
            frames_appended: self.frames_appended(),
            dropped_invalid: self.dropped_invalid(),
            dropped_not_ready: self.dropped_not_ready(),
            discarded_stopping: self.discarded_stopping(),
            append_failures: self.append_failures(),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`] for events and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatsSnapshot {
    pub frames_received: u64,
    pub frames_appended: u64,
    pub dropped_invalid: u64,
    pub dropped_not_ready: u64,
    pub discarded_stopping: u64,
    pub append_failures: u64,
}

/// Writer-side session state: the encoder plus the timeline epoch.
/// Lives entirely on the writer thread.
struct FrameSession {
    encoder: Box<dyn VideoEncoder>,
    epoch: Option<Instant>,
    started_at: Instant,
}

impl FrameSession {
    fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            encoder,
            epoch: None,
            started_at: Instant::now(),
        }
    }
}

/// Owns the frame channel and the writer thread for one recording.
pub struct FramePipeline {
    sender: flume::Sender<CapturedFrame>,
    stopping: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    writer: Option<JoinHandle<ZoomcastResult<PathBuf>>>,
}

impl FramePipeline {
    /// Spawn the writer thread around a ready encoder.
    pub fn start(
        encoder: Box<dyn VideoEncoder>,
        finalize_timeout: Duration,
    ) -> ZoomcastResult<Self> {
        let (sender, receiver) = flume::bounded::<CapturedFrame>(FRAME_BUFFER_SIZE);
        let stopping = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::default());

        let writer_stopping = stopping.clone();
        let writer_stats = stats.clone();
        let writer = std::thread::Builder::new()
            .name("frame-writer".to_string())
            .spawn(move || {
                write_loop(
                    receiver,
                    FrameSession::new(encoder),
                    writer_stopping,
                    writer_stats,
                    finalize_timeout,
                )
            })
            .map_err(|e| ZoomcastError::PipelineError(format!("spawn failed: {}", e)))?;

        Ok(Self {
            sender,
            stopping,
            stats,
            writer: Some(writer),
        })
    }

    /// Sender handed to the capture backend. Delivery must use `try_send`;
    /// a full channel drops the frame.
    pub fn sender(&self) -> flume::Sender<CapturedFrame> {
        self.sender.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Stop accepting frames. Frames already in flight are discarded, not
    /// flushed; teardown order calls this before detaching the stream.
    pub fn begin_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Finish the recording file. Blocks until the writer thread has
    /// released the encoder, bounded by the finalize timeout it was
    /// started with.
    pub fn finalize(mut self) -> ZoomcastResult<PathBuf> {
        self.begin_stop();

        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                return Err(ZoomcastError::PipelineError(
                    "pipeline already finalized".to_string(),
                ))
            }
        };

        match writer.join() {
            Ok(result) => result,
            Err(_) => Err(ZoomcastError::PipelineError(
                "writer thread panicked".to_string(),
            )),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        // An abandoned pipeline must not leave the writer spinning.
        self.stopping.store(true, Ordering::SeqCst);
    }
}

fn write_loop(
    receiver: flume::Receiver<CapturedFrame>,
    mut session: FrameSession,
    stopping: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    finalize_timeout: Duration,
) -> ZoomcastResult<PathBuf> {
    let mut logged_failure = false;

    loop {
        match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(frame) => {
                stats.frames_received.fetch_add(1, Ordering::SeqCst);

                if stopping.load(Ordering::SeqCst) {
                    stats.discarded_stopping.fetch_add(1, Ordering::SeqCst);
                    continue;
                }

                if session.encoder.has_failed() || !session.encoder.is_ready() {
                    stats.dropped_not_ready.fetch_add(1, Ordering::SeqCst);
                    continue;
                }

                if !frame.is_valid() {
                    stats.dropped_invalid.fetch_add(1, Ordering::SeqCst);
                    log::warn!(
                        "[PIPELINE] dropping malformed frame: {}x{} with {} bytes",
                        frame.width,
                        frame.height,
                        frame.data.len()
                    );
                    continue;
                }

                // The first valid frame defines time zero for the session.
                let epoch = *session.epoch.get_or_insert_with(|| {
                    log::debug!("[PIPELINE] first frame anchored the timeline epoch");
                    frame.timestamp
                });
                let pts = frame.timestamp.saturating_duration_since(epoch);

                match session.encoder.append(&frame, pts) {
                    Ok(()) => {
                        stats.frames_appended.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        stats.append_failures.fetch_add(1, Ordering::SeqCst);
                        if !logged_failure {
                            log::error!("[PIPELINE] frame append failed: {}", e);
                            logged_failure = true;
                        }
                    }
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    let elapsed = session.started_at.elapsed();
    let snapshot = stats.snapshot();
    log::info!(
        "[PIPELINE] finalizing after {:.1}s: {} received, {} appended, {} dropped",
        elapsed.as_secs_f64(),
        snapshot.frames_received,
        snapshot.frames_appended,
        snapshot.frames_received - snapshot.frames_appended,
    );

    session.encoder.finish(finalize_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct MockEncoder {
        ready: Arc<AtomicBool>,
        fail_appends: Arc<AtomicBool>,
        appended: Arc<Mutex<Vec<Duration>>>,
        finish_result: Option<ZoomcastError>,
    }

    impl MockEncoder {
        fn new() -> (Self, Arc<Mutex<Vec<Duration>>>, Arc<AtomicBool>) {
            let appended = Arc::new(Mutex::new(Vec::new()));
            let ready = Arc::new(AtomicBool::new(true));
            (
                Self {
                    ready: ready.clone(),
                    fail_appends: Arc::new(AtomicBool::new(false)),
                    appended: appended.clone(),
                    finish_result: None,
                },
                appended,
                ready,
            )
        }
    }

    impl VideoEncoder for MockEncoder {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn has_failed(&self) -> bool {
            false
        }

        fn append(&mut self, _frame: &CapturedFrame, pts: Duration) -> ZoomcastResult<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(ZoomcastError::EncoderError("simulated".to_string()));
            }
            self.appended.lock().push(pts);
            Ok(())
        }

        fn finish(self: Box<Self>, _timeout: Duration) -> ZoomcastResult<PathBuf> {
            match self.finish_result {
                Some(err) => Err(err),
                None => Ok(PathBuf::from("mock.mov")),
            }
        }
    }

    fn frame_at(base: Instant, offset_ms: u64) -> CapturedFrame {
        CapturedFrame {
            data: vec![0u8; 4 * 4 * 4],
            width: 4,
            height: 4,
            timestamp: base + Duration::from_millis(offset_ms),
        }
    }

    // The writer drains asynchronously; poll for the state a test expects.
    fn wait_until(check: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_appends_with_epoch_relative_timestamps() {
        let (encoder, appended, _) = MockEncoder::new();
        let pipeline =
            FramePipeline::start(Box::new(encoder), DEFAULT_FINALIZE_TIMEOUT).unwrap();
        let tx = pipeline.sender();

        let base = Instant::now();
        tx.send(frame_at(base, 0)).unwrap();
        tx.send(frame_at(base, 33)).unwrap();
        tx.send(frame_at(base, 66)).unwrap();
        let stats = pipeline.stats();
        wait_until(|| stats.frames_appended() == 3);

        let path = pipeline.finalize().unwrap();
        assert_eq!(path, PathBuf::from("mock.mov"));

        let pts = appended.lock().clone();
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[0], Duration::ZERO);
        assert_eq!(pts[1], Duration::from_millis(33));
        assert_eq!(pts[2], Duration::from_millis(66));
    }

    #[test]
    fn test_malformed_frames_do_not_anchor_the_epoch() {
        let (encoder, appended, _) = MockEncoder::new();
        let pipeline =
            FramePipeline::start(Box::new(encoder), DEFAULT_FINALIZE_TIMEOUT).unwrap();
        let tx = pipeline.sender();

        let base = Instant::now();
        let mut bad = frame_at(base, 0);
        bad.data.truncate(7);
        tx.send(bad).unwrap();
        tx.send(frame_at(base, 100)).unwrap();
        tx.send(frame_at(base, 133)).unwrap();
        let stats = pipeline.stats();
        wait_until(|| stats.frames_appended() == 2);

        assert_eq!(stats.dropped_invalid(), 1);
        pipeline.finalize().unwrap();

        // The epoch came from the first valid frame, not the malformed one.
        let pts = appended.lock().clone();
        assert_eq!(pts[0], Duration::ZERO);
        assert_eq!(pts[1], Duration::from_millis(33));
    }

    #[test]
    fn test_not_ready_encoder_sheds_frames() {
        let (encoder, appended, ready) = MockEncoder::new();
        ready.store(false, Ordering::SeqCst);
        let pipeline =
            FramePipeline::start(Box::new(encoder), DEFAULT_FINALIZE_TIMEOUT).unwrap();
        let tx = pipeline.sender();

        let base = Instant::now();
        tx.send(frame_at(base, 0)).unwrap();
        tx.send(frame_at(base, 16)).unwrap();
        let stats = pipeline.stats();
        wait_until(|| stats.dropped_not_ready() == 2);

        assert_eq!(stats.dropped_not_ready(), 2);
        assert!(appended.lock().is_empty());

        // Once ready, appends resume with a fresh epoch.
        ready.store(true, Ordering::SeqCst);
        tx.send(frame_at(base, 500)).unwrap();
        wait_until(|| stats.frames_appended() == 1);

        pipeline.finalize().unwrap();
        let pts = appended.lock().clone();
        assert_eq!(pts, vec![Duration::ZERO]);
    }

    #[test]
    fn test_append_failures_never_stop_the_pipeline() {
        let (mut encoder, appended, _) = MockEncoder::new();
        let fail = Arc::new(AtomicBool::new(true));
        encoder.fail_appends = fail.clone();
        let pipeline =
            FramePipeline::start(Box::new(encoder), DEFAULT_FINALIZE_TIMEOUT).unwrap();
        let tx = pipeline.sender();

        let base = Instant::now();
        for i in 0..5 {
            tx.send(frame_at(base, i * 16)).unwrap();
        }
        let stats = pipeline.stats();
        wait_until(|| stats.append_failures() == 5);

        assert_eq!(stats.append_failures(), 5);
        assert_eq!(stats.frames_appended(), 0);

        // The writer is still alive and the encoder still finalizes.
        fail.store(false, Ordering::SeqCst);
        tx.send(frame_at(base, 200)).unwrap();
        wait_until(|| stats.frames_appended() == 1);
        pipeline.finalize().unwrap();

        assert_eq!(appended.lock().len(), 1);
    }

    #[test]
    fn test_frames_after_begin_stop_are_discarded() {
        let (encoder, appended, _) = MockEncoder::new();
        let pipeline =
            FramePipeline::start(Box::new(encoder), DEFAULT_FINALIZE_TIMEOUT).unwrap();
        let tx = pipeline.sender();

        pipeline.begin_stop();
        assert!(pipeline.is_stopping());

        let base = Instant::now();
        tx.send(frame_at(base, 0)).unwrap();
        tx.send(frame_at(base, 16)).unwrap();
        let stats = pipeline.stats();
        wait_until(|| stats.discarded_stopping() == 2);

        assert_eq!(stats.discarded_stopping(), 2);
        assert!(appended.lock().is_empty());

        pipeline.finalize().unwrap();
    }

    #[test]
    fn test_finalize_surfaces_encoder_timeout_after_release() {
        let (mut encoder, _, _) = MockEncoder::new();
        encoder.finish_result = Some(ZoomcastError::Timeout {
            context: "ffmpeg finalize".to_string(),
        });
        let pipeline =
            FramePipeline::start(Box::new(encoder), Duration::from_millis(100)).unwrap();

        let result = pipeline.finalize();
        assert!(matches!(result, Err(ZoomcastError::Timeout { .. })));
    }

    #[test]
    fn test_total_dropped_never_underflows() {
        // A mid-recording read can see appended ahead of received.
        let stats = PipelineStats::default();
        stats.frames_received.store(3, Ordering::SeqCst);
        stats.frames_appended.store(5, Ordering::SeqCst);
        assert_eq!(stats.total_dropped(), 0);
    }

    #[test]
    fn test_stats_snapshot_serializes() {
        let stats = PipelineStats::default();
        stats.frames_received.store(10, Ordering::SeqCst);
        stats.frames_appended.store(8, Ordering::SeqCst);

        let snapshot = stats.snapshot();
        assert_eq!(stats.total_dropped(), 2);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"framesReceived\":10"));
        assert!(json.contains("\"framesAppended\":8"));
    }
}
