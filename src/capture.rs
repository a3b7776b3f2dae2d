//! Capture backend boundary.
//!
//! The engine never talks to an OS capture API directly. Host applications
//! implement [`CaptureBackend`] and [`CaptureStream`] on top of whatever
//! the platform offers; the crate ships [`SyntheticBackend`] for tests and
//! headless demos.
//!
//! Frame delivery contract:
//! - every delivered frame is `output_width` x `output_height` packed BGRA,
//!   the backend scales the source crop to that size
//! - frames are pushed into the flume channel handed to [`CaptureBackend::open`];
//!   a full channel means the consumer is behind and the frame is dropped
//! - `reconfigure` is fire-and-forget: failures arrive on the error
//!   callback and the previous crop stays in effect

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{ZoomcastError, ZoomcastResult};
use crate::geometry::{AxSpace, DisplaySpace, Rect};

/// Asynchronous stream failure callback. Invoked from backend threads.
pub type StreamErrorCallback = Box<dyn Fn(ZoomcastError) + Send + Sync>;

/// One display as reported by the backend.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    /// Full bounds in global top-left coordinates.
    pub bounds: Rect<AxSpace>,
    /// HiDPI scale factor (logical point to pixel).
    pub scale_factor: f64,
    pub is_primary: bool,
}

/// A single frame delivered by a capture stream.
#[derive(Clone)]
pub struct CapturedFrame {
    /// Packed BGRA pixels, row-major, no padding.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// When the backend captured the frame.
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// A frame is appendable when its buffer matches its dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Everything a backend needs to open a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub display: DisplayInfo,
    /// Initial source crop, display-local.
    pub crop: Rect<DisplaySpace>,
    /// Fixed size of delivered frames; the backend scales the crop to fit.
    pub output_width: u32,
    pub output_height: u32,
    pub fps: u32,
    /// Composite the cursor into delivered frames.
    pub show_cursor: bool,
}

/// Entry point a host application implements per capture API.
pub trait CaptureBackend: Send + Sync {
    /// Enumerate displays available for capture.
    fn displays(&self) -> ZoomcastResult<Vec<DisplayInfo>>;

    /// Open a stream. Delivery starts only after [`CaptureStream::start`].
    fn open(
        &self,
        config: StreamConfig,
        frames: flume::Sender<CapturedFrame>,
        on_error: StreamErrorCallback,
    ) -> ZoomcastResult<Box<dyn CaptureStream>>;
}

/// A live capture stream over one display.
pub trait CaptureStream: Send {
    /// Begin delivering frames. Blocks until the backend confirms, up to
    /// `timeout`.
    fn start(&mut self, timeout: Duration) -> ZoomcastResult<()>;

    /// Change the source crop and cursor visibility without interrupting
    /// delivery. Fire-and-forget; see the module docs.
    fn reconfigure(&mut self, crop: Rect<DisplaySpace>, show_cursor: bool);

    /// Stop delivering frames. Blocks until the backend confirms, up to
    /// `timeout`. No frames may be sent after this returns.
    fn stop(&mut self, timeout: Duration) -> ZoomcastResult<()>;
}

// ============================================================================
// Synthetic backend for tests and demos
// ============================================================================

/// Generates gradient frames on a worker thread at the configured rate.
/// Stands in for a real capture API in tests and the demo binary.
pub struct SyntheticBackend {
    width: u32,
    height: u32,
}

impl SyntheticBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn displays(&self) -> ZoomcastResult<Vec<DisplayInfo>> {
        Ok(vec![DisplayInfo {
            id: 1,
            name: "Synthetic Display".to_string(),
            bounds: Rect::from_coords(0.0, 0.0, self.width as f64, self.height as f64),
            scale_factor: 1.0,
            is_primary: true,
        }])
    }

    fn open(
        &self,
        config: StreamConfig,
        frames: flume::Sender<CapturedFrame>,
        _on_error: StreamErrorCallback,
    ) -> ZoomcastResult<Box<dyn CaptureStream>> {
        Ok(Box::new(SyntheticStream {
            config,
            crop: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            frames: Some(frames),
            worker: None,
        }))
    }
}

struct SyntheticStream {
    config: StreamConfig,
    crop: Arc<Mutex<Option<Rect<DisplaySpace>>>>,
    running: Arc<AtomicBool>,
    frames: Option<flume::Sender<CapturedFrame>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CaptureStream for SyntheticStream {
    fn start(&mut self, _timeout: Duration) -> ZoomcastResult<()> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| ZoomcastError::CaptureError("stream already started".to_string()))?;

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let crop = self.crop.clone();
        let width = self.config.output_width;
        let height = self.config.output_height;
        let interval = Duration::from_secs_f64(1.0 / self.config.fps.max(1) as f64);

        let handle = std::thread::Builder::new()
            .name("synthetic-capture".to_string())
            .spawn(move || {
                let mut tick: u32 = 0;
                while running.load(Ordering::SeqCst) {
                    let shade = (tick % 255) as u8;
                    // Crop only tints the output so dimension changes never
                    // reach the encoder, mirroring a scaling capture API.
                    let tint = match *crop.lock() {
                        Some(r) => (r.origin.x as u8).wrapping_add(shade),
                        None => shade,
                    };

                    let mut data = vec![0u8; (width * height * 4) as usize];
                    for px in data.chunks_exact_mut(4) {
                        px[0] = tint; // B
                        px[1] = shade; // G
                        px[2] = 0x20; // R
                        px[3] = 0xFF; // A
                    }

                    let frame = CapturedFrame {
                        data,
                        width,
                        height,
                        timestamp: Instant::now(),
                    };
                    // Drop on backpressure, like a real capture callback would.
                    let _ = frames.try_send(frame);

                    tick = tick.wrapping_add(1);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| ZoomcastError::CaptureError(format!("spawn failed: {}", e)))?;

        self.worker = Some(handle);
        log::debug!("[CAPTURE] synthetic stream started at {}x{}", width, height);
        Ok(())
    }

    fn reconfigure(&mut self, crop: Rect<DisplaySpace>, _show_cursor: bool) {
        // Synthetic frames have no cursor to draw.
        *self.crop.lock() = Some(crop);
    }

    fn stop(&mut self, timeout: Duration) -> ZoomcastResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                return Err(ZoomcastError::Timeout {
                    context: "synthetic capture stop".to_string(),
                });
            }
        }
        log::debug!("[CAPTURE] synthetic stream stopped");
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
