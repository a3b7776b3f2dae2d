//! Screen recording engine with input-driven auto zoom.
//!
//! zoomcast records one display to an H.264 `.mov` file while a 60 Hz
//! control loop watches input activity (typing, double-clicks, text
//! selection) and animates a smoothed zoom toward wherever the user is
//! working. Capture, encoding, input observation and overlay drawing sit
//! behind traits so hosts plug in platform backends; the crate ships a
//! synthetic capture backend and an ffmpeg pipe encoder.
//!
//! [`RecordingEngine`] is the entry point:
//!
//! ```no_run
//! use std::sync::Arc;
//! use zoomcast::capture::SyntheticBackend;
//! use zoomcast::encoder::ffmpeg::FfmpegEncoderFactory;
//! use zoomcast::overlay::NoopOverlay;
//! use zoomcast::trigger::TriggerSource;
//! use zoomcast::{RecordingEngine, ZoomcastResult};
//!
//! async fn record(triggers: Arc<dyn TriggerSource>) -> ZoomcastResult<()> {
//!     let engine = RecordingEngine::new(
//!         Arc::new(SyntheticBackend::default()),
//!         Arc::new(FfmpegEncoderFactory),
//!         Arc::new(NoopOverlay),
//!         triggers,
//!     );
//!     engine.start().await?;
//!     // ... recording runs; the control loop zooms on input activity
//!     let summary = engine.stop().await?;
//!     if let Some(summary) = summary {
//!         println!("saved {}", summary.output_path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod overlay;
pub mod pipeline;
pub mod settings;
pub mod trigger;
pub mod zoom;

pub use engine::{RecordingEngine, RecordingEvent, RecordingState, RecordingSummary};
pub use error::{ZoomcastError, ZoomcastResult};
pub use settings::{OutputSettings, ZoomMode, ZoomSettings};
