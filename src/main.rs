//! Demo recorder: synthetic capture plus a scripted input timeline.
//!
//! Records a few seconds of the synthetic gradient display while fake
//! typing and a double-click drive the auto zoom, then finishes the file
//! through ffmpeg. Run with `RUST_LOG=debug` for per-tick detail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use zoomcast::capture::SyntheticBackend;
use zoomcast::encoder::ffmpeg::FfmpegEncoderFactory;
use zoomcast::geometry::{AxSpace, Coord};
use zoomcast::overlay::{OverlayFrame, OverlaySink};
use zoomcast::trigger::TriggerSource;
use zoomcast::{OutputSettings, RecordingEngine, RecordingEvent, ZoomcastResult};

const TYPED_LINE: &str = "let total = items.iter().map(|i| i.price).sum::<u64>();";

/// Replays a fixed input timeline against the recording clock: a typing
/// burst from 1.0s to 2.5s near the top right, then a double-click at
/// 4.0s near the bottom left.
struct ScriptedTriggers {
    started: Instant,
}

impl ScriptedTriggers {
    fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn last_typing_at(&self) -> Option<f64> {
        let t = self.elapsed();
        (t >= 1.0).then(|| t.min(2.5))
    }

    fn last_double_click_at(&self) -> Option<f64> {
        (self.elapsed() >= 4.0).then_some(4.0)
    }

    fn recent(&self, at: Option<f64>, within: Duration) -> bool {
        match at {
            Some(at) => self.elapsed() - at <= within.as_secs_f64(),
            None => false,
        }
    }
}

impl TriggerSource for ScriptedTriggers {
    fn is_typing_active(&self, within: Duration) -> bool {
        self.recent(self.last_typing_at(), within)
    }

    fn last_typing_position(&self) -> Option<Coord<AxSpace>> {
        Some(Coord::new(900.0, 220.0))
    }

    fn is_double_click_active(&self, within: Duration) -> bool {
        self.recent(self.last_double_click_at(), within)
    }

    fn last_double_click_position(&self) -> Option<Coord<AxSpace>> {
        Some(Coord::new(300.0, 540.0))
    }

    fn is_selection_active(&self, _within: Duration) -> bool {
        false
    }

    fn last_selection_position(&self) -> Option<Coord<AxSpace>> {
        None
    }

    fn typed_text_buffer(&self) -> Option<String> {
        let t = self.elapsed();
        if t < 1.0 {
            return None;
        }
        // Characters appear over the burst window.
        let progress = ((t - 1.0) / 1.5).clamp(0.0, 1.0);
        let chars = (progress * TYPED_LINE.len() as f64) as usize;
        if chars == 0 {
            return None;
        }
        Some(TYPED_LINE[..chars].to_string())
    }
}

/// Prints zoom activity instead of drawing it.
#[derive(Default)]
struct LoggingOverlay {
    was_active: AtomicBool,
}

impl OverlaySink for LoggingOverlay {
    fn show(&self) {
        log::info!("[OVERLAY] shown");
    }

    fn update(&self, frame: &OverlayFrame) {
        let active = frame.indicator.is_some() || frame.dimming.is_some();
        if active == self.was_active.swap(active, Ordering::Relaxed) {
            return;
        }
        match &frame.indicator {
            Some(indicator) => log::info!(
                "[OVERLAY] zoom {:?} at ({:.0}, {:.0}) x{:.2}",
                indicator.kind,
                indicator.x,
                indicator.y,
                indicator.scale
            ),
            None => log::info!("[OVERLAY] zoom released"),
        }
    }

    fn hide(&self) {
        log::info!("[OVERLAY] hidden");
    }
}

#[tokio::main]
async fn main() -> ZoomcastResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let engine = Arc::new(RecordingEngine::new(
        Arc::new(SyntheticBackend::default()),
        Arc::new(FfmpegEncoderFactory),
        Arc::new(LoggingOverlay::default()),
        Arc::new(ScriptedTriggers::new()),
    ));

    let mut output = OutputSettings::default();
    output.output_dir = Some(std::env::temp_dir().join("zoomcast-demo"));
    engine.set_output_settings(output);
    engine.set_zoom_scale(2.5);

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RecordingEvent::StateChanged { state } = event {
                log::debug!("observer saw state {:?}", state);
            }
        }
    });

    engine.start().await?;
    tokio::time::sleep(Duration::from_secs(6)).await;

    match engine.stop().await? {
        Some(summary) => println!(
            "Recorded {:.1}s to {} ({} frames appended, {} dropped)",
            summary.duration_secs,
            summary.output_path.display(),
            summary.frames_appended,
            summary.frames_dropped
        ),
        None => println!("Nothing was recorded"),
    }
    Ok(())
}
