//! Video encoder boundary.
//!
//! The frame pipeline drives a [`VideoEncoder`] through an [`EncoderFactory`],
//! so tests can substitute an in-memory encoder while production uses the
//! FFmpeg pipe in [`ffmpeg`].

pub mod ffmpeg;

use std::path::PathBuf;
use std::time::Duration;

use crate::capture::CapturedFrame;
use crate::error::{ResultExt, ZoomcastResult};
use crate::settings::OutputSettings;

/// Resolved parameters for one encoding session.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Output width in pixels, always even.
    pub width: u32,
    /// Output height in pixels, always even.
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Where the finished `.mov` lands.
    pub output_path: PathBuf,
}

impl EncoderConfig {
    /// Resolve a config from output settings and the capture dimensions.
    ///
    /// H.264 with yuv420p rejects odd dimensions, so both axes are clamped
    /// down to even before anything else sees them.
    pub fn build(settings: &OutputSettings, width: u32, height: u32) -> ZoomcastResult<Self> {
        let width = width.max(2) & !1;
        let height = height.max(2) & !1;
        Ok(Self {
            width,
            height,
            fps: settings.fps,
            bitrate: settings.calculate_bitrate(width, height),
            output_path: generate_output_path(settings)?,
        })
    }
}

/// Generate a timestamped output path for a new recording.
///
/// Defaults to the user's video directory, then downloads, then the temp
/// dir. Appends a counter when a same-second recording already exists.
pub fn generate_output_path(settings: &OutputSettings) -> ZoomcastResult<PathBuf> {
    let save_dir = settings.output_dir.clone().unwrap_or_else(|| {
        dirs::video_dir()
            .or_else(dirs::download_dir)
            .unwrap_or_else(std::env::temp_dir)
    });

    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("failed to create output directory {}", save_dir.display()))?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d at %H.%M.%S");
    let base = format!("Recording {}", timestamp);

    let mut path = save_dir.join(format!("{}.mov", base));
    let mut attempt = 2u32;
    while path.exists() {
        path = save_dir.join(format!("{} {}.mov", base, attempt));
        attempt += 1;
    }

    Ok(path)
}

/// One video encoding session. Implementations live on the pipeline's
/// writer thread; no method is called concurrently.
pub trait VideoEncoder: Send {
    /// Can frames be appended right now? Not-ready frames are dropped by
    /// the pipeline, never queued.
    fn is_ready(&self) -> bool;

    /// Has the encoder failed permanently? A failed encoder stays failed.
    fn has_failed(&self) -> bool;

    /// Append one frame. `pts` is the presentation time relative to the
    /// session's first valid frame.
    fn append(&mut self, frame: &CapturedFrame, pts: Duration) -> ZoomcastResult<()>;

    /// Finish the file, waiting up to `timeout` for the encoder to drain.
    /// Resources are released even when the wait times out.
    fn finish(self: Box<Self>, timeout: Duration) -> ZoomcastResult<PathBuf>;
}

/// Creates encoders for the pipeline.
pub trait EncoderFactory: Send + Sync {
    fn create(&self, config: &EncoderConfig) -> ZoomcastResult<Box<dyn VideoEncoder>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_forces_even_dimensions() {
        let settings = OutputSettings {
            output_dir: Some(std::env::temp_dir()),
            ..Default::default()
        };

        let config = EncoderConfig::build(&settings, 1281, 721).unwrap();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);

        let config = EncoderConfig::build(&settings, 1280, 720).unwrap();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);

        // Degenerate input still yields an encodable size.
        let config = EncoderConfig::build(&settings, 0, 1).unwrap();
        assert_eq!(config.width, 2);
        assert_eq!(config.height, 2);
    }

    #[test]
    fn test_config_carries_bitrate_and_fps() {
        let settings = OutputSettings {
            fps: 24,
            quality: 0.5,
            output_dir: Some(std::env::temp_dir()),
            ..Default::default()
        };
        let config = EncoderConfig::build(&settings, 1920, 1080).unwrap();
        assert_eq!(config.fps, 24);
        assert_eq!(config.bitrate, settings.calculate_bitrate(1920, 1080));
    }

    #[test]
    fn test_output_path_shape() {
        let settings = OutputSettings {
            output_dir: Some(std::env::temp_dir()),
            ..Default::default()
        };
        let path = generate_output_path(&settings).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Recording "));
        assert!(name.ends_with(".mov"));
        assert!(name.contains(" at "));
        assert!(path.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_output_path_avoids_collisions() {
        let dir = std::env::temp_dir().join(format!("zoomcast-test-{}", uuid::Uuid::new_v4()));
        let settings = OutputSettings {
            output_dir: Some(dir.clone()),
            ..Default::default()
        };

        let first = generate_output_path(&settings).unwrap();
        std::fs::write(&first, b"").unwrap();
        let second = generate_output_path(&settings).unwrap();

        assert_ne!(first, second);
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with(".mov"));

        let _ = std::fs::remove_file(&first);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_output_dir_is_created() {
        let dir = std::env::temp_dir()
            .join(format!("zoomcast-test-{}", uuid::Uuid::new_v4()))
            .join("nested");
        let settings = OutputSettings {
            output_dir: Some(dir.clone()),
            ..Default::default()
        };

        let path = generate_output_path(&settings).unwrap();
        assert!(dir.is_dir());
        assert!(path.starts_with(&dir));

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
