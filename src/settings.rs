//! Session settings for zoom behavior and recording output.
//!
//! All types serialize with camelCase field names so host applications can
//! persist them as JSON and ship them over IPC unchanged. `validate()`
//! clamps out-of-range values instead of rejecting them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the zoomed crop dimensions are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ZoomMode {
    /// Crop dimensions derived from the base region divided by the zoom factor.
    Scale,
    /// Crop dimensions given outright in display pixels. The controller
    /// derives an equivalent scale from the base region width.
    FrameSize { width: f64, height: f64 },
}

impl Default for ZoomMode {
    fn default() -> Self {
        Self::Scale
    }
}

/// Settings for the auto-zoom controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomSettings {
    /// How crop dimensions are chosen.
    pub mode: ZoomMode,
    /// Requested magnification in scale mode.
    pub zoom_scale: f64,
    /// Lowest magnification the controller will apply while active.
    pub min_zoom_scale: f64,
    /// Highest magnification the controller will apply while active.
    pub max_zoom_scale: f64,
    /// Exponential smoothing coefficient for the scale axis (0-1, higher = snappier).
    pub scale_smoothing: f64,
    /// Exponential smoothing coefficient for horizontal motion.
    pub position_smoothing_x: f64,
    /// Exponential smoothing coefficient for vertical motion.
    pub position_smoothing_y: f64,
    /// How long zoom stays active after the last trigger, in seconds.
    pub zoom_hold_secs: f64,
    /// Minimum interval between focus repositions, in seconds.
    pub position_hold_secs: f64,
    /// Fraction of the displayed crop treated as edge margin; the focus
    /// point leaving the inner safe zone forces a reposition.
    pub edge_margin_ratio: f64,
    /// Horizontal bias applied to the locked focus, as a fraction of the
    /// target crop width.
    pub center_offset_x: f64,
    /// Vertical bias applied to the locked focus, as a fraction of the
    /// target crop height.
    pub center_offset_y: f64,
    /// Zoom toward the caret while the user is typing.
    pub zoom_on_typing: bool,
    /// Zoom toward the pointer on double-click.
    pub zoom_on_double_click: bool,
    /// Zoom toward the selection anchor on text selection.
    pub zoom_on_selection: bool,
    /// How recent input must be to count as a trigger, in seconds.
    pub trigger_recency_secs: f64,
    /// Show the zoom indicator overlay layer.
    pub show_indicator: bool,
    /// Dim everything outside the zoomed crop.
    pub dim_background: bool,
    /// Show typed text as a live subtitle.
    pub show_subtitles: bool,
    /// How long the subtitle stays visible after the last keystroke, in seconds.
    pub subtitle_hold_secs: f64,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            mode: ZoomMode::Scale,
            zoom_scale: 2.0,
            min_zoom_scale: 1.2,
            max_zoom_scale: 4.0,
            scale_smoothing: 0.1,
            position_smoothing_x: 0.08,
            position_smoothing_y: 0.08,
            zoom_hold_secs: 3.0,
            position_hold_secs: 1.0,
            edge_margin_ratio: 0.15,
            center_offset_x: 0.0,
            center_offset_y: 0.0,
            zoom_on_typing: true,
            zoom_on_double_click: true,
            zoom_on_selection: true,
            trigger_recency_secs: 0.5,
            show_indicator: true,
            dim_background: true,
            show_subtitles: true,
            subtitle_hold_secs: 3.0,
        }
    }
}

impl ZoomSettings {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        // Magnification bounds must stay ordered and above identity
        self.min_zoom_scale = self.min_zoom_scale.max(1.0);
        self.max_zoom_scale = self.max_zoom_scale.max(self.min_zoom_scale);
        self.zoom_scale = self.zoom_scale.clamp(self.min_zoom_scale, self.max_zoom_scale);

        // Smoothing coefficients in (0, 1]; 0 would freeze the animation
        self.scale_smoothing = self.scale_smoothing.clamp(0.001, 1.0);
        self.position_smoothing_x = self.position_smoothing_x.clamp(0.001, 1.0);
        self.position_smoothing_y = self.position_smoothing_y.clamp(0.001, 1.0);

        self.zoom_hold_secs = self.zoom_hold_secs.max(0.0);
        self.position_hold_secs = self.position_hold_secs.max(0.0);
        self.subtitle_hold_secs = self.subtitle_hold_secs.max(0.0);
        self.trigger_recency_secs = self.trigger_recency_secs.max(0.05);

        // Above 0.45 the safe zone collapses and every tick repositions
        self.edge_margin_ratio = self.edge_margin_ratio.clamp(0.0, 0.45);

        self.center_offset_x = self.center_offset_x.clamp(-0.5, 0.5);
        self.center_offset_y = self.center_offset_y.clamp(-0.5, 0.5);

        if let ZoomMode::FrameSize { width, height } = &mut self.mode {
            *width = width.max(16.0);
            *height = height.max(16.0);
        }
    }
}

/// Settings for the recorded video file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    /// Frames per second (10-60).
    pub fps: u32,
    /// Quality setting (0.0-1.0). Affects video bitrate.
    pub quality: f64,
    /// Capture the cursor into the recording.
    pub show_cursor: bool,
    /// Directory for recordings. None = the user's video directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            quality: 0.7,
            show_cursor: true,
            output_dir: None,
        }
    }
}

impl OutputSettings {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.fps = self.fps.clamp(10, 60);
        self.quality = self.quality.clamp(0.0, 1.0);
    }

    /// Calculate video bitrate from the capture resolution and quality.
    /// Quality scales linearly from 2 bits per pixel to 6.
    pub fn calculate_bitrate(&self, width: u32, height: u32) -> u32 {
        let pixels = (width as f64) * (height as f64);
        (pixels * (2.0 + self.quality * 4.0)).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_validation() {
        let mut settings = ZoomSettings::default();
        let before = serde_json::to_string(&settings).unwrap();
        settings.validate();
        let after = serde_json::to_string(&settings).unwrap();
        assert_eq!(before, after);

        let mut output = OutputSettings::default();
        output.validate();
        assert_eq!(output.fps, 30);
        assert!((output.quality - 0.7).abs() < 1e-9);
        assert!(output.show_cursor);
    }

    #[test]
    fn test_validate_orders_magnification_bounds() {
        let mut settings = ZoomSettings {
            min_zoom_scale: 3.0,
            max_zoom_scale: 1.5,
            zoom_scale: 10.0,
            ..Default::default()
        };
        settings.validate();
        assert!((settings.min_zoom_scale - 3.0).abs() < 1e-9);
        assert!((settings.max_zoom_scale - 3.0).abs() < 1e-9);
        assert!((settings.zoom_scale - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_clamps_ratios_and_coefficients() {
        let mut settings = ZoomSettings {
            scale_smoothing: 0.0,
            position_smoothing_x: 5.0,
            edge_margin_ratio: 0.9,
            center_offset_y: -2.0,
            zoom_hold_secs: -1.0,
            ..Default::default()
        };
        settings.validate();
        assert!(settings.scale_smoothing > 0.0);
        assert!((settings.position_smoothing_x - 1.0).abs() < 1e-9);
        assert!((settings.edge_margin_ratio - 0.45).abs() < 1e-9);
        assert!((settings.center_offset_y + 0.5).abs() < 1e-9);
        assert!((settings.zoom_hold_secs - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_frame_size_floor() {
        let mut settings = ZoomSettings {
            mode: ZoomMode::FrameSize {
                width: 4.0,
                height: -100.0,
            },
            ..Default::default()
        };
        settings.validate();
        match settings.mode {
            ZoomMode::FrameSize { width, height } => {
                assert!((width - 16.0).abs() < 1e-9);
                assert!((height - 16.0).abs() < 1e-9);
            }
            _ => panic!("mode changed unexpectedly"),
        }
    }

    #[test]
    fn test_output_validate_clamps() {
        let mut output = OutputSettings {
            fps: 240,
            quality: 7.0,
            show_cursor: true,
            output_dir: None,
        };
        output.validate();
        assert_eq!(output.fps, 60);
        assert!((output.quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bitrate_scales_with_quality() {
        let low = OutputSettings {
            quality: 0.0,
            ..Default::default()
        };
        let high = OutputSettings {
            quality: 1.0,
            ..Default::default()
        };

        // 2 bits per pixel at the floor, 6 at the ceiling
        assert_eq!(low.calculate_bitrate(1920, 1080), 1920 * 1080 * 2);
        assert_eq!(high.calculate_bitrate(1920, 1080), 1920 * 1080 * 6);
        assert!(high.calculate_bitrate(1920, 1080) > low.calculate_bitrate(1920, 1080));
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&ZoomSettings::default()).unwrap();
        assert!(json.contains("zoomHoldSecs"));
        assert!(json.contains("edgeMarginRatio"));
        assert!(json.contains("zoomOnDoubleClick"));
        assert!(!json.contains("zoom_hold_secs"));
    }

    #[test]
    fn test_frame_size_mode_serde_shape() {
        let settings = ZoomSettings {
            mode: ZoomMode::FrameSize {
                width: 960.0,
                height: 540.0,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""type":"frameSize""#));

        let parsed: ZoomSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.mode, settings.mode);
    }
}
