//! Auto-zoom controller.
//!
//! Runs once per control tick and turns trigger activity into a smoothly
//! animated crop rectangle over the capture region:
//!
//! - a winning trigger locks the focus position and starts the hold window
//! - zoom stays active until no trigger fires for the hold duration, then
//!   the state snaps back to identity
//! - the crop animates with per-axis exponential smoothing and is clamped
//!   inside the capture region after smoothing
//! - while active, a trigger drifting outside the safe zone of the
//!   displayed crop repositions the focus, rate-limited by the position
//!   hold interval
//!
//! The controller never reads the clock; callers inject `now`, which keeps
//! every scenario reproducible in tests.

use std::time::{Duration, Instant};

use crate::geometry::{Coord, DisplaySpace, Rect, Size};
use crate::settings::{ZoomMode, ZoomSettings};
use crate::trigger::{Trigger, TriggerKind};

/// Divide-safe floor for the frame-size progress denominator. Keeps the
/// interpolation defined when the equivalent scale degenerates to 1.0.
const SCALE_PROGRESS_EPSILON: f64 = 1e-4;

/// Mutable zoom state for one recording session.
///
/// Created at capture start and owned solely by the controller; nothing
/// else mutates it.
#[derive(Debug, Clone)]
pub struct ZoomRuntimeState {
    active: bool,
    locked_target: Option<Coord<DisplaySpace>>,
    last_trigger_kind: Option<TriggerKind>,
    last_trigger_at: Option<Instant>,
    last_reposition_at: Option<Instant>,
    current_scale: f64,
    current_center: Coord<DisplaySpace>,
    last_crop: Rect<DisplaySpace>,
    subtitle_text: String,
    subtitle_updated_at: Option<Instant>,
}

impl ZoomRuntimeState {
    fn new(region: Rect<DisplaySpace>) -> Self {
        Self {
            active: false,
            locked_target: None,
            last_trigger_kind: None,
            last_trigger_at: None,
            last_reposition_at: None,
            current_scale: 1.0,
            current_center: region.center(),
            last_crop: region,
            subtitle_text: String::new(),
            subtitle_updated_at: None,
        }
    }

    /// Snap back to identity. The next tick renders the full region.
    fn reset(&mut self, region: Rect<DisplaySpace>) {
        let subtitle_text = std::mem::take(&mut self.subtitle_text);
        let subtitle_updated_at = self.subtitle_updated_at;
        *self = Self::new(region);
        // Subtitles outlive the zoom episode; they fade on their own timer.
        self.subtitle_text = subtitle_text;
        self.subtitle_updated_at = subtitle_updated_at;
    }
}

/// One tick's output: what to capture and what to overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomFrame {
    /// Crop to capture, always inside the base region.
    pub crop: Rect<DisplaySpace>,
    /// Whether zoom is active this tick.
    pub active: bool,
    /// Magnification this tick (1.0 when inactive).
    pub scale: f64,
    /// Locked focus position while active.
    pub focus: Option<Coord<DisplaySpace>>,
    /// What fired the current zoom episode.
    pub kind: Option<TriggerKind>,
    /// Subtitle text if currently visible.
    pub subtitle: Option<String>,
}

/// Turns per-tick trigger decisions into an animated crop rectangle.
pub struct ZoomController {
    region: Rect<DisplaySpace>,
    state: ZoomRuntimeState,
}

impl ZoomController {
    /// Create a controller for one session over the given capture region.
    pub fn new(region: Rect<DisplaySpace>) -> Self {
        Self {
            region,
            state: ZoomRuntimeState::new(region),
        }
    }

    /// The capture region this controller animates within.
    pub fn region(&self) -> Rect<DisplaySpace> {
        self.region
    }

    /// Advance the animation by one control tick.
    ///
    /// `trigger` is this tick's arbitration winner, `typed_text` the
    /// current subtitle source. Both come from the same snapshot.
    pub fn tick(
        &mut self,
        now: Instant,
        settings: &ZoomSettings,
        trigger: Option<Trigger>,
        typed_text: Option<&str>,
    ) -> ZoomFrame {
        self.update_subtitle(now, typed_text);

        if let Some(trigger) = trigger {
            self.acquire_trigger(now, settings, trigger);
        }

        let hold = Duration::from_secs_f64(settings.zoom_hold_secs);
        // The boundary tick itself still counts as held.
        let within_hold = self
            .state
            .last_trigger_at
            .map(|at| now.duration_since(at) <= hold)
            .unwrap_or(false);
        let should_zoom = trigger.is_some() || (within_hold && self.state.active);

        if !should_zoom {
            if self.state.active {
                log::debug!("[ZOOM] hold expired, returning to full region");
            }
            self.state.reset(self.region);
            return self.identity_frame(now, settings);
        }

        let (target_scale, target_size) = self.targets(settings);
        let target_center = self.target_center(settings, target_size);

        // Exponential smoothing toward the targets, one coefficient per axis.
        self.state.current_scale +=
            (target_scale - self.state.current_scale) * settings.scale_smoothing;
        self.state.current_center = Coord::new(
            self.state.current_center.x
                + (target_center.x - self.state.current_center.x) * settings.position_smoothing_x,
            self.state.current_center.y
                + (target_center.y - self.state.current_center.y) * settings.position_smoothing_y,
        );

        // Invariant: magnification stays inside the configured bounds while active.
        self.state.current_scale = self
            .state
            .current_scale
            .clamp(settings.min_zoom_scale, settings.max_zoom_scale);

        let size = self.displayed_size(settings, target_scale, target_size);
        let crop = Rect::new(
            Coord::new(
                self.state.current_center.x - size.width / 2.0,
                self.state.current_center.y - size.height / 2.0,
            ),
            size,
        )
        .clamp_within(&self.region);

        self.state.last_crop = crop;

        ZoomFrame {
            crop,
            active: true,
            scale: self.state.current_scale,
            focus: self.state.locked_target,
            kind: self.state.last_trigger_kind,
            subtitle: self.visible_subtitle(now, settings),
        }
    }

    /// Lock or move the focus for an accepted trigger.
    fn acquire_trigger(&mut self, now: Instant, settings: &ZoomSettings, trigger: Trigger) {
        self.state.last_trigger_at = Some(now);
        self.state.last_trigger_kind = Some(trigger.kind);

        if !self.state.active {
            // First trigger of an episode locks directly, no smoothing.
            self.state.active = true;
            self.state.locked_target = Some(trigger.position);
            self.state.last_reposition_at = Some(now);
            log::debug!(
                "[ZOOM] activated by {:?} at ({:.0}, {:.0})",
                trigger.kind,
                trigger.position.x,
                trigger.position.y
            );
            return;
        }

        // Two-tier hysteresis: the focus only moves when the trigger leaves
        // the safe zone of the crop the viewer currently sees, and no more
        // often than the position hold interval.
        let safe_zone = self.state.last_crop.inset(
            self.state.last_crop.size.width * settings.edge_margin_ratio,
            self.state.last_crop.size.height * settings.edge_margin_ratio,
        );
        if safe_zone.contains(trigger.position) {
            return;
        }

        let hold = Duration::from_secs_f64(settings.position_hold_secs);
        let held_long_enough = self
            .state
            .last_reposition_at
            .map(|at| now.duration_since(at) >= hold)
            .unwrap_or(true);
        if !held_long_enough {
            return;
        }

        log::debug!(
            "[ZOOM] repositioning to ({:.0}, {:.0})",
            trigger.position.x,
            trigger.position.y
        );
        self.state.locked_target = Some(trigger.position);
        self.state.last_reposition_at = Some(now);
    }

    /// Target magnification and crop size for the current mode.
    fn targets(&self, settings: &ZoomSettings) -> (f64, Size<DisplaySpace>) {
        match settings.mode {
            ZoomMode::Scale => {
                let scale = settings
                    .zoom_scale
                    .clamp(settings.min_zoom_scale, settings.max_zoom_scale);
                let size = Size::new(
                    self.region.size.width / scale,
                    self.region.size.height / scale,
                );
                (scale, size)
            }
            ZoomMode::FrameSize { width, height } => {
                let width = width.min(self.region.size.width);
                let height = height.min(self.region.size.height);
                let scale = (self.region.size.width / width)
                    .clamp(settings.min_zoom_scale, settings.max_zoom_scale);
                (scale, Size::new(width, height))
            }
        }
    }

    /// Locked focus plus the configured center bias.
    fn target_center(
        &self,
        settings: &ZoomSettings,
        target_size: Size<DisplaySpace>,
    ) -> Coord<DisplaySpace> {
        let locked = self.state.locked_target.unwrap_or_else(|| self.region.center());
        Coord::new(
            locked.x + target_size.width * settings.center_offset_x,
            locked.y + target_size.height * settings.center_offset_y,
        )
    }

    /// Crop size to display this tick.
    ///
    /// Scale mode divides the region by the smoothed scale. Frame-size mode
    /// interpolates from the full region to the requested size by the scale
    /// animation's progress; the epsilon keeps the denominator away from
    /// zero when the equivalent scale is 1.0.
    fn displayed_size(
        &self,
        settings: &ZoomSettings,
        target_scale: f64,
        target_size: Size<DisplaySpace>,
    ) -> Size<DisplaySpace> {
        match settings.mode {
            ZoomMode::Scale => Size::new(
                self.region.size.width / self.state.current_scale,
                self.region.size.height / self.state.current_scale,
            ),
            ZoomMode::FrameSize { .. } => {
                let progress = t_clamp(
                    (self.state.current_scale - 1.0)
                        / (target_scale - 1.0 + SCALE_PROGRESS_EPSILON),
                );
                Size::new(
                    self.region.size.width
                        + (target_size.width - self.region.size.width) * progress,
                    self.region.size.height
                        + (target_size.height - self.region.size.height) * progress,
                )
            }
        }
    }

    fn identity_frame(&self, now: Instant, settings: &ZoomSettings) -> ZoomFrame {
        ZoomFrame {
            crop: self.region,
            active: false,
            scale: 1.0,
            focus: None,
            kind: None,
            subtitle: self.visible_subtitle(now, settings),
        }
    }

    fn update_subtitle(&mut self, now: Instant, typed_text: Option<&str>) {
        if let Some(text) = typed_text {
            if !text.is_empty() && text != self.state.subtitle_text {
                self.state.subtitle_text = text.to_string();
                self.state.subtitle_updated_at = Some(now);
            }
        }
    }

    fn visible_subtitle(&self, now: Instant, settings: &ZoomSettings) -> Option<String> {
        if !settings.show_subtitles || self.state.subtitle_text.is_empty() {
            return None;
        }
        let hold = Duration::from_secs_f64(settings.subtitle_hold_secs);
        let fresh = self
            .state
            .subtitle_updated_at
            .map(|at| now.duration_since(at) <= hold)
            .unwrap_or(false);
        if fresh {
            Some(self.state.subtitle_text.clone())
        } else {
            None
        }
    }
}

/// Clamp value to 0-1 range.
fn t_clamp(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
