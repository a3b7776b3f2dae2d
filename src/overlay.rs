//! Overlay sink boundary.
//!
//! The engine describes what the on-screen overlay should show each tick;
//! a host application draws it. Three layers:
//! - indicator: zoom state badge at the focus point
//! - dimming: darkens everything outside the zoomed crop
//! - subtitle: live typed-text caption
//!
//! All geometry handed to the sink is overlay-window-local. Payload types
//! serialize so hosts can forward them to a separate overlay process.

use serde::Serialize;

use crate::geometry::{CoordinateMap, Rect, WindowSpace};
use crate::trigger::TriggerKind;
use crate::zoom::ZoomFrame;

/// A rectangle in overlay window coordinates, flattened for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect<WindowSpace>> for OverlayRect {
    fn from(rect: Rect<WindowSpace>) -> Self {
        Self {
            x: rect.origin.x,
            y: rect.origin.y,
            width: rect.size.width,
            height: rect.size.height,
        }
    }
}

/// Zoom state badge near the focus point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorLayer {
    pub x: f64,
    pub y: f64,
    pub kind: TriggerKind,
    pub scale: f64,
}

/// Dim everything except the hole.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimmingLayer {
    pub hole: OverlayRect,
}

/// Live caption of recently typed text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleLayer {
    pub text: String,
}

/// Everything the overlay should show this tick. A `None` layer is hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverlayFrame {
    pub indicator: Option<IndicatorLayer>,
    pub dimming: Option<DimmingLayer>,
    pub subtitle: Option<SubtitleLayer>,
}

impl OverlayFrame {
    /// Build the overlay payload for one zoom tick.
    ///
    /// Layer toggles come from settings; geometry converts from
    /// display-local to overlay-window coordinates through the map.
    pub fn from_zoom(
        zoom: &ZoomFrame,
        map: &CoordinateMap,
        show_indicator: bool,
        dim_background: bool,
    ) -> Self {
        let indicator = match (show_indicator && zoom.active, zoom.focus, zoom.kind) {
            (true, Some(focus), Some(kind)) => {
                let local = focus.to_window(map);
                Some(IndicatorLayer {
                    x: local.x,
                    y: local.y,
                    kind,
                    scale: zoom.scale,
                })
            }
            _ => None,
        };

        let dimming = if dim_background && zoom.active {
            Some(DimmingLayer {
                hole: zoom.crop.to_window(map).into(),
            })
        } else {
            None
        };

        let subtitle = zoom
            .subtitle
            .clone()
            .map(|text| SubtitleLayer { text });

        Self {
            indicator,
            dimming,
            subtitle,
        }
    }

    /// True when every layer is hidden.
    pub fn is_empty(&self) -> bool {
        self.indicator.is_none() && self.dimming.is_none() && self.subtitle.is_none()
    }
}

/// Receives overlay updates from the engine. Implementations must be cheap;
/// `update` runs on the 60 Hz control tick.
pub trait OverlaySink: Send + Sync {
    /// Recording started; make the overlay visible.
    fn show(&self);

    /// New layer state for this tick.
    fn update(&self, frame: &OverlayFrame);

    /// Recording stopped; hide the overlay.
    fn hide(&self);
}

/// Sink that draws nothing. Useful headless and as a default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOverlay;

impl OverlaySink for NoopOverlay {
    fn show(&self) {}
    fn update(&self, _frame: &OverlayFrame) {}
    fn hide(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Coord, DisplaySpace, Size};

    fn map() -> CoordinateMap {
        CoordinateMap::new(1080.0, Coord::new(0.0, 0.0), Size::new(1920.0, 1080.0))
    }

    fn active_zoom() -> ZoomFrame {
        ZoomFrame {
            crop: Rect::<DisplaySpace>::from_coords(480.0, 270.0, 960.0, 540.0),
            active: true,
            scale: 2.0,
            focus: Some(Coord::new(960.0, 540.0)),
            kind: Some(TriggerKind::Typing),
            subtitle: Some("typing here".to_string()),
        }
    }

    #[test]
    fn test_active_zoom_builds_all_layers() {
        let frame = OverlayFrame::from_zoom(&active_zoom(), &map(), true, true);

        let indicator = frame.indicator.unwrap();
        assert!((indicator.x - 960.0).abs() < 0.001);
        assert_eq!(indicator.kind, TriggerKind::Typing);

        let hole = frame.dimming.unwrap().hole;
        assert!((hole.x - 480.0).abs() < 0.001);
        assert!((hole.width - 960.0).abs() < 0.001);

        assert_eq!(frame.subtitle.unwrap().text, "typing here");
    }

    #[test]
    fn test_layer_toggles_hide_layers() {
        let frame = OverlayFrame::from_zoom(&active_zoom(), &map(), false, false);
        assert!(frame.indicator.is_none());
        assert!(frame.dimming.is_none());
        assert!(frame.subtitle.is_some());
    }

    #[test]
    fn test_inactive_zoom_keeps_subtitle_only() {
        let zoom = ZoomFrame {
            crop: Rect::from_coords(0.0, 0.0, 1920.0, 1080.0),
            active: false,
            scale: 1.0,
            focus: None,
            kind: None,
            subtitle: Some("still visible".to_string()),
        };
        let frame = OverlayFrame::from_zoom(&zoom, &map(), true, true);
        assert!(frame.indicator.is_none());
        assert!(frame.dimming.is_none());
        assert!(!frame.is_empty());
        assert_eq!(frame.subtitle.unwrap().text, "still visible");
    }

    #[test]
    fn test_window_origin_offsets_geometry() {
        let map = map().with_window_origin(Coord::new(100.0, 50.0));
        let frame = OverlayFrame::from_zoom(&active_zoom(), &map, true, true);

        let hole = frame.dimming.unwrap().hole;
        assert!((hole.x - 380.0).abs() < 0.001);
        assert!((hole.y - 220.0).abs() < 0.001);
    }

    #[test]
    fn test_serializes_camel_case() {
        let frame = OverlayFrame::from_zoom(&active_zoom(), &map(), true, true);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"dimming\""));
        assert!(json.contains("\"hole\""));
        assert!(json.contains("\"doubleClick\"") || json.contains("\"typing\""));
    }
}
