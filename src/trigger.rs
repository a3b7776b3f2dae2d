//! Zoom trigger sources and the per-tick trigger arbiter.
//!
//! Host applications implement [`TriggerSource`] on top of their input
//! monitoring (accessibility APIs, event taps). The engine samples the
//! source once per control tick into a [`TriggerSnapshot`] and runs
//! [`arbitrate`] to pick at most one winning trigger:
//!
//! - fixed priority: typing beats double-click beats text selection
//! - per-kind enable toggles from [`ZoomSettings`]
//! - a candidate only wins if its position falls inside the capture
//!   region, tested in display-local coordinates

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::{AxSpace, Coord, CoordinateMap, DisplaySpace, Rect};
use crate::settings::ZoomSettings;

/// Which user activity fired a zoom trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    Typing,
    DoubleClick,
    Selection,
}

/// Input activity observer implemented by the host application.
///
/// Positions are reported in global top-left coordinates, the space
/// accessibility APIs use. Queries must be cheap; they run on the 60 Hz
/// control tick.
pub trait TriggerSource: Send + Sync {
    /// Was there keyboard input within the given window?
    fn is_typing_active(&self, within: Duration) -> bool;

    /// Caret or last-keystroke position, if known.
    fn last_typing_position(&self) -> Option<Coord<AxSpace>>;

    /// Was there a double-click within the given window?
    fn is_double_click_active(&self, within: Duration) -> bool;

    /// Position of the most recent double-click, if known.
    fn last_double_click_position(&self) -> Option<Coord<AxSpace>>;

    /// Was text selected via the pointer within the given window?
    fn is_selection_active(&self, within: Duration) -> bool;

    /// Anchor of the most recent selection, if known.
    fn last_selection_position(&self) -> Option<Coord<AxSpace>>;

    /// Recently typed text for the subtitle overlay. None when empty.
    fn typed_text_buffer(&self) -> Option<String>;
}

/// One tick's worth of trigger state, sampled from a [`TriggerSource`].
///
/// A position is present only when the matching activity was recent
/// enough, so the arbiter never has to re-ask the source.
#[derive(Debug, Clone, Default)]
pub struct TriggerSnapshot {
    pub typing: Option<Coord<AxSpace>>,
    pub double_click: Option<Coord<AxSpace>>,
    pub selection: Option<Coord<AxSpace>>,
    pub typed_text: Option<String>,
}

impl TriggerSnapshot {
    /// Sample the source once. `recency` is the activity window applied to
    /// every kind.
    pub fn capture(source: &dyn TriggerSource, recency: Duration) -> Self {
        let typing = if source.is_typing_active(recency) {
            source.last_typing_position()
        } else {
            None
        };
        let double_click = if source.is_double_click_active(recency) {
            source.last_double_click_position()
        } else {
            None
        };
        let selection = if source.is_selection_active(recency) {
            source.last_selection_position()
        } else {
            None
        };

        Self {
            typing,
            double_click,
            selection,
            typed_text: source.typed_text_buffer(),
        }
    }
}

/// A winning trigger, position already converted to display-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub position: Coord<DisplaySpace>,
}

/// Pick at most one trigger from a snapshot.
///
/// Candidates are visited in priority order; a disabled or out-of-region
/// candidate is skipped and the next priority gets its chance.
pub fn arbitrate(
    snapshot: &TriggerSnapshot,
    settings: &ZoomSettings,
    map: &CoordinateMap,
    region: &Rect<DisplaySpace>,
) -> Option<Trigger> {
    let candidates = [
        (TriggerKind::Typing, settings.zoom_on_typing, snapshot.typing),
        (
            TriggerKind::DoubleClick,
            settings.zoom_on_double_click,
            snapshot.double_click,
        ),
        (
            TriggerKind::Selection,
            settings.zoom_on_selection,
            snapshot.selection,
        ),
    ];

    for (kind, enabled, position) in candidates {
        if !enabled {
            continue;
        }
        if let Some(ax) = position {
            let local = ax.to_display(map);
            if region.contains(local) {
                return Some(Trigger {
                    kind,
                    position: local,
                });
            }
        }
    }

    None
}
