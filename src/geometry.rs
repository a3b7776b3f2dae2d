//! Type-safe coordinate spaces for capture and overlay geometry.
//!
//! Four spaces appear in the engine:
//!
//! ```text
//! ScreenSpace (global, bottom-left, y-up)
//!      ↕ flip about the global height
//! AxSpace (global, top-left, y-down)
//!      ↕ translate by display origin        ↕ translate by window origin
//! DisplaySpace (display-local)          WindowSpace (overlay-local)
//! ```
//!
//! Each space is a phantom type, so coordinates from different spaces cannot
//! be mixed at compile time. All conversions go through a [`CoordinateMap`]
//! built from display metadata at capture start; the map holds no mutable
//! state and every conversion is a pure function.

use std::ops::{Add, Div, Mul, Sub};

/// Global coordinates as the window server reports them.
/// `(0, 0)` is the bottom-left of the primary display, y increases upward.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenSpace;

/// Global coordinates as accessibility APIs report them.
/// `(0, 0)` is the top-left of the primary display, y increases downward.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxSpace;

/// Coordinates local to a single display.
/// `(0, 0)` is the top-left of that display. Crop rectangles and the
/// capture region live here.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySpace;

/// Coordinates local to the overlay window.
/// `(0, 0)` is the top-left of the overlay. Everything handed to an
/// overlay sink lives here.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSpace;

/// A 2D coordinate with an associated coordinate space.
///
/// The phantom type `TSpace` ensures coordinates from different spaces
/// cannot be mixed without explicit conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: std::marker::PhantomData<TSpace>,
}

impl<TSpace: Default> Coord<TSpace> {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: std::marker::PhantomData,
        }
    }

    /// Clamp both components between the given corners.
    pub fn clamp(self, min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self::new(self.x.clamp(min.x, max.x), self.y.clamp(min.y, max.y))
    }

    /// Interpolate toward `other` by `t` in [0, 1].
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// Arithmetic stays inside one space

impl<T: Default> Add for Coord<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<T: Default> Sub for Coord<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<T: Default> Mul<f64> for Coord<T> {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl<T: Default> Div<f64> for Coord<T> {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Self::new(self.x / scalar, self.y / scalar)
    }
}

/// Size in a specific coordinate space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size<TSpace> {
    pub width: f64,
    pub height: f64,
    _space: std::marker::PhantomData<TSpace>,
}

impl<TSpace: Default> Size<TSpace> {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            _space: std::marker::PhantomData,
        }
    }

    pub fn from_u32(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// A rectangular region in a specific coordinate space.
///
/// The origin is the corner nearest the space's own origin: bottom-left in
/// [`ScreenSpace`], top-left everywhere else. Conversions account for this.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect<TSpace> {
    pub origin: Coord<TSpace>,
    pub size: Size<TSpace>,
    _space: std::marker::PhantomData<TSpace>,
}

impl<TSpace: Default + Copy> Rect<TSpace> {
    pub fn new(origin: Coord<TSpace>, size: Size<TSpace>) -> Self {
        Self {
            origin,
            size,
            _space: std::marker::PhantomData,
        }
    }

    pub fn from_coords(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(Coord::new(x, y), Size::new(width, height))
    }

    pub fn top_left(&self) -> Coord<TSpace> {
        self.origin
    }

    pub fn bottom_right(&self) -> Coord<TSpace> {
        Coord::new(
            self.origin.x + self.size.width,
            self.origin.y + self.size.height,
        )
    }

    pub fn center(&self) -> Coord<TSpace> {
        Coord::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn contains(&self, point: Coord<TSpace>) -> bool {
        point.x >= self.origin.x
            && point.x <= self.origin.x + self.size.width
            && point.y >= self.origin.y
            && point.y <= self.origin.y + self.size.height
    }

    pub fn contains_rect(&self, other: &Rect<TSpace>) -> bool {
        self.contains(other.top_left()) && self.contains(other.bottom_right())
    }

    /// Shrink the rect by a margin on each side. Collapses to zero size
    /// rather than inverting when the margin exceeds half the extent.
    pub fn inset(&self, dx: f64, dy: f64) -> Self {
        Self::from_coords(
            self.origin.x + dx,
            self.origin.y + dy,
            (self.size.width - dx * 2.0).max(0.0),
            (self.size.height - dy * 2.0).max(0.0),
        )
    }

    /// Translate the rect the minimal distance so it lies inside `outer`.
    /// Size is preserved; a rect larger than `outer` pins to `outer`'s origin.
    pub fn clamp_within(&self, outer: &Rect<TSpace>) -> Self {
        let max_x = (outer.origin.x + outer.size.width - self.size.width).max(outer.origin.x);
        let max_y = (outer.origin.y + outer.size.height - self.size.height).max(outer.origin.y);
        Self::new(
            Coord::new(
                self.origin.x.clamp(outer.origin.x, max_x),
                self.origin.y.clamp(outer.origin.y, max_y),
            ),
            self.size,
        )
    }
}

// ============================================================================
// Space Conversions
// ============================================================================

/// Display and window metadata needed for coordinate transformations.
///
/// Built once at capture start from the active display; rebuilt only when
/// the capture target changes.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMap {
    /// Height of the global coordinate space (the primary display's height
    /// in points). The screen↔ax flip pivots on this.
    pub global_height: f64,
    /// Origin of the active display in global top-left coordinates.
    pub display_origin: Coord<AxSpace>,
    /// Size of the active display in points.
    pub display_size: Size<DisplaySpace>,
    /// Origin of the overlay window in global top-left coordinates.
    /// Defaults to the display origin (overlay covering the display).
    pub window_origin: Coord<AxSpace>,
}

impl CoordinateMap {
    pub fn new(
        global_height: f64,
        display_origin: Coord<AxSpace>,
        display_size: Size<DisplaySpace>,
    ) -> Self {
        Self {
            global_height,
            display_origin,
            display_size,
            window_origin: display_origin,
        }
    }

    /// Use a window origin other than the display origin.
    pub fn with_window_origin(mut self, origin: Coord<AxSpace>) -> Self {
        self.window_origin = origin;
        self
    }

    /// Full bounds of the active display in its own local space.
    pub fn display_bounds(&self) -> Rect<DisplaySpace> {
        Rect::from_coords(0.0, 0.0, self.display_size.width, self.display_size.height)
    }
}

// Screen space conversions
impl Coord<ScreenSpace> {
    /// Flip the y axis about the global height.
    pub fn to_ax(&self, map: &CoordinateMap) -> Coord<AxSpace> {
        Coord::new(self.x, map.global_height - self.y)
    }

    pub fn to_display(&self, map: &CoordinateMap) -> Coord<DisplaySpace> {
        self.to_ax(map).to_display(map)
    }
}

// Accessibility (global top-left) space conversions
impl Coord<AxSpace> {
    pub fn to_screen(&self, map: &CoordinateMap) -> Coord<ScreenSpace> {
        Coord::new(self.x, map.global_height - self.y)
    }

    pub fn to_display(&self, map: &CoordinateMap) -> Coord<DisplaySpace> {
        Coord::new(self.x - map.display_origin.x, self.y - map.display_origin.y)
    }

    pub fn to_window(&self, map: &CoordinateMap) -> Coord<WindowSpace> {
        Coord::new(self.x - map.window_origin.x, self.y - map.window_origin.y)
    }
}

// Display-local space conversions
impl Coord<DisplaySpace> {
    pub fn to_ax(&self, map: &CoordinateMap) -> Coord<AxSpace> {
        Coord::new(self.x + map.display_origin.x, self.y + map.display_origin.y)
    }

    pub fn to_screen(&self, map: &CoordinateMap) -> Coord<ScreenSpace> {
        self.to_ax(map).to_screen(map)
    }

    pub fn to_window(&self, map: &CoordinateMap) -> Coord<WindowSpace> {
        self.to_ax(map).to_window(map)
    }
}

// Rect conversions. The screen↔ax flip moves the rect origin to the
// opposite vertical corner, so the rect variants cannot reuse the point
// math verbatim.
impl Rect<ScreenSpace> {
    pub fn to_ax(&self, map: &CoordinateMap) -> Rect<AxSpace> {
        Rect::from_coords(
            self.origin.x,
            map.global_height - self.origin.y - self.size.height,
            self.size.width,
            self.size.height,
        )
    }

    pub fn to_display(&self, map: &CoordinateMap) -> Rect<DisplaySpace> {
        let ax = self.to_ax(map);
        let origin = ax.origin.to_display(map);
        Rect::new(origin, Size::new(self.size.width, self.size.height))
    }
}

impl Rect<AxSpace> {
    pub fn to_screen(&self, map: &CoordinateMap) -> Rect<ScreenSpace> {
        Rect::from_coords(
            self.origin.x,
            map.global_height - self.origin.y - self.size.height,
            self.size.width,
            self.size.height,
        )
    }

    pub fn to_display(&self, map: &CoordinateMap) -> Rect<DisplaySpace> {
        let origin = self.origin.to_display(map);
        Rect::new(origin, Size::new(self.size.width, self.size.height))
    }
}

impl Rect<DisplaySpace> {
    pub fn to_ax(&self, map: &CoordinateMap) -> Rect<AxSpace> {
        let origin = self.origin.to_ax(map);
        Rect::new(origin, Size::new(self.size.width, self.size.height))
    }

    pub fn to_screen(&self, map: &CoordinateMap) -> Rect<ScreenSpace> {
        self.to_ax(map).to_screen(map)
    }

    pub fn to_window(&self, map: &CoordinateMap) -> Rect<WindowSpace> {
        let origin = self.origin.to_window(map);
        Rect::new(origin, Size::new(self.size.width, self.size.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary_map() -> CoordinateMap {
        // Single 1920x1080 display, overlay covering it.
        CoordinateMap::new(
            1080.0,
            Coord::new(0.0, 0.0),
            Size::new(1920.0, 1080.0),
        )
    }

    fn secondary_map() -> CoordinateMap {
        // Secondary 1440x900 display to the right of a 1920x1080 primary.
        CoordinateMap::new(
            1080.0,
            Coord::new(1920.0, 180.0),
            Size::new(1440.0, 900.0),
        )
    }

    #[test]
    fn test_screen_to_ax_flips_y() {
        let map = primary_map();

        // Bottom of the screen in y-up coords is the global height in y-down.
        let bottom = Coord::<ScreenSpace>::new(100.0, 0.0);
        let ax = bottom.to_ax(&map);
        assert!((ax.x - 100.0).abs() < 0.001);
        assert!((ax.y - 1080.0).abs() < 0.001);

        let top = Coord::<ScreenSpace>::new(100.0, 1080.0);
        let ax = top.to_ax(&map);
        assert!((ax.y - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_screen_ax_round_trip() {
        let map = primary_map();
        let original = Coord::<ScreenSpace>::new(640.0, 333.0);
        let back = original.to_ax(&map).to_screen(&map);
        assert!((back.x - original.x).abs() < 0.001);
        assert!((back.y - original.y).abs() < 0.001);
    }

    #[test]
    fn test_ax_to_display_translates() {
        let map = secondary_map();
        let ax = Coord::<AxSpace>::new(1920.0, 180.0);
        let local = ax.to_display(&map);
        assert!((local.x - 0.0).abs() < 0.001);
        assert!((local.y - 0.0).abs() < 0.001);

        let ax = Coord::<AxSpace>::new(2000.0, 500.0);
        let local = ax.to_display(&map);
        assert!((local.x - 80.0).abs() < 0.001);
        assert!((local.y - 320.0).abs() < 0.001);
    }

    #[test]
    fn test_screen_display_round_trip_point() {
        let map = secondary_map();
        let original = Coord::<ScreenSpace>::new(2500.0, 400.0);
        let back = original.to_display(&map).to_screen(&map);
        assert!((back.x - original.x).abs() < 0.001);
        assert!((back.y - original.y).abs() < 0.001);
    }

    #[test]
    fn test_screen_display_round_trip_rect() {
        let map = secondary_map();
        let original = Rect::<ScreenSpace>::from_coords(2100.0, 200.0, 640.0, 360.0);
        let back = original.to_display(&map).to_screen(&map);
        assert!((back.origin.x - original.origin.x).abs() < 0.001);
        assert!((back.origin.y - original.origin.y).abs() < 0.001);
        assert!((back.size.width - original.size.width).abs() < 0.001);
        assert!((back.size.height - original.size.height).abs() < 0.001);
    }

    #[test]
    fn test_rect_flip_moves_origin_corner() {
        let map = primary_map();

        // A rect hugging the bottom of the screen in y-up coords sits at the
        // bottom of the ax space, so its top-left origin is height-600.
        let screen = Rect::<ScreenSpace>::from_coords(0.0, 0.0, 800.0, 600.0);
        let ax = screen.to_ax(&map);
        assert!((ax.origin.x - 0.0).abs() < 0.001);
        assert!((ax.origin.y - 480.0).abs() < 0.001);
        assert!((ax.size.height - 600.0).abs() < 0.001);
    }

    #[test]
    fn test_window_space_offset() {
        let map = primary_map().with_window_origin(Coord::new(100.0, 50.0));
        let ax = Coord::<AxSpace>::new(150.0, 80.0);
        let win = ax.to_window(&map);
        assert!((win.x - 50.0).abs() < 0.001);
        assert!((win.y - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_display_rect_to_window() {
        let map = secondary_map();
        let crop = Rect::<DisplaySpace>::from_coords(10.0, 20.0, 400.0, 300.0);
        let win = crop.to_window(&map);
        // Overlay origin defaults to the display origin, so local == window.
        assert!((win.origin.x - 10.0).abs() < 0.001);
        assert!((win.origin.y - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_clamp_within_moves_rect_inside() {
        let bounds = Rect::<DisplaySpace>::from_coords(0.0, 0.0, 1920.0, 1080.0);

        let past_right = Rect::<DisplaySpace>::from_coords(1800.0, 100.0, 400.0, 300.0);
        let clamped = past_right.clamp_within(&bounds);
        assert!((clamped.origin.x - 1520.0).abs() < 0.001);
        assert!((clamped.origin.y - 100.0).abs() < 0.001);

        let past_top_left = Rect::<DisplaySpace>::from_coords(-50.0, -20.0, 400.0, 300.0);
        let clamped = past_top_left.clamp_within(&bounds);
        assert!((clamped.origin.x - 0.0).abs() < 0.001);
        assert!((clamped.origin.y - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_clamp_within_oversized_pins_to_origin() {
        let bounds = Rect::<DisplaySpace>::from_coords(0.0, 0.0, 1920.0, 1080.0);
        let huge = Rect::<DisplaySpace>::from_coords(500.0, 500.0, 4000.0, 3000.0);
        let clamped = huge.clamp_within(&bounds);
        assert!((clamped.origin.x - 0.0).abs() < 0.001);
        assert!((clamped.origin.y - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_inset_and_containment() {
        let rect = Rect::<DisplaySpace>::from_coords(0.0, 0.0, 100.0, 100.0);
        let inner = rect.inset(10.0, 10.0);
        assert!((inner.origin.x - 10.0).abs() < 0.001);
        assert!((inner.size.width - 80.0).abs() < 0.001);

        assert!(rect.contains_rect(&inner));
        assert!(!inner.contains_rect(&rect));
        assert!(inner.contains(Coord::new(50.0, 50.0)));
        assert!(!inner.contains(Coord::new(5.0, 50.0)));
    }

    #[test]
    fn test_inset_collapses_instead_of_inverting() {
        let rect = Rect::<DisplaySpace>::from_coords(0.0, 0.0, 10.0, 10.0);
        let inner = rect.inset(20.0, 20.0);
        assert!((inner.size.width - 0.0).abs() < 0.001);
        assert!((inner.size.height - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_arithmetic_stays_in_space() {
        let a = Coord::<DisplaySpace>::new(12.0, 18.0);
        let b = Coord::<DisplaySpace>::new(3.0, 6.0);

        let sum = a + b;
        assert!((sum.x - 15.0).abs() < 0.001);
        assert!((sum.y - 24.0).abs() < 0.001);

        let diff = a - b;
        assert!((diff.x - 9.0).abs() < 0.001);
        assert!((diff.y - 12.0).abs() < 0.001);

        let scaled = b * 2.0;
        assert!((scaled.x - 6.0).abs() < 0.001);
        assert!((scaled.y - 12.0).abs() < 0.001);

        let halved = b / 2.0;
        assert!((halved.x - 1.5).abs() < 0.001);
        assert!((halved.y - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_lerp_walks_the_segment() {
        let a = Coord::<DisplaySpace>::new(0.0, 0.0);
        let b = Coord::<DisplaySpace>::new(200.0, 80.0);

        let quarter = a.lerp(b, 0.25);
        assert!((quarter.x - 50.0).abs() < 0.001);
        assert!((quarter.y - 20.0).abs() < 0.001);

        let stay = a.lerp(b, 0.0);
        assert!((stay.x - 0.0).abs() < 0.001);
        let land = a.lerp(b, 1.0);
        assert!((land.x - 200.0).abs() < 0.001);
    }
}
