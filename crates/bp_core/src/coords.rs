//! Conversions between the three coordinate spaces the simulation touches.
//!
//! - **Screen space:** pixels, origin top-left, y grows downward. Cursor input
//!   and spawn requests arrive here.
//! - **Physics space:** meters, same orientation as screen space, scaled by a
//!   fixed [`UnitScale`].
//! - **Device space:** `[-1, 1]` on both axes, y grows upward. This is what the
//!   vertex shader consumes.

use glam::Vec2;

/// Logical screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }
}

/// Maps a screen position to device space.
pub fn to_device_space(screen: Vec2, viewport: Viewport) -> Vec2 {
    Vec2::new(
        (screen.x / viewport.width) * 2.0 - 1.0,
        1.0 - (screen.y / viewport.height) * 2.0,
    )
}

/// Scales a pixel length into device units along one axis.
pub fn size_to_device_space(length: f32, dimension: f32) -> f32 {
    (length / dimension) * 2.0
}

/// Per-axis device size of a pixel length. Width and height scale independently,
/// so a non-square viewport stretches shapes with it.
pub fn size_to_device(length: f32, viewport: Viewport) -> Vec2 {
    Vec2::new(
        size_to_device_space(length, viewport.width),
        size_to_device_space(length, viewport.height),
    )
}

/// Rescales a cursor position on the live (possibly resized) surface back into
/// the fixed logical screen space.
pub fn surface_to_screen(cursor: Vec2, surface_size: (u32, u32), viewport: Viewport) -> Vec2 {
    let (w, h) = surface_size;
    if w == 0 || h == 0 {
        return cursor;
    }
    Vec2::new(
        cursor.x * viewport.width / w as f32,
        cursor.y * viewport.height / h as f32,
    )
}

/// Linear pixel/meter conversion. Both directions use the same constant, so a
/// round trip only loses float precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScale {
    pub pixels_per_meter: f32,
}

impl UnitScale {
    pub fn new(pixels_per_meter: f32) -> Self {
        Self { pixels_per_meter }
    }

    pub fn pixels_to_meters(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_meter
    }

    pub fn meters_to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixels_per_meter
    }

    pub fn vec_to_meters(&self, pixels: Vec2) -> Vec2 {
        pixels / self.pixels_per_meter
    }

    pub fn vec_to_pixels(&self, meters: Vec2) -> Vec2 {
        meters * self.pixels_per_meter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    fn vp() -> Viewport {
        Viewport::new(800.0, 600.0)
    }

    fn assert_vec_eq(a: Vec2, b: Vec2) {
        assert!((a - b).length() < EPS, "{a:?} != {b:?}");
    }

    #[test]
    fn corners_map_to_device_corners() {
        assert_vec_eq(to_device_space(Vec2::new(0.0, 0.0), vp()), Vec2::new(-1.0, 1.0));
        assert_vec_eq(to_device_space(Vec2::new(800.0, 0.0), vp()), Vec2::new(1.0, 1.0));
        assert_vec_eq(to_device_space(Vec2::new(0.0, 600.0), vp()), Vec2::new(-1.0, -1.0));
        assert_vec_eq(to_device_space(Vec2::new(800.0, 600.0), vp()), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn center_maps_to_origin() {
        assert_vec_eq(to_device_space(vp().center(), vp()), Vec2::ZERO);
    }

    #[test]
    fn interior_points_stay_in_unit_square() {
        for xi in 0..=16 {
            for yi in 0..=12 {
                let p = Vec2::new(xi as f32 * 50.0, yi as f32 * 50.0);
                let d = to_device_space(p, vp());
                assert!((-1.0..=1.0).contains(&d.x), "x out of range for {p:?}");
                assert!((-1.0..=1.0).contains(&d.y), "y out of range for {p:?}");
            }
        }
    }

    #[test]
    fn size_scales_each_axis_independently() {
        let s = size_to_device(4.0, vp());
        assert!((s.x - 0.01).abs() < EPS);
        assert!((s.y - 8.0 / 600.0).abs() < EPS);
        assert!((size_to_device_space(400.0, 800.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn meters_pixels_round_trip() {
        let scale = UnitScale::new(30.0);
        for x in [-1234.5f32, -1.0, 0.0, 0.001, 3.75, 400.0, 1.0e6] {
            let back = scale.pixels_to_meters(scale.meters_to_pixels(x));
            assert!((back - x).abs() <= x.abs() * 1e-6 + 1e-6, "{x} -> {back}");
        }
        let v = Vec2::new(400.0, 300.0);
        assert_vec_eq(scale.vec_to_pixels(scale.vec_to_meters(v)), v);
    }

    #[test]
    fn surface_to_screen_undoes_resize_stretch() {
        let p = surface_to_screen(Vec2::new(800.0, 600.0), (1600, 1200), vp());
        assert_vec_eq(p, Vec2::new(400.0, 300.0));
        // Zero-sized surface (minimized) leaves the cursor untouched.
        let q = surface_to_screen(Vec2::new(5.0, 6.0), (0, 0), vp());
        assert_vec_eq(q, Vec2::new(5.0, 6.0));
    }
}
