//! Mapping between image space (pixels of the base image) and display space
//! (pixels of the scaled on-screen view).
//!
//! There is exactly one scale factor per session. It is derived from the base
//! image width and the host viewport width and is recomputed on every base
//! load and viewport resize; nothing else writes it.

use serde::Serialize;

use crate::config::EngineConfig;

/// Narrowest display the scale computation will produce.
const MIN_DISPLAY_WIDTH: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clockwise rotation about `center` in a y-down space, the same sense
    /// the compositor draws rotated elements in.
    pub fn rotated_about(self, center: Point, degrees: f32) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(
            center.x + dx * cos - dy * sin,
            center.y + dx * sin + dy * cos,
        )
    }
}

/// Axis-aligned rectangle; which space it lives in is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Shrinks the rectangle uniformly until it fits a `width` x `height`
    /// area anchored at the origin, then slides it inside.
    pub fn fit_within(self, width: f32, height: f32) -> Rect {
        let own_width = self.width.max(0.0);
        let own_height = self.height.max(0.0);
        let mut shrink = 1.0_f32;
        if own_width > width {
            shrink = shrink.min(width / own_width);
        }
        if own_height > height {
            shrink = shrink.min(height / own_height);
        }
        let fitted_width = own_width * shrink;
        let fitted_height = own_height * shrink;
        Rect::new(
            self.x.clamp(0.0, (width - fitted_width).max(0.0)),
            self.y.clamp(0.0, (height - fitted_height).max(0.0)),
            fitted_width,
            fitted_height,
        )
    }
}

/// `min(max_display_width, viewport_width - margin) / image_width`.
pub fn compute_scale(image_width: u32, viewport_width: f32, config: &EngineConfig) -> f32 {
    let available = (viewport_width - config.viewport_margin).max(MIN_DISPLAY_WIDTH);
    let display_width = config.max_display_width.min(available);
    display_width / image_width.max(1) as f32
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    image_width: u32,
    image_height: u32,
    viewport_width: f32,
    scale: f32,
}

impl Viewport {
    pub fn new(
        image_width: u32,
        image_height: u32,
        viewport_width: f32,
        config: &EngineConfig,
    ) -> Self {
        Self {
            image_width,
            image_height,
            viewport_width,
            scale: compute_scale(image_width, viewport_width, config),
        }
    }

    /// Recompute the scale for a new viewport width. Returns whether it changed.
    pub fn resize(&mut self, viewport_width: f32, config: &EngineConfig) -> bool {
        let previous = self.scale;
        self.viewport_width = viewport_width;
        self.scale = compute_scale(self.image_width, viewport_width, config);
        previous != self.scale
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// Size of the overlay the host lays elements out in.
    pub fn overlay_size(&self) -> (f32, f32) {
        (
            self.image_width as f32 * self.scale,
            self.image_height as f32 * self.scale,
        )
    }

    pub fn to_display(&self, value: f32) -> f32 {
        value * self.scale
    }

    pub fn to_image(&self, value: f32) -> f32 {
        value / self.scale
    }

    pub fn rect_to_display(&self, rect: Rect) -> Rect {
        Rect::new(
            self.to_display(rect.x),
            self.to_display(rect.y),
            self.to_display(rect.width),
            self.to_display(rect.height),
        )
    }

    pub fn rect_to_image(&self, rect: Rect) -> Rect {
        Rect::new(
            self.to_image(rect.x),
            self.to_image(rect.y),
            self.to_image(rect.width),
            self.to_image(rect.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_scale, Point, Rect, Viewport};
    use crate::config::EngineConfig;

    #[test]
    fn wide_viewport_caps_display_at_800() {
        let config = EngineConfig::default();
        let viewport = Viewport::new(1000, 600, 1920.0, &config);
        assert!((viewport.scale() - 0.8).abs() < 1e-6);
        let (width, height) = viewport.overlay_size();
        assert!((width - 800.0).abs() < 1e-3);
        assert!((height - 480.0).abs() < 1e-3);
    }

    #[test]
    fn narrow_viewport_subtracts_margin() {
        let config = EngineConfig::default();
        let scale = compute_scale(1000, 480.0, &config);
        assert!((scale - 0.4).abs() < 1e-6);
    }

    #[test]
    fn small_images_are_scaled_up() {
        let config = EngineConfig::default();
        assert!((compute_scale(400, 1200.0, &config) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn viewport_narrower_than_margin_keeps_positive_scale() {
        let config = EngineConfig::default();
        let scale = compute_scale(500, 40.0, &config);
        assert!(scale > 0.0);
        assert!((scale - 1.0 / 500.0).abs() < 1e-9);
    }

    #[test]
    fn rect_round_trips_through_display_space() {
        let config = EngineConfig::default();
        let viewport = Viewport::new(1000, 600, 880.0, &config);
        let image = Rect::new(100.0, 100.0, 200.0, 100.0);
        let display = viewport.rect_to_display(image);
        assert!((display.x - 80.0).abs() < 1e-4);
        assert!((display.width - 160.0).abs() < 1e-4);
        let back = viewport.rect_to_image(display);
        assert!((back.height - 100.0).abs() < 1e-4);
    }

    #[test]
    fn fit_within_slides_and_shrinks_into_area() {
        let inside = Rect::new(100.0, 100.0, 200.0, 100.0).fit_within(1000.0, 600.0);
        assert_eq!(inside, Rect::new(100.0, 100.0, 200.0, 100.0));

        let far = Rect::new(5000.0, 4000.0, 200.0, 100.0).fit_within(1000.0, 600.0);
        assert_eq!(far, Rect::new(800.0, 500.0, 200.0, 100.0));

        let huge = Rect::new(-30.0, 10.0, 2000.0, 500.0).fit_within(1000.0, 600.0);
        assert_eq!(huge, Rect::new(0.0, 10.0, 1000.0, 250.0));
    }

    #[test]
    fn quarter_turn_moves_points_clockwise() {
        let center = Point::new(160.0, 120.0);
        let turned = Point::new(240.0, 120.0).rotated_about(center, 90.0);
        assert!((turned.x - 160.0).abs() < 1e-3);
        assert!((turned.y - 200.0).abs() < 1e-3);
    }

    #[test]
    fn resize_reports_scale_change() {
        let config = EngineConfig::default();
        let mut viewport = Viewport::new(1000, 600, 880.0, &config);
        assert!(!viewport.resize(1200.0, &config), "still capped at 800");
        assert!(viewport.resize(580.0, &config));
        assert!((viewport.scale() - 0.5).abs() < 1e-6);
    }
}
