//! Viewport camera.
//!
//! Tracks what part of the level-0 scene is on screen. The camera is a
//! window of `width x height` screen pixels centred on a level-0 point, at a
//! zoom expressed in screen pixels per level-0 pixel.

use crate::geometry::Rect;

/// Zoom/pan state of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: u32,
    height: u32,
    center: (f64, f64),
    zoom: f64,
}

impl Viewport {
    /// A `width x height` view at zoom 1 with the scene origin at the top-left
    /// corner.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            center: (f64::from(width) / 2.0, f64::from(height) / 2.0),
            zoom: 1.0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Level-0 point at the centre of the view.
    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// The visible rectangle in level-0 pixels.
    pub fn visible_rect(&self) -> Rect {
        let w = f64::from(self.width) / self.zoom;
        let h = f64::from(self.height) / self.zoom;
        Rect::new(self.center.0 - w / 2.0, self.center.1 - h / 2.0, w, h)
    }

    /// Screen position to level-0 position.
    pub fn map_to_scene(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.center.0 + (px - f64::from(self.width) / 2.0) / self.zoom,
            self.center.1 + (py - f64::from(self.height) / 2.0) / self.zoom,
        )
    }

    /// Level-0 position to screen position.
    pub fn map_from_scene(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.center.0) * self.zoom + f64::from(self.width) / 2.0,
            (y - self.center.1) * self.zoom + f64::from(self.height) / 2.0,
        )
    }

    /// Drag the scene by `(dx, dy)` screen pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center.0 -= dx / self.zoom;
        self.center.1 -= dy / self.zoom;
    }

    /// Change the zoom.
    ///
    /// With an anchor (screen position), the scene point under the anchor
    /// stays put; without one the centre stays put. Non-positive or
    /// non-finite zooms are ignored.
    pub fn zoom_to(&mut self, zoom: f64, anchor: Option<(f64, f64)>) {
        if !(zoom.is_finite() && zoom > 0.0) {
            return;
        }
        match anchor {
            Some((ax, ay)) => {
                let (sx, sy) = self.map_to_scene(ax, ay);
                self.zoom = zoom;
                self.center = (
                    sx - (ax - f64::from(self.width) / 2.0) / zoom,
                    sy - (ay - f64::from(self.height) / 2.0) / zoom,
                );
            }
            None => self.zoom = zoom,
        }
    }

    /// Fit a `width x height` level-0 image in the view, keeping its aspect
    /// ratio, and centre it. Returns the new zoom.
    pub fn fit(&mut self, width: u64, height: u64) -> f64 {
        if width == 0 || height == 0 || self.width == 0 || self.height == 0 {
            return self.zoom;
        }
        let (w, h) = (width as f64, height as f64);
        self.zoom = (f64::from(self.width) / w).min(f64::from(self.height) / h);
        self.center = (w / 2.0, h / 2.0);
        self.zoom
    }

    /// Resize the view, keeping the centre and zoom.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Centre the view on a level-0 point.
    pub fn center_on(&mut self, x: f64, y: f64) {
        self.center = (x, y);
    }
}
