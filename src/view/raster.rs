//! Software render target.
//!
//! [`RasterTarget`] keeps the items the renderer places and can flatten any
//! level-0 rectangle of the scene into an RGB image. Used by the headless
//! driver and by tests; a GUI host would implement [`RenderTarget`] on its
//! own scene graph instead.

use std::collections::HashMap;

use image::{Rgb, RgbImage};

use crate::geometry::Rect;
use crate::tile::TileImage;

use super::renderer::RenderTarget;

/// Scene background, painted where no tile covers the view.
pub const DEFAULT_BACKGROUND: Rgb<u8> = Rgb([43, 43, 43]);

/// One placed tile.
#[derive(Debug, Clone)]
pub struct RasterItem {
    pub image: TileImage,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub z_index: i32,
}

impl RasterItem {
    /// Level-0 area covered by the item.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            f64::from(self.image.width()) * self.scale,
            f64::from(self.image.height()) * self.scale,
        )
    }
}

/// In-memory scene of positioned tiles.
#[derive(Debug)]
pub struct RasterTarget {
    items: HashMap<u64, RasterItem>,
    next_handle: u64,
    background: Rgb<u8>,
}

impl RasterTarget {
    pub fn new() -> Self {
        Self::with_background(DEFAULT_BACKGROUND)
    }

    pub fn with_background(background: Rgb<u8>) -> Self {
        Self {
            items: HashMap::new(),
            next_handle: 0,
            background,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, handle: u64) -> Option<&RasterItem> {
        self.items.get(&handle)
    }

    pub fn items(&self) -> impl Iterator<Item = &RasterItem> {
        self.items.values()
    }

    /// Paint `view_rect` into an `out_width x out_height` image.
    ///
    /// Items are painted in ascending z order (insertion order within one z)
    /// with nearest-neighbour sampling.
    pub fn compose(&self, view_rect: &Rect, out_width: u32, out_height: u32) -> RgbImage {
        let mut out = RgbImage::from_pixel(out_width, out_height, self.background);
        if view_rect.is_empty() || out_width == 0 || out_height == 0 {
            return out;
        }

        let sx = f64::from(out_width) / view_rect.width;
        let sy = f64::from(out_height) / view_rect.height;

        let mut order: Vec<(&u64, &RasterItem)> = self
            .items
            .iter()
            .filter(|(_, item)| item.bounds().intersects(view_rect))
            .collect();
        order.sort_by_key(|(handle, item)| (item.z_index, **handle));

        for (_, item) in order {
            let bounds = item.bounds();
            let px0 = ((bounds.left() - view_rect.left()) * sx).floor().max(0.0) as u32;
            let py0 = ((bounds.top() - view_rect.top()) * sy).floor().max(0.0) as u32;
            let px1 = ((bounds.right() - view_rect.left()) * sx)
                .ceil()
                .clamp(0.0, f64::from(out_width)) as u32;
            let py1 = ((bounds.bottom() - view_rect.top()) * sy)
                .ceil()
                .clamp(0.0, f64::from(out_height)) as u32;

            for py in py0..py1 {
                let scene_y = view_rect.top() + (f64::from(py) + 0.5) / sy;
                let src_y = ((scene_y - item.y) / item.scale).floor();
                if src_y < 0.0 || src_y >= f64::from(item.image.height()) {
                    continue;
                }
                for px in px0..px1 {
                    let scene_x = view_rect.left() + (f64::from(px) + 0.5) / sx;
                    let src_x = ((scene_x - item.x) / item.scale).floor();
                    if src_x < 0.0 || src_x >= f64::from(item.image.width()) {
                        continue;
                    }
                    let pixel = *item.image.get_pixel(src_x as u32, src_y as u32);
                    out.put_pixel(px, py, pixel);
                }
            }
        }

        out
    }
}

impl Default for RasterTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTarget for RasterTarget {
    type Handle = u64;

    fn render_tile(&mut self, image: TileImage, x: f64, y: f64, scale: f64, z_index: i32) -> u64 {
        self.next_handle += 1;
        self.items.insert(
            self.next_handle,
            RasterItem {
                image,
                x,
                y,
                scale,
                z_index,
            },
        );
        self.next_handle
    }

    fn remove_tile(&mut self, handle: u64) {
        self.items.remove(&handle);
    }
}
