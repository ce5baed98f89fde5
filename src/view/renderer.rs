//! Viewport renderer.
//!
//! Keeps the set of tiles shown on a [`RenderTarget`] in step with the
//! viewport camera and the tile cache.
//!
//! # Level Transitions
//!
//! Tiles are retained by coverage. When the zoom crosses a stage boundary the
//! tiles of the previous level stay on screen underneath the new level
//! (higher resolution tiles get a higher z-index) and are only removed once
//! every new-level tile that overlaps them is displayed. The view therefore
//! never flashes empty while the new level streams in.
//!
//! ```text
//!   input ──► Viewport ──► update_field_of_view ──► TileManager::load_tiles_for_view
//!                                 │
//!                                 ▼
//!                           render pass ◄── on_tiles_updated ◄── TileListener channel
//!                         (add cached tiles,
//!                          remove covered / far tiles)
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::error::TileError;
use crate::geometry::{tile_bounds, tile_origin, Rect, TileRange};
use crate::slide::{open_slide, SlideInfo, SlideReader};
use crate::tile::{TileImage, TileKey, TileManager, TileManagerConfig, WORKER_POLL_INTERVAL};

use super::viewport::Viewport;

/// Tiles of slack kept around the visible range before active-level tiles
/// are removed.
pub const REMOVAL_SLACK_TILES: u32 = 2;

/// Z-index of level 0; each coarser level sits one below.
pub const BASE_Z_INDEX: i32 = 10;

pub const DEFAULT_MIN_ZOOM: f64 = 0.01;
pub const DEFAULT_MAX_ZOOM: f64 = 40.0;
pub const DEFAULT_ZOOM_STEP: f64 = 1.2;

// =============================================================================
// Collaborators
// =============================================================================

/// A surface that displays positioned tile images.
///
/// Positions and scale are in level-0 pixels: a tile drawn at `(x, y)` with
/// `scale` covers `image_width * scale` level-0 pixels.
pub trait RenderTarget {
    type Handle;

    fn render_tile(
        &mut self,
        image: TileImage,
        x: f64,
        y: f64,
        scale: f64,
        z_index: i32,
    ) -> Self::Handle;

    fn remove_tile(&mut self, handle: Self::Handle);
}

/// Host notifications (status bar, zoom widgets, minimap).
pub trait StatusSink {
    fn show_message(&self, _message: &str) {}

    fn zoom_changed(&self, _zoom: f64) {}

    fn field_of_view_changed(&self, _view_rect: &Rect, _level: u32) {}
}

/// Status sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatus;

impl StatusSink for NoopStatus {}

/// Zoom limits and step of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            zoom_step: DEFAULT_ZOOM_STEP,
        }
    }
}

impl ViewConfig {
    /// Check the settings.
    pub fn validate(&self) -> Result<(), TileError> {
        if !(self.min_zoom.is_finite() && self.min_zoom > 0.0) {
            return Err(TileError::InvalidConfig(
                "min_zoom must be a positive number".to_string(),
            ));
        }
        if !(self.max_zoom.is_finite() && self.max_zoom >= self.min_zoom) {
            return Err(TileError::InvalidConfig(
                "max_zoom must be at least min_zoom".to_string(),
            ));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 1.0) {
            return Err(TileError::InvalidConfig(
                "zoom_step must be greater than 1".to_string(),
            ));
        }
        Ok(())
    }

    fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Drives a [`RenderTarget`] from user input and tile completions.
///
/// Must live on the UI thread. Completions from the loader threads arrive
/// through a channel and are applied by [`ViewportRenderer::poll_updates`].
pub struct ViewportRenderer<T: RenderTarget> {
    target: T,
    status: Box<dyn StatusSink>,
    viewport: Viewport,
    view_config: ViewConfig,
    tile_config: TileManagerConfig,
    manager: Option<TileManager>,
    notifier: Sender<TileKey>,
    updates: Receiver<TileKey>,
    active_level: Option<u32>,
    displayed: HashMap<TileKey, T::Handle>,
}

impl<T: RenderTarget> ViewportRenderer<T> {
    /// Create a renderer for a `width x height` view with default settings.
    pub fn new(target: T, width: u32, height: u32) -> Self {
        Self::with_config(
            target,
            width,
            height,
            ViewConfig::default(),
            TileManagerConfig::default(),
        )
    }

    /// Create a renderer with explicit settings.
    pub fn with_config(
        target: T,
        width: u32,
        height: u32,
        view_config: ViewConfig,
        tile_config: TileManagerConfig,
    ) -> Self {
        let (notifier, updates) = unbounded();
        Self {
            target,
            status: Box::new(NoopStatus),
            viewport: Viewport::new(width, height),
            view_config,
            tile_config,
            manager: None,
            notifier,
            updates,
            active_level: None,
            displayed: HashMap::new(),
        }
    }

    /// Route host notifications to `status`.
    pub fn set_status_sink(&mut self, status: Box<dyn StatusSink>) {
        self.status = status;
    }

    // -------------------------------------------------------------------------
    // Slide lifecycle
    // -------------------------------------------------------------------------

    /// Open a slide file and show it fitted to the view.
    ///
    /// The previous slide is closed only once the new one opened; on failure
    /// the current state is left untouched and the error is reported through
    /// the status sink.
    pub fn load_slide(&mut self, path: impl AsRef<Path>) -> Result<(), TileError> {
        let path = path.as_ref();
        match open_slide(path) {
            Ok(reader) => self.load_reader(reader),
            Err(err) => {
                let err = TileError::from(err);
                self.status
                    .show_message(&format!("Failed to load slide: {}", err));
                Err(err)
            }
        }
    }

    /// Show an already opened slide fitted to the view.
    pub fn load_reader(&mut self, reader: Arc<dyn SlideReader>) -> Result<(), TileError> {
        let listener = Arc::new(self.notifier.clone());
        let manager = match TileManager::open(reader, self.tile_config.clone(), listener) {
            Ok(manager) => manager,
            Err(err) => {
                self.status
                    .show_message(&format!("Failed to load slide: {}", err));
                return Err(err);
            }
        };

        self.close();
        let (width, height) = manager.level_dimensions(0);
        let levels = manager.level_count();
        self.manager = Some(manager);

        info!("Showing slide {}x{} with {} levels", width, height, levels);
        self.status.show_message(&format!(
            "Slide loaded: {}x{}, {} levels",
            width, height, levels
        ));
        self.fit_to_window();
        Ok(())
    }

    /// Remove every displayed tile and release the slide.
    pub fn close(&mut self) {
        for (_, handle) in self.displayed.drain() {
            self.target.remove_tile(handle);
        }
        if let Some(mut manager) = self.manager.take() {
            manager.close();
        }
        self.active_level = None;
        while self.updates.try_recv().is_ok() {}
    }

    // -------------------------------------------------------------------------
    // Camera
    // -------------------------------------------------------------------------

    /// Fit the whole slide into the view.
    pub fn fit_to_window(&mut self) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        let (width, height) = manager.level_dimensions(0);
        let zoom = self.viewport.fit(width, height);
        debug!("Fit {}x{} to window at zoom {:.4}", width, height, zoom);
        self.status.zoom_changed(zoom);
        self.update_field_of_view();
    }

    /// Set the zoom, clamped to the configured range.
    ///
    /// With an anchor (screen position) the image point under it stays fixed,
    /// otherwise the view centre does.
    pub fn set_zoom(&mut self, zoom: f64, anchor: Option<(f64, f64)>) {
        if self.manager.is_none() || !zoom.is_finite() {
            return;
        }
        let zoom = self.view_config.clamp(zoom);
        self.viewport.zoom_to(zoom, anchor);
        self.status.zoom_changed(zoom);
        self.update_field_of_view();
    }

    /// Zoom in by one step. No-op at the maximum zoom.
    pub fn zoom_in(&mut self, anchor: Option<(f64, f64)>) {
        let zoom = self.viewport.zoom();
        if zoom >= self.view_config.max_zoom {
            return;
        }
        self.set_zoom(zoom * self.view_config.zoom_step, anchor);
    }

    /// Zoom out by one step. No-op at the minimum zoom.
    pub fn zoom_out(&mut self, anchor: Option<(f64, f64)>) {
        let zoom = self.viewport.zoom();
        if zoom <= self.view_config.min_zoom {
            return;
        }
        self.set_zoom(zoom / self.view_config.zoom_step, anchor);
    }

    /// Mouse wheel: positive deltas zoom in, negative deltas zoom out.
    pub fn on_zoom(&mut self, wheel_delta: f64, anchor: Option<(f64, f64)>) {
        if wheel_delta > 0.0 {
            self.zoom_in(anchor);
        } else if wheel_delta < 0.0 {
            self.zoom_out(anchor);
        }
    }

    /// Drag by `(dx, dy)` screen pixels.
    pub fn on_pan(&mut self, dx: f64, dy: f64) {
        if self.manager.is_none() {
            return;
        }
        self.viewport.pan(dx, dy);
        self.update_field_of_view();
    }

    /// The view was resized.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
        self.update_field_of_view();
    }

    /// Centre the view on a level-0 point (minimap click).
    pub fn center_on(&mut self, x: f64, y: f64) {
        if self.manager.is_none() {
            return;
        }
        self.viewport.center_on(x, y);
        self.update_field_of_view();
    }

    /// Report the image coordinates under the cursor.
    pub fn on_mouse_move(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        self.manager.as_ref()?;
        let (x, y) = self.viewport.map_to_scene(px, py);
        self.status
            .show_message(&format!("Image coordinates: ({:.0}, {:.0})", x, y));
        Some((x, y))
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Recompute the visible rect and level, request loads, then render.
    pub fn update_field_of_view(&mut self) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        let view_rect = self.viewport.visible_rect();
        let level = manager.get_stage_level(self.viewport.zoom());

        if self.active_level != Some(level) {
            debug!(
                "Level change: {:?} -> {} at zoom {:.4}",
                self.active_level,
                level,
                self.viewport.zoom()
            );
            self.active_level = Some(level);
        }

        self.status.field_of_view_changed(&view_rect, level);
        manager.load_tiles_for_view(&view_rect, level);
        self.render_pass();
    }

    /// Render newly cached tiles and drop tiles that are no longer needed.
    /// Issues no loads.
    pub fn on_tiles_updated(&mut self) {
        self.render_pass();
    }

    /// Apply pending completion notifications. Returns how many arrived.
    pub fn poll_updates(&mut self) -> usize {
        let count = self.updates.try_iter().count();
        if count > 0 {
            self.render_pass();
        }
        count
    }

    /// Block up to `timeout` for a completion, then apply everything pending.
    /// Returns `false` on timeout.
    pub fn wait_for_updates(&mut self, timeout: Duration) -> bool {
        if self.updates.recv_timeout(timeout).is_err() {
            return false;
        }
        self.updates.try_iter().for_each(drop);
        self.render_pass();
        true
    }

    /// Apply completions until no load is outstanding or `timeout` elapses.
    /// Returns `true` once idle.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let busy = self
                .manager
                .as_ref()
                .is_some_and(|manager| manager.in_flight_count() > 0);
            if !busy {
                // A completion may land in the cache before its notification.
                self.updates.try_iter().for_each(drop);
                self.render_pass();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_for_updates((deadline - now).min(WORKER_POLL_INTERVAL));
        }
    }

    fn render_pass(&mut self) {
        let (Some(manager), Some(level)) = (self.manager.as_ref(), self.active_level) else {
            return;
        };
        let Some(info) = manager.level_info(level) else {
            return;
        };
        let tile_size = manager.tile_size();
        let downsample = info.downsample;
        let view_rect = self.viewport.visible_rect();

        let visible = TileRange::covering(&view_rect, tile_size, downsample, 0, 1);
        let (tiles_x, tiles_y) = info.tile_count(tile_size);
        let on_grid = visible.clamp_to(tiles_x, tiles_y);

        let mut rendered = 0;
        for (tx, ty) in on_grid.iter() {
            let key = TileKey::new(tx, ty, level);
            if self.displayed.contains_key(&key) {
                continue;
            }
            if let Some(image) = manager.get_tile(tx, ty, level) {
                let (x, y) = tile_origin(tx, ty, tile_size, downsample);
                let handle = self
                    .target
                    .render_tile(image, x, y, downsample, z_index(level));
                self.displayed.insert(key, handle);
                rendered += 1;
            }
        }

        let slack = removal_range(&visible);
        let stale: Vec<TileKey> = self
            .displayed
            .keys()
            .filter(|key| {
                if key.level == level {
                    !slack.contains(key.tile_x, key.tile_y)
                } else {
                    let footprint = tile_bounds(
                        key.tile_x,
                        key.tile_y,
                        tile_size,
                        manager.level_downsample(key.level),
                    );
                    covered(&self.displayed, &footprint, &on_grid, level, tile_size, downsample)
                }
            })
            .copied()
            .collect();

        for key in &stale {
            if let Some(handle) = self.displayed.remove(key) {
                self.target.remove_tile(handle);
            }
        }

        if rendered > 0 || !stale.is_empty() {
            debug!(
                "Render pass at level {}: +{} tiles, -{} tiles, {} displayed",
                level,
                rendered,
                stale.len(),
                self.displayed.len()
            );
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn zoom(&self) -> f64 {
        self.viewport.zoom()
    }

    pub fn view_config(&self) -> &ViewConfig {
        &self.view_config
    }

    /// Level currently being displayed, `None` before a slide is shown.
    pub fn active_level(&self) -> Option<u32> {
        self.active_level
    }

    pub fn manager(&self) -> Option<&TileManager> {
        self.manager.as_ref()
    }

    pub fn slide_info(&self) -> Option<SlideInfo> {
        self.manager.as_ref().and_then(TileManager::slide_info)
    }

    pub fn is_displayed(&self, key: &TileKey) -> bool {
        self.displayed.contains_key(key)
    }

    /// Displayed keys in sorted order.
    pub fn displayed_tiles(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.displayed.keys().copied().collect();
        keys.sort();
        keys
    }
}

/// Active-level tiles outside this range are removed: the visible range
/// widened by the slack, plus one more tile on the trailing side.
fn removal_range(visible: &TileRange) -> TileRange {
    let slack = visible.expand(REMOVAL_SLACK_TILES);
    TileRange::new(
        slack.x.start..slack.x.end.saturating_add(1),
        slack.y.start..slack.y.end.saturating_add(1),
    )
}

fn z_index(level: u32) -> i32 {
    BASE_Z_INDEX - i32::try_from(level).unwrap_or(i32::MAX)
}

/// True when every active-level tile of `on_grid` overlapping `footprint` is
/// displayed (vacuously true when none overlaps).
fn covered<H>(
    displayed: &HashMap<TileKey, H>,
    footprint: &Rect,
    on_grid: &TileRange,
    level: u32,
    tile_size: u32,
    downsample: f64,
) -> bool {
    let candidates =
        TileRange::covering(footprint, tile_size, downsample, 0, 0).intersection(on_grid);
    let all_displayed = candidates.iter().all(|(tx, ty)| {
        !tile_bounds(tx, ty, tile_size, downsample).intersects(footprint)
            || displayed.contains_key(&TileKey::new(tx, ty, level))
    });
    all_displayed
}

// =============================================================================
// Tests
// =============================================================================
