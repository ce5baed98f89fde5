//! Viewport renderer integration tests: level transitions with coverage-based
//! retention, panning and slide replacement.
//!
//! The slide is a 4096x4096 mock with levels `[1, 4, 16, 64]`, shown through
//! a 256x256 view with 64 px tiles.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use wsi_viewer::geometry::Rect;
use wsi_viewer::tile::{TileKey, TileManagerConfig};
use wsi_viewer::view::{StatusSink, ViewConfig, ViewportRenderer};

use super::test_utils::{four_level_slide, MockSlide, RecordingTarget};

const TIMEOUT: Duration = Duration::from_secs(10);

fn renderer() -> ViewportRenderer<RecordingTarget> {
    let tile_config = TileManagerConfig {
        tile_size: 64,
        workers: 4,
        ..Default::default()
    };
    ViewportRenderer::with_config(
        RecordingTarget::default(),
        256,
        256,
        ViewConfig::default(),
        tile_config,
    )
}

fn count_at_level(renderer: &ViewportRenderer<RecordingTarget>, level: u32) -> usize {
    renderer
        .displayed_tiles()
        .iter()
        .filter(|key| key.level == level)
        .count()
}

#[derive(Default, Clone)]
struct FovLog(Rc<RefCell<Vec<(Rect, u32)>>>);

impl StatusSink for FovLog {
    fn field_of_view_changed(&self, view_rect: &Rect, level: u32) {
        self.0.borrow_mut().push((*view_rect, level));
    }
}

#[test]
fn test_fit_shows_whole_slide() {
    let mut r = renderer();
    let fov = FovLog::default();
    r.set_status_sink(Box::new(fov.clone()));

    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();

    // 256 / 4096 = 0.0625 is stage 1, i.e. level 1.
    assert_eq!(r.zoom(), 0.0625);
    assert_eq!(r.active_level(), Some(1));
    assert_eq!(
        fov.0.borrow().last().copied(),
        Some((Rect::new(0.0, 0.0, 4096.0, 4096.0), 1))
    );

    assert!(r.wait_until_idle(TIMEOUT));

    // Level 1 is 1024x1024, i.e. 16x16 tiles of 64 px.
    assert_eq!(count_at_level(&r, 1), 256);
    assert_eq!(r.displayed_tiles().len(), 256);
    assert!(r
        .target()
        .live
        .values()
        .all(|p| p.scale == 4.0 && p.z_index == 9));
    assert!(r
        .target()
        .live
        .values()
        .any(|p| p.x == 256.0 && p.y == 512.0));
}

#[test]
fn test_zoom_in_keeps_coarse_tiles_until_covered() {
    let slide = Arc::new(four_level_slide(4096));
    let mut r = renderer();
    r.load_reader(slide.clone()).unwrap();
    assert!(r.wait_until_idle(TIMEOUT));

    slide.gate().close();
    r.set_zoom(0.5, None);

    // Visible rect is 1792..2304 on both axes, i.e. level-0 tiles 28..38.
    // Level 0 is not cached yet, so only the level-1 tiles overlapping that
    // range remain: tiles 7..=9 on each axis.
    let level1_during = count_at_level(&r, 1);
    let level0_during = count_at_level(&r, 0);
    let active_during = r.active_level();

    slide.gate().open();
    assert!(r.wait_until_idle(TIMEOUT));

    assert_eq!(active_during, Some(0));
    assert_eq!(level0_during, 0);
    assert_eq!(level1_during, 9);

    // Once level 0 is complete the level-1 tiles are gone.
    assert_eq!(count_at_level(&r, 1), 0);
    let level0 = r.displayed_tiles();
    assert_eq!(level0.len(), 100);
    assert!(level0
        .iter()
        .all(|k| (28..38).contains(&k.tile_x) && (28..38).contains(&k.tile_y)));
    assert!(r.target().live.values().all(|p| p.z_index == 10));
}

#[test]
fn test_zoom_out_to_cached_level_swaps_immediately() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    assert!(r.wait_until_idle(TIMEOUT));

    r.set_zoom(0.5, None);
    assert!(r.wait_until_idle(TIMEOUT));
    assert_eq!(count_at_level(&r, 0), 100);

    // Level 1 is still cached: it is rendered in the same pass and covers
    // every level-0 tile, so those are dropped right away.
    r.set_zoom(0.0625, None);
    assert_eq!(r.active_level(), Some(1));
    assert_eq!(count_at_level(&r, 1), 256);
    assert_eq!(count_at_level(&r, 0), 0);
    assert_eq!(r.target().live.len(), 256);
}

#[test]
fn test_pan_drops_far_tiles() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    r.set_zoom(1.0, None);
    assert!(r.wait_until_idle(TIMEOUT));

    // Visible rect 1920..2176: tiles 30..36.
    assert_eq!(r.displayed_tiles().len(), 36);

    // Move the view 1024 px right; the old column range is beyond the slack.
    r.on_pan(-1024.0, 0.0);
    assert!(r.displayed_tiles().iter().all(|k| k.tile_x >= 44));

    assert!(r.wait_until_idle(TIMEOUT));
    let keys = r.displayed_tiles();
    assert_eq!(keys.len(), 36);
    assert!(keys.iter().all(|k| (46..52).contains(&k.tile_x)));
}

#[test]
fn test_small_pan_keeps_tiles_within_slack() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    r.set_zoom(1.0, None);
    assert!(r.wait_until_idle(TIMEOUT));
    let removed_before = r.target().removed;

    // One tile to the right: the leftmost column is still within the slack.
    r.on_pan(-64.0, 0.0);
    assert!(r.wait_until_idle(TIMEOUT));

    assert_eq!(r.target().removed, removed_before);
    assert!(r.is_displayed(&TileKey::new(30, 32, 0)));
    assert!(r.is_displayed(&TileKey::new(36, 32, 0)));
}

#[test]
fn test_failed_reload_keeps_current_slide() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    assert!(r.wait_until_idle(TIMEOUT));
    let displayed = r.displayed_tiles();

    assert!(r.load_slide("/no/such/slide.tiff").is_err());
    assert!(r.manager().is_some());
    assert_eq!(r.displayed_tiles(), displayed);

    let empty = MockSlide::new(vec![], vec![]);
    assert!(r.load_reader(Arc::new(empty)).is_err());
    assert_eq!(r.displayed_tiles(), displayed);
}

#[test]
fn test_loading_new_slide_replaces_tiles() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    assert!(r.wait_until_idle(TIMEOUT));
    assert_eq!(r.target().live.len(), 256);

    // 1024x1024 fits at zoom 0.25: stage 1, level 1 (256x256, 4x4 tiles).
    r.load_reader(Arc::new(four_level_slide(1024))).unwrap();
    assert!(r.wait_until_idle(TIMEOUT));

    assert_eq!(r.zoom(), 0.25);
    assert_eq!(r.target().live.len(), 16);
    assert_eq!(count_at_level(&r, 1), 16);
}

#[test]
fn test_center_on_moves_view() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    r.set_zoom(1.0, None);
    r.center_on(128.0, 128.0);

    assert_eq!(r.viewport().visible_rect(), Rect::new(0.0, 0.0, 256.0, 256.0));
    assert!(r.wait_until_idle(TIMEOUT));
    // Tiles 0..6 on each axis.
    assert_eq!(r.displayed_tiles().len(), 36);
}

#[test]
fn test_pan_keeps_trailing_slack_column() {
    let mut r = renderer();
    r.load_reader(Arc::new(four_level_slide(4096))).unwrap();
    r.set_zoom(1.0, None);
    assert!(r.wait_until_idle(TIMEOUT));
    assert!(r.is_displayed(&TileKey::new(35, 32, 0)));

    // Five tiles to the left: visible tiles 25..31, kept up to column 33.
    r.on_pan(320.0, 0.0);

    assert!(r.is_displayed(&TileKey::new(33, 32, 0)));
    assert!(!r.is_displayed(&TileKey::new(34, 32, 0)));
    assert!(!r.is_displayed(&TileKey::new(35, 32, 0)));
}
