//! Tile manager integration tests: dispatch, deduplication, failures and
//! per-level eviction against a mock slide.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use wsi_viewer::geometry::Rect;
use wsi_viewer::tile::{
    LevelQuotas, LoadSummary, NoopListener, TileKey, TileManager, TileManagerConfig,
    TracingMetrics,
};

use super::test_utils::{collect_keys, four_level_slide, level_color, wait_for_idle};

const TIMEOUT: Duration = Duration::from_secs(10);

fn config() -> TileManagerConfig {
    TileManagerConfig {
        tile_size: 512,
        workers: 4,
        ..Default::default()
    }
}

fn expected_footprint(level: u32) -> HashSet<TileKey> {
    // (0, 0, 1024, 1024) covers tiles 0..=2 on each axis, plus 4 tiles of
    // margin after the last one.
    (0..7)
        .flat_map(|ty| (0..7).map(move |tx| TileKey::new(tx, ty, level)))
        .collect()
}

#[test]
fn test_four_level_slide_scenario() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let manager = TileManager::open(slide.clone(), config(), Arc::new(tx)).unwrap();

    assert_eq!(manager.level_count(), 4);
    assert_eq!(manager.stages().stages(), [0, 1, 2, 3]);
    assert_eq!(manager.get_stage_level(0.5), 0);
    assert_eq!(manager.get_stage_level(0.01), 2);
    assert_eq!(manager.get_stage_level(0.001), 3);

    let summary = manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 1024.0, 1024.0), 0);
    assert_eq!(
        summary,
        LoadSummary {
            requested: 49,
            cached: 0,
            in_flight: 0
        }
    );

    let keys: HashSet<TileKey> = collect_keys(&rx, 49, TIMEOUT).into_iter().collect();
    assert_eq!(keys, expected_footprint(0));
    for key in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        assert!(keys.contains(&TileKey::new(key.0, key.1, 0)));
    }

    // Every region was read exactly once.
    let reads = slide.reads();
    assert_eq!(reads.len(), 49);
    assert!(reads.values().all(|&count| count == 1));
    assert!(reads.contains_key(&(512, 512, 0)));

    let tile = manager.get_tile(1, 1, 0).unwrap();
    assert_eq!(tile.dimensions(), (512, 512));
    assert_eq!(tile.get_pixel(10, 10).0, level_color(0));
}

#[test]
fn test_overlapping_requests_dispatch_once() {
    let slide = Arc::new(four_level_slide(65536));
    slide.gate().close();

    let (tx, rx) = unbounded();
    let manager = TileManager::open(slide.clone(), config(), Arc::new(tx)).unwrap();
    let rect = Rect::new(0.0, 0.0, 1024.0, 1024.0);

    let first = manager.load_tiles_for_view(&rect, 0);
    let second = manager.load_tiles_for_view(&rect, 0);
    let in_flight = manager.in_flight_count();

    slide.gate().open();
    collect_keys(&rx, 49, TIMEOUT);
    wait_for_idle(&manager, TIMEOUT);

    assert_eq!(first.requested, 49);
    assert_eq!(
        second,
        LoadSummary {
            requested: 0,
            cached: 0,
            in_flight: 49
        }
    );
    assert_eq!(in_flight, 49);

    assert_eq!(slide.read_count(), 49);
    assert!(slide.reads().values().all(|&count| count == 1));

    let third = manager.load_tiles_for_view(&rect, 0);
    assert_eq!(third.cached, 49);
    assert_eq!(third.requested, 0);
    assert_eq!(slide.read_count(), 49);
}

#[test]
fn test_shifted_view_only_loads_new_tiles() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let manager = TileManager::open(slide.clone(), config(), Arc::new(tx)).unwrap();

    manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 1024.0, 1024.0), 0);
    collect_keys(&rx, 49, TIMEOUT);

    // One tile to the right: only the new right-hand column is missing.
    let summary = manager.load_tiles_for_view(&Rect::new(512.0, 0.0, 1024.0, 1024.0), 0);
    assert_eq!(summary.requested, 7);
    assert_eq!(summary.cached, 49);

    collect_keys(&rx, 7, TIMEOUT);
    assert_eq!(slide.read_count(), 56);
}

#[test]
fn test_coarse_level_footprint() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let manager = TileManager::open(slide.clone(), config(), Arc::new(tx)).unwrap();

    // Level 3 is 1024x1024: a 2x2 grid regardless of the view size.
    let summary = manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 65536.0, 65536.0), 3);
    assert_eq!(summary.requested, 4);

    let keys: HashSet<TileKey> = collect_keys(&rx, 4, TIMEOUT).into_iter().collect();
    assert!(keys.contains(&TileKey::new(1, 1, 3)));

    // Tile (1, 1) of level 3 starts at 512 * 64 level-0 pixels.
    assert!(slide.reads().contains_key(&(32768, 32768, 3)));
}

#[test]
fn test_failed_tile_can_be_requested_again() {
    let slide = Arc::new(four_level_slide(65536).failing_on(3));
    let metrics = Arc::new(TracingMetrics::new(10));
    let config = TileManagerConfig {
        buffer_tiles: 0,
        ..config()
    };
    let manager = TileManager::open_with_metrics(
        slide.clone(),
        config,
        Arc::new(NoopListener),
        metrics.clone(),
    )
    .unwrap();
    let rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    assert_eq!(manager.load_tiles_for_view(&rect, 3).requested, 1);
    wait_for_idle(&manager, TIMEOUT);
    assert!(manager.get_tile(0, 0, 3).is_none());

    assert_eq!(manager.load_tiles_for_view(&rect, 3).requested, 1);
    wait_for_idle(&manager, TIMEOUT);

    assert_eq!(slide.reads().get(&(0, 0, 3)), Some(&2));
    assert_eq!(metrics.failures(), 2);
    assert_eq!(manager.cache_stats().total_tiles, 0);
}

#[test]
fn test_per_level_quota_enforced_during_loading() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let config = TileManagerConfig {
        level_quotas: LevelQuotas::new(vec![5, 100]),
        ..config()
    };
    let manager = TileManager::open(slide, config, Arc::new(tx)).unwrap();

    manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 65536.0, 65536.0), 3);
    collect_keys(&rx, 4, TIMEOUT);

    manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 1024.0, 1024.0), 0);
    collect_keys(&rx, 49, TIMEOUT);

    let stats = manager.cache_stats();
    assert_eq!(stats.level_counts.get(&0), Some(&5));
    assert_eq!(stats.level_counts.get(&3), Some(&4));
    assert_eq!(stats.total_tiles, 9);
    assert_eq!(stats.total_evictions, 44);

    let cached: Vec<_> = manager.cached_tiles();
    assert_eq!(cached.len(), 9);
    assert!(cached
        .iter()
        .all(|(key, ds)| (key.level == 0 && *ds == 1.0) || (key.level == 3 && *ds == 64.0)));
}

#[test]
fn test_close_waits_for_workers() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let mut manager = TileManager::open(slide, config(), Arc::new(tx)).unwrap();

    manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 4096.0, 4096.0), 0);
    manager.close();

    assert!(!manager.is_open());
    assert_eq!(manager.in_flight_count(), 0);
    assert_eq!(manager.pending_tasks(), 0);
    assert_eq!(manager.cache_stats().total_tiles, 0);

    // Dropping the manager releases the last sender.
    drop(manager);
    while rx.recv_timeout(Duration::from_millis(100)).is_ok() {}
    assert!(rx.is_empty());
}

#[test]
fn test_close_finishes_decode_in_progress() {
    let slide = Arc::new(four_level_slide(65536));
    slide.gate().close();

    let config = TileManagerConfig {
        workers: 1,
        buffer_tiles: 0,
        ..config()
    };
    let mut manager = TileManager::open(slide.clone(), config, Arc::new(NoopListener)).unwrap();
    assert_eq!(
        manager
            .load_tiles_for_view(&Rect::new(0.0, 0.0, 100.0, 100.0), 3)
            .requested,
        1
    );

    // The worker has popped the task and is blocked inside read_region.
    let deadline = Instant::now() + TIMEOUT;
    while manager.pending_tasks() > 0 {
        assert!(Instant::now() < deadline, "task was never picked up");
        thread::sleep(Duration::from_millis(5));
    }

    let closer = thread::spawn(move || {
        manager.close();
        manager
    });
    thread::sleep(Duration::from_millis(100));
    assert!(!closer.is_finished());
    assert_eq!(slide.read_count(), 0);

    slide.gate().open();
    let manager = closer.join().unwrap();

    assert_eq!(slide.read_count(), 1);
    assert!(!manager.is_open());
    assert_eq!(manager.cache_stats().total_tiles, 0);
    assert_eq!(manager.in_flight_count(), 0);
}

#[test]
fn test_closed_manager_ignores_requests() {
    let slide = Arc::new(four_level_slide(65536));
    let (tx, rx) = unbounded();
    let mut manager = TileManager::open(slide, config(), Arc::new(tx)).unwrap();
    manager.close();

    assert_eq!(
        manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 1024.0, 1024.0), 0),
        LoadSummary::default()
    );
    drop(manager);
    while rx.recv_timeout(Duration::from_millis(100)).is_ok() {}
    assert!(rx.is_empty());
}
