//! WSI Viewer - headless driver for the tiled slide viewer core.
//!
//! Opens a slide, drives the viewport renderer through a zoom sequence
//! against a software render target and reports what happened.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_viewer::{
    annotation::AnnotationList,
    config::Config,
    geometry::Rect,
    slide::{open_slide, SlideInfo},
    view::{RasterTarget, StatusSink, ViewportRenderer},
};

fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    if config.info {
        run_info(&config)
    } else {
        run_view(&config)
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: &Config) -> ExitCode {
    let slide = match open_slide(&config.slide) {
        Ok(slide) => slide,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let info = SlideInfo::from_reader(slide.as_ref());
    match serde_json::to_string_pretty(&info) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize slide info: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// View Session
// =============================================================================

/// Forwards host notifications to the log.
struct LogStatus;

impl StatusSink for LogStatus {
    fn show_message(&self, message: &str) {
        info!("{}", message);
    }

    fn zoom_changed(&self, zoom: f64) {
        debug!("Zoom: {:.4}", zoom);
    }

    fn field_of_view_changed(&self, view_rect: &Rect, level: u32) {
        debug!(
            "Field of view: ({:.0}, {:.0}) {:.0}x{:.0} at level {}",
            view_rect.x, view_rect.y, view_rect.width, view_rect.height, level
        );
    }
}

fn run_view(config: &Config) -> ExitCode {
    let mut renderer = ViewportRenderer::with_config(
        RasterTarget::new(),
        config.view_width,
        config.view_height,
        config.view_config(),
        config.tile_manager_config(),
    );
    renderer.set_status_sink(Box::new(LogStatus));

    if renderer.load_slide(&config.slide).is_err() {
        return ExitCode::FAILURE;
    }
    settle(&mut renderer, config);

    for &zoom in &config.zoom {
        renderer.set_zoom(zoom, None);
        settle(&mut renderer, config);
    }

    if let Some((x, y)) = config.center_point() {
        renderer.center_on(x, y);
        settle(&mut renderer, config);
    }

    let view_rect = renderer.viewport().visible_rect();
    if let Some(manager) = renderer.manager() {
        let stats = manager.cache_stats();
        info!(
            "Cache: {} tiles ({:?} per level), {} evictions",
            stats.total_tiles, stats.level_counts, stats.total_evictions
        );
    }
    info!(
        "Final view: zoom {:.4}, level {:?}, {} tiles displayed",
        renderer.zoom(),
        renderer.active_level(),
        renderer.target().len()
    );

    if let Some(path) = &config.annotations {
        let mut annotations = AnnotationList::new();
        match annotations.load_from_json(path) {
            Ok(()) => info!(
                "{} of {} annotations intersect the view",
                annotations.in_rect(&view_rect).len(),
                annotations.len()
            ),
            Err(e) => warn!("Could not load annotations: {}", e),
        }
    }

    if let Some(path) = &config.output {
        let image = renderer
            .target()
            .compose(&view_rect, config.view_width, config.view_height);
        if let Err(e) = image.save(path) {
            error!("Failed to write {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        info!("Wrote view to {}", path.display());
    }

    renderer.close();
    ExitCode::SUCCESS
}

/// Wait for outstanding tiles, warning if they do not arrive in time.
fn settle(renderer: &mut ViewportRenderer<RasterTarget>, config: &Config) {
    if !renderer.wait_until_idle(config.load_timeout()) {
        let pending = renderer.manager().map_or(0, |m| m.in_flight_count());
        warn!("Timed out with {} tiles still loading", pending);
    }
}

/// Initialize the tracing subscriber for logging.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_viewer=debug"
    } else {
        "wsi_viewer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
