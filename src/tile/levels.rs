//! Zoom-to-level mapping.
//!
//! Whatever the native pyramid depth, the viewer exposes exactly four display
//! stages (high, mid-high, mid-low, low). [`compute_stages`] maps those stages
//! onto native level indices once per slide, and [`stage_for_zoom`] picks the
//! stage for a zoom factor using a fixed threshold ladder.

/// Number of display stages.
pub const STAGE_COUNT: usize = 4;

/// Zoom thresholds separating the stages, highest first.
///
/// `zoom >= 0.3` selects stage 0, `>= 0.03` stage 1, `>= 0.004` stage 2,
/// anything lower stage 3. These values are empirical.
pub const ZOOM_STAGE_THRESHOLDS: [f64; STAGE_COUNT - 1] = [0.3, 0.03, 0.004];

/// Stage-to-native-level table for one slide.
///
/// Values are non-decreasing and lie in `[0, level_count - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelStageMap {
    stages: [usize; STAGE_COUNT],
}

impl LevelStageMap {
    /// Build the table for a pyramid with `native_level_count` levels.
    pub fn new(native_level_count: usize) -> Self {
        Self {
            stages: compute_stages(native_level_count),
        }
    }

    /// The raw table.
    pub fn stages(&self) -> [usize; STAGE_COUNT] {
        self.stages
    }

    /// Stage ordinal (0..4) for a zoom factor.
    pub fn stage_index(&self, zoom: f64) -> usize {
        ZOOM_STAGE_THRESHOLDS
            .iter()
            .position(|&threshold| zoom >= threshold)
            .unwrap_or(STAGE_COUNT - 1)
    }

    /// Native level for a zoom factor.
    pub fn level_for_zoom(&self, zoom: f64) -> usize {
        self.stages[self.stage_index(zoom)]
    }
}

impl Default for LevelStageMap {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Map the four display stages onto native levels.
///
/// - 1 level: `[0, 0, 0, 0]`
/// - 2 levels: `[0, 0, 1, 1]`
/// - 3 levels: `[0, 1, 2, 2]`
/// - 4 or more: evenly spaced over `0..=n-1`
///
/// A count of 0 is treated as 1.
pub fn compute_stages(native_level_count: usize) -> [usize; STAGE_COUNT] {
    match native_level_count {
        0 | 1 => [0, 0, 0, 0],
        2 => [0, 0, 1, 1],
        3 => [0, 1, 2, 2],
        n => {
            let last = n - 1;
            let step = last as f64 / 3.0;
            [
                0,
                (step.round() as usize).min(last),
                ((step * 2.0).round() as usize).min(last),
                ((step * 3.0).round() as usize).min(last),
            ]
        }
    }
}

/// Pick the native level for `zoom` from a stage table.
pub fn stage_for_zoom(zoom: f64, stages: &[usize; STAGE_COUNT]) -> usize {
    LevelStageMap { stages: *stages }.level_for_zoom(zoom)
}

/// Level whose downsample is closest to `downsample`.
///
/// Ties keep the lower (higher-resolution) level. Returns 0 for an empty list.
pub fn best_level_for_downsample(downsamples: &[f64], downsample: f64) -> usize {
    let mut best = 0;
    let mut best_diff = f64::INFINITY;
    for (level, &d) in downsamples.iter().enumerate() {
        let diff = (d - downsample).abs();
        if diff < best_diff {
            best = level;
            best_diff = diff;
        }
    }
    best
}
