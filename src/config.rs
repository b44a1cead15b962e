use std::time::Duration;

use crate::{sim::GridDimensions, util::Color};

/// Startup configuration. Built once; nothing here changes while the
/// simulation runs.
#[derive(Clone, Debug)]
pub struct LifeConfig {
    pub grid: GridDimensions,
    /// Wall-clock time between ticks
    pub update_interval: Duration,
    /// Render pass clear color
    pub clear_color: Color,
    /// Id of the canvas element used as the surface on the web
    pub canvas_id: &'static str,
    pub window_title: &'static str,
}

impl LifeConfig {
    pub const GRID_SIZE: u32 = 32;
    pub const UPDATE_INTERVAL_MS: u64 = 200;
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            grid: GridDimensions::square(Self::GRID_SIZE),
            update_interval: Duration::from_millis(Self::UPDATE_INTERVAL_MS),
            clear_color: Color::rgb(0, 0, 102),
            canvas_id: "life-surface",
            window_title: "gpu-life",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo() {
        let config = LifeConfig::default();
        assert_eq!(config.grid.width, 32);
        assert_eq!(config.grid.height, 32);
        assert_eq!(config.update_interval, Duration::from_millis(200));
        assert!((config.clear_color.to_wgpu().b - 0.4).abs() < 1e-9);
    }
}
