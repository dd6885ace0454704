// Entry pattern detection
pub mod fvg;

use crate::models::{Bar, FvgZone};

pub use fvg::{detect_fvg, FvgDetector};

/// Finds an entry zone in an ascending bar series
pub trait PatternDetector: Send + Sync {
    fn detect(&self, bars: &[Bar]) -> Option<FvgZone>;

    /// Get detector name
    fn name(&self) -> &str;

    /// Minimum bars needed before a zone can be found
    fn min_bars_required(&self) -> usize;
}
