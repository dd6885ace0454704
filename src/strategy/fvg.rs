use super::PatternDetector;
use crate::models::{Bar, FvgZone};

const FVG_WINDOW: usize = 3;

/// Scan for the first bullish fair value gap.
///
/// A gap exists at index `i` when the high of bar `i - 2` is strictly below
/// the low of bar `i`. The first gap found is returned; later gaps are not
/// considered even if wider.
pub fn detect_fvg(bars: &[Bar]) -> Option<FvgZone> {
    bars.windows(FVG_WINDOW).find_map(|w| {
        let (first, third) = (&w[0], &w[2]);
        (first.high < third.low).then_some(FvgZone {
            lower_bound: first.high,
            upper_bound: third.low,
        })
    })
}

/// Three-bar bullish FVG detector
#[derive(Debug, Clone, Copy, Default)]
pub struct FvgDetector;

impl PatternDetector for FvgDetector {
    fn detect(&self, bars: &[Bar]) -> Option<FvgZone> {
        detect_fvg(bars)
    }

    fn name(&self) -> &str {
        "FVG"
    }

    fn min_bars_required(&self) -> usize {
        FVG_WINDOW
    }
}
