//! Line detection parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for line detection
#[derive(Deserialize, Debug, Clone)]
pub struct LineDetParams {
    /// Height of a search window
    ///
    /// Units: meters
    pub window_height_m: f64,

    /// Initial width of a search window
    ///
    /// Units: meters
    pub window_width_m: f64,

    /// Minimum width of a painted line, also the minimum separation between
    /// two histogram peaks.
    ///
    /// Units: meters
    pub min_line_width_m: f64,

    /// Maximum width of a painted line. Horizontal bands wider than this are
    /// treated as zebra crossings.
    ///
    /// Units: meters
    pub max_line_width_m: f64,

    /// A window must contain more than this many set pixels to find a point.
    pub min_pixels_in_window: usize,

    /// A new point closer than `window height * min_shift_fraction` to the
    /// previous point is rejected.
    ///
    /// Consecutive points are at least one window height apart, so values of
    /// 1 or less keep every point while larger values thin them out.
    pub min_shift_fraction: f64,

    /// Factor by which a window widens each step the line isn't found.
    pub width_growth_factor: f64,

    /// Maximum width of a window as a multiple of its initial width.
    pub max_width_growth: f64,

    /// Number of recent steps used to predict the line direction when it is
    /// lost.
    pub direction_memory: usize,

    /// If true the last point of a window is removed when the window loses the
    /// line, as it is usually on the very end of the marking.
    pub drop_last_on_miss: bool,

    /// Number of gaps a solid line may contain in addition to the number of
    /// zebra crossing bands removed from the image.
    pub base_gaps_allowed: usize,

    /// Zebra crossing filter
    pub zebra_filter: ZebraFilterParams
}

/// Parameters of the zebra crossing filter
#[derive(Deserialize, Debug, Clone)]
pub struct ZebraFilterParams {
    /// If false the filter is not run and no bands are removed
    pub active: bool,

    /// Minimum summed intensity of an image row for it to be considered part
    /// of a horizontal band.
    pub zebra_crossing_threshold: f64,

    /// Height relative to the peak's prominence at which band widths are
    /// measured.
    pub rel_height: f64
}
