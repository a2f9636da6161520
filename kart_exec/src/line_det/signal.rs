//! # Signal processing
//!
//! One dimensional peak finding over histograms. Peaks are found as local
//! maxima (the middle of a flat plateau counts as a single peak), then
//! filtered by height and by separation, keeping the tallest of any peaks
//! that are too close together.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use ndarray::ArrayView1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The width of a peak evaluated at some height relative to its prominence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakWidth {
    /// Width of the peak in samples
    pub width: f64,

    /// Height at which the width was evaluated
    pub height: f64,

    /// Interpolated position of the left edge of the peak
    pub left: f64,

    /// Interpolated position of the right edge of the peak
    pub right: f64
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the peaks of `x`.
///
/// Peaks lower than `height` (if given) are discarded. Of any two peaks closer
/// than `distance` samples only the taller is kept. The returned indices are
/// in ascending order.
pub fn find_peaks(x: ArrayView1<f64>, height: Option<f64>, distance: usize) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(h) = height {
        peaks.retain(|&p| x[p] >= h);
    }

    if distance > 1 && peaks.len() > 1 {
        peaks = select_by_distance(x, &peaks, distance);
    }

    peaks
}

/// Calculate the widths of the given peaks.
///
/// The width is measured at `x[peak] - prominence * rel_height`, so a
/// `rel_height` of 1.0 measures at the base of the peak and 0.5 at half its
/// prominence.
pub fn peak_widths(x: ArrayView1<f64>, peaks: &[usize], rel_height: f64) -> Vec<PeakWidth> {
    peaks.iter().map(|&peak| {
        let (prominence, left_base, right_base) = prominence(x, peak);
        let height = x[peak] - prominence * rel_height;

        // Walk left until the signal drops below the evaluation height
        let mut i = peak;
        while left_base < i && height < x[i] {
            i -= 1;
        }
        let mut left = i as f64;
        if x[i] < height {
            left += (height - x[i]) / (x[i + 1] - x[i]);
        }

        // And the same to the right
        let mut i = peak;
        while i < right_base && height < x[i] {
            i += 1;
        }
        let mut right = i as f64;
        if x[i] < height {
            right -= (height - x[i]) / (x[i - 1] - x[i]);
        }

        PeakWidth {
            width: right - left,
            height,
            left,
            right
        }
    }).collect()
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Find all local maxima, taking the middle sample of flat plateaus.
fn local_maxima(x: ArrayView1<f64>) -> Vec<usize> {
    let n = x.len();
    let mut maxima = Vec::new();

    if n < 3 {
        return maxima
    }

    let mut i = 1;
    while i < n - 1 {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;

            while ahead < n - 1 && x[ahead] == x[i] {
                ahead += 1;
            }

            if x[ahead] < x[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }

        i += 1;
    }

    maxima
}

/// Remove peaks closer than `distance` to a taller peak.
fn select_by_distance(x: ArrayView1<f64>, peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];

    // Order by height, where equal heights prefer the later peak
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        x[peaks[a]].partial_cmp(&x[peaks[b]])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    for &j in order.iter().rev() {
        if !keep[j] {
            continue
        }

        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks.iter()
        .zip(keep.iter())
        .filter(|(_, &k)| k)
        .map(|(&p, _)| p)
        .collect()
}

/// Get the prominence of a peak along with its left and right bases.
fn prominence(x: ArrayView1<f64>, peak: usize) -> (f64, usize, usize) {
    let n = x.len();

    let mut left_min = x[peak];
    let mut left_base = peak;
    let mut i = peak as isize;
    while i >= 0 && x[i as usize] <= x[peak] {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_min = x[peak];
    let mut right_base = peak;
    let mut i = peak;
    while i < n && x[i] <= x[peak] {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    (x[peak] - left_min.max(right_min), left_base, right_base)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
