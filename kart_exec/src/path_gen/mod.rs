//! # Path generation module
//!
//! Builds the driving path down the middle of a lane from the two lines
//! bounding it, and estimates how tightly the path curves.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod smooth;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// Internal
use crate::{calib::Calibration, line_det::Line};
use util::maths::{interp, linspace};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for path generation
#[derive(Deserialize, Debug, Clone)]
pub struct PathGenParams {
    /// Number of samples in the smoothing window, must be odd
    pub smoothing_window: usize,

    /// Order of the smoothing polynomial
    pub smoothing_order: usize,

    /// Minimum number of samples in a path
    pub min_samples: usize,

    /// Number of path samples for each point of the shorter line
    pub samples_per_point: usize
}

/// A path to drive along in the top-down image.
#[derive(Debug, Clone, Serialize)]
pub struct Path {
    /// Points of the path in pixels, nearest the kart first
    pub points: Vec<Point2<f64>>,

    /// Radius of curvature of the path, evaluated at its largest row. Always
    /// positive, straight paths have an infinite radius.
    ///
    /// Units: meters
    pub radius: f64
}

/// Generates paths from lane lines.
pub struct PathGenerator {
    params: PathGenParams,

    calib: Arc<Calibration>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathGenError {
    #[error("At least 2 lines are needed to form a lane, got {0}")]
    TooFewLines(usize),

    #[error("Line {0} of the selected lane has no points")]
    EmptyLine(usize),

    #[error("Could not smooth the centre line")]
    SmoothingFailed,

    #[error("Could not fit a curve to the path")]
    CurveFitFailed
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total length of the path along its points, in pixels.
    pub fn length_px(&self) -> f64 {
        self.points.windows(2)
            .map(|p| nalgebra::distance(&p[0], &p[1]))
            .sum()
    }
}

impl PathGenerator {
    pub fn new(params: &PathGenParams, calib: Arc<Calibration>) -> Self {
        Self {
            params: params.clone(),
            calib
        }
    }

    /// Generate the path down the centre of the requested lane.
    ///
    /// `lines` must be ordered left to right. Lane 0 is the rightmost lane,
    /// see [`select_lane`].
    pub fn generate(&self, lines: &[Line], requested_lane: usize) -> Result<Path, PathGenError> {
        let (left_idx, right_idx) = select_lane(lines.len(), requested_lane)
            .ok_or(PathGenError::TooFewLines(lines.len()))?;

        let left = &lines[left_idx];
        let right = &lines[right_idx];
        if left.is_empty() {
            return Err(PathGenError::EmptyLine(left_idx))
        }
        if right.is_empty() {
            return Err(PathGenError::EmptyLine(right_idx))
        }

        let num = self.params.min_samples
            .max(self.params.samples_per_point * left.len().min(right.len()));

        // Raw centre line
        let (left_pts, right_pts) = resample_pair(left, right, num);
        let mut xs = Vec::with_capacity(num);
        let mut ys = Vec::with_capacity(num);
        for (l, r) in left_pts.iter().zip(right_pts.iter()) {
            xs.push((l.x + r.x) / 2.0);
            ys.push((l.y + r.y) / 2.0);
        }

        // Smooth
        let xs = smooth::savgol_filter(
            &xs, self.params.smoothing_window, self.params.smoothing_order
        ).ok_or(PathGenError::SmoothingFailed)?;
        let ys = smooth::savgol_filter(
            &ys, self.params.smoothing_window, self.params.smoothing_order
        ).ok_or(PathGenError::SmoothingFailed)?;

        // Curvature in metric units, evaluated at the largest row
        let xs_m: Vec<f64> = xs.iter().map(|x| self.calib.get_distance(*x)).collect();
        let ys_m: Vec<f64> = ys.iter().map(|y| self.calib.get_distance(*y)).collect();
        let coeffs = smooth::polyfit_2(&xs_m, &ys_m).ok_or(PathGenError::CurveFitFailed)?;
        let y_eval = ys_m.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let radius = smooth::radius_of_curvature(&coeffs, y_eval);

        Ok(Path {
            points: xs.into_iter()
                .zip(ys.into_iter())
                .map(|(x, y)| Point2::new(x, y))
                .collect(),
            radius
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the indices of the `(left, right)` lines of the requested lane.
///
/// Lanes are counted from the right, so in `n` lines lane `k` is bounded by
/// lines `n - 2 - k` and `n - 1 - k`. Lanes beyond the leftmost are clamped to
/// the leftmost lane. Returns `None` if there are fewer than 2 lines.
pub fn select_lane(num_lines: usize, requested_lane: usize) -> Option<(usize, usize)> {
    if num_lines < 2 {
        return None
    }

    let lane = requested_lane.min(num_lines - 2);

    Some((num_lines - 2 - lane, num_lines - 1 - lane))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Resample both lines to `num` points.
///
/// If the lines share a range of rows both are sampled at the same rows
/// within it. Otherwise each is sampled evenly along its own rows.
fn resample_pair(a: &Line, b: &Line, num: usize) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    let span = |l: &Line| -> (f64, f64) {
        let near = l.points.first().map(|p| p.y as f64).unwrap_or(0.0);
        let far = l.points.last().map(|p| p.y as f64).unwrap_or(0.0);
        (near, far)
    };

    let (a_near, a_far) = span(a);
    let (b_near, b_far) = span(b);
    let near = a_near.min(b_near);
    let far = a_far.max(b_far);

    match near > far {
        true => (resample(a, near, far, num), resample(b, near, far, num)),
        false => (resample(a, a_near, a_far, num), resample(b, b_near, b_far, num))
    }
}

/// Sample the line's column at `num` rows evenly spaced from `near` to `far`.
fn resample(line: &Line, near: f64, far: f64, num: usize) -> Vec<Point2<f64>> {
    // Interpolation needs increasing rows, so go far to near
    let rows: Vec<f64> = line.points.iter().rev().map(|p| p.y as f64).collect();
    let cols: Vec<f64> = line.points.iter().rev().map(|p| p.x as f64).collect();

    linspace(near, far, num).into_iter()
        .filter_map(|y| interp(y, &rows, &cols).map(|x| Point2::new(x, y)))
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
