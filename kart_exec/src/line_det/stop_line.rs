//! # Stop line detection
//!
//! Stop lines run across the lane, perpendicular to the direction of travel.
//! To find them the region bounded by the lane lines is rotated a quarter
//! turn, so that stop lines become vertical, and the window search is run
//! over it. A candidate is only accepted if a run of evenly spaced points
//! spans the length of a real stop line.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use image::{GrayImage, imageops};
use log::trace;
use nalgebra::Point2;
use serde::Deserialize;

// Internal
use super::{Line, LineDetector, column_histogram};
use crate::calib::Calibration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for stop line detection
#[derive(Deserialize, Debug, Clone)]
pub struct StopLineParams {
    /// Minimum length of a stop line
    ///
    /// Units: meters
    pub min_length_m: f64,

    /// Maximum length of a stop line
    ///
    /// Units: meters
    pub max_length_m: f64,

    /// Maximum difference between the spacing of two consecutive points and
    /// the window height for the points to be part of the same run.
    ///
    /// Units: pixels
    pub spacing_tolerance_px: i32
}

/// Detects stop lines between lane lines.
pub struct StopLineDetector {
    params: StopLineParams,

    calib: Arc<Calibration>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StopLineDetector {
    pub fn new(params: &StopLineParams, calib: Arc<Calibration>) -> Self {
        Self {
            params: params.clone(),
            calib
        }
    }

    /// The minimum and maximum number of points in a stop line for the given
    /// window height.
    pub fn window_bounds(&self, window_height: i32) -> (usize, usize) {
        let window_height = window_height.max(1);

        (
            (self.calib.get_pixels(self.params.min_length_m) / window_height).max(0) as usize,
            (self.calib.get_pixels(self.params.max_length_m) / window_height).max(0) as usize
        )
    }

    /// Find the stop lines inside the bounding box of the given lines.
    ///
    /// The returned lines are in image coordinates and are ordered right to
    /// left along their length.
    pub fn detect(
        &self,
        image: &GrayImage,
        lines: &[Line],
        line_det: &LineDetector
    ) -> Vec<Line> {
        let (x_min, x_max, y_min, y_max) = match bounding_box(lines) {
            Some(b) => b,
            None => return Vec::new()
        };

        // Keep the box inside the image
        let x_min = x_min.max(0);
        let y_min = y_min.max(0);
        let x_max = x_max.min(image.width() as i32 - 1);
        let y_max = y_max.min(image.height() as i32 - 1);

        let width = x_max - x_min + 1;
        let height = y_max - y_min + 1;
        if width < 2 || height < 2 {
            return Vec::new()
        }

        let crop = imageops::crop_imm(
            image, x_min as u32, y_min as u32, width as u32, height as u32
        ).to_image();
        let rotated = imageops::rotate90(&crop);

        let histogram = column_histogram(&rotated, false);
        let windows = line_det.window_search(&rotated, histogram.view());

        let (window_height, _) = line_det.window_shape();
        let (min_points, max_points) = self.window_bounds(window_height);

        let mut stop_lines = Vec::new();
        for window in windows {
            // Rotate back into image coordinates
            let points: Vec<Point2<i32>> = window.points.iter()
                .map(|p| Point2::new(x_min + p.y, y_min + (height - 1 - p.x)))
                .collect();

            let run = self.longest_run(&points, window_height);

            if run.len() >= 2 && run.len() >= min_points && run.len() <= max_points {
                stop_lines.push(Line::stop(run.to_vec()));
            }
            else {
                trace!(
                    "Discarded stop line candidate with {} points (bounds {}..={})",
                    run.len(), min_points, max_points
                );
            }
        }

        stop_lines
    }

    /// Get the longest run of points which are spaced one window height apart
    /// along the line.
    fn longest_run<'a>(
        &self,
        points: &'a [Point2<i32>],
        window_height: i32
    ) -> &'a [Point2<i32>] {
        let mut best_start = 0;
        let mut best_len = 0;
        let mut start = 0;
        let mut len = 0;

        for (i, p) in points.windows(2).enumerate() {
            let spacing = p[1].x - p[0].x;

            if (spacing + window_height).abs() < self.params.spacing_tolerance_px {
                if len == 0 {
                    start = i;
                }
                len += 1;

                if len > best_len {
                    best_start = start;
                    best_len = len;
                }
            }
            else {
                len = 0;
            }
        }

        match best_len {
            0 => &[],
            n => &points[best_start..=best_start + n]
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Get `(x_min, x_max, y_min, y_max)` of all points in the lines
fn bounding_box(lines: &[Line]) -> Option<(i32, i32, i32, i32)> {
    lines.iter()
        .flat_map(|l| l.points.iter())
        .fold(None, |b, p| match b {
            None => Some((p.x, p.x, p.y, p.y)),
            Some((x0, x1, y0, y1)) => Some(
                (x0.min(p.x), x1.max(p.x), y0.min(p.y), y1.max(p.y))
            )
        })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::line_det::{LineType, test::*};

    fn test_stop_params() -> StopLineParams {
        StopLineParams {
            min_length_m: 2.0,
            max_length_m: 4.0,
            spacing_tolerance_px: 2
        }
    }

    #[test]
    fn test_window_bounds() {
        let det = StopLineDetector::new(&test_stop_params(), test_calib());
        assert_eq!(det.window_bounds(10), (4, 8));
    }

    #[test]
    fn test_longest_run() {
        let det = StopLineDetector::new(&test_stop_params(), test_calib());
        let points: Vec<Point2<i32>> = [200, 190, 181, 150, 140, 130, 119, 110]
            .iter()
            .map(|&x| Point2::new(x, 100))
            .collect();

        let run = det.longest_run(&points, 10);
        assert_eq!(run.len(), 5);
        assert_eq!(run[0].x, 150);
        assert_eq!(run[4].x, 110);

        assert!(det.longest_run(&points[..1], 10).is_empty());
    }

    #[test]
    fn test_detect_stop_line() {
        let calib = test_calib();
        let line_det = LineDetector::new(&test_params(), calib.clone());
        let det = StopLineDetector::new(&test_stop_params(), calib);

        // 3 m stop line across the left half of the lane
        let mut img = straight_road();
        draw_rect(&mut img, 130, 398, 60, 4);

        let lines = line_det.detect(&img);
        let stop_lines = det.detect(&img, &lines, &line_det);

        assert_eq!(stop_lines.len(), 1);
        let stop = &stop_lines[0];
        assert_eq!(stop.line_type, LineType::Stop);
        assert!((stop.mean_row().unwrap() - 399.5).abs() <= 1.0);
        for p in stop.points.iter() {
            assert!(p.x >= 120 && p.x <= 195);
        }
    }

    #[test]
    fn test_detect_no_stop_line() {
        let calib = test_calib();
        let line_det = LineDetector::new(&test_params(), calib.clone());
        let det = StopLineDetector::new(&test_stop_params(), calib);

        let img = straight_road();
        let lines = line_det.detect(&img);

        assert!(det.detect(&img, &lines, &line_det).is_empty());
        assert!(det.detect(&img, &[], &line_det).is_empty());
    }
}
