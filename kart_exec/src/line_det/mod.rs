//! # Line detection module
//!
//! Finds the painted line markings in a binary top-down image of the road.
//!
//! Detection follows these steps:
//!
//!  1. Optionally remove zebra crossings, which show up as horizontal bands
//!     wider than any painted line.
//!  2. Sum each column of the image, weighting rows nearer the kart more
//!     heavily, and find the peaks of this histogram. Each peak is the base of
//!     a line.
//!  3. Place a search window on each peak at the bottom of the image, then
//!     step all windows up the image together. When two windows run into each
//!     other only the one nearer the centre of the image carries on.
//!  4. Build one `Line` from the points each window found, classified as
//!     solid or dashed from the gaps between the points. Windows which found
//!     too few points to be a line are dropped.
//!
//! Stop lines are found by running the same search on a rotated crop of the
//! image, see [`StopLineDetector`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod line;
mod params;
pub mod signal;
mod stop_line;
mod window;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use line::{Line, LineType, count_gaps};
pub use params::{LineDetParams, ZebraFilterParams};
pub use stop_line::{StopLineDetector, StopLineParams};
pub use window::Window;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use image::{GrayImage, Luma};
use log::trace;
use ndarray::{Array1, ArrayView1};

// Internal
use crate::calib::Calibration;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The bottom row of the histogram weight ramp is weighted this many times
/// more than the top row.
const NEAR_FIELD_WEIGHT_RATIO: f64 = 10.0;

/// A window must find more than this many points to become a line.
pub const MIN_LINE_POINTS: usize = 5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Detects lines in top-down images.
pub struct LineDetector {
    params: LineDetParams,

    calib: Arc<Calibration>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LineDetector {
    pub fn new(params: &LineDetParams, calib: Arc<Calibration>) -> Self {
        Self {
            params: params.clone(),
            calib
        }
    }

    pub fn params(&self) -> &LineDetParams {
        &self.params
    }

    /// The `(height, width)` of a search window in pixels.
    pub fn window_shape(&self) -> (i32, i32) {
        (
            self.calib.get_pixels(self.params.window_height_m).max(1),
            self.calib.get_pixels(self.params.window_width_m).max(2)
        )
    }

    /// Detect all lines in the image.
    ///
    /// Lines are returned ordered left to right by the column they were seeded
    /// at. Every line has more than [`MIN_LINE_POINTS`] points.
    pub fn detect(&self, image: &GrayImage) -> Vec<Line> {
        let filtered;
        let (image, bands_removed) = match self.params.zebra_filter.active {
            true => {
                let mut work = image.clone();
                let n = self.filter_zebra(&mut work);
                filtered = work;
                (&filtered, n)
            },
            false => (image, 0)
        };

        let histogram = column_histogram(image, true);
        let windows = self.window_search(image, histogram.view());

        let (window_height, _) = self.window_shape();
        let gaps_allowed = bands_removed + self.params.base_gaps_allowed;

        let lines: Vec<Line> = windows.into_iter()
            .filter(|w| w.points.len() > MIN_LINE_POINTS)
            .map(|w| Line::new(w.points, window_height, gaps_allowed))
            .collect();

        trace!(
            "Found {} lines ({} zebra bands removed)", lines.len(), bands_removed
        );

        lines
    }

    /// Run the window search over the image, seeding one window at each peak
    /// of the histogram.
    pub(crate) fn window_search(
        &self,
        image: &GrayImage,
        histogram: ArrayView1<f64>
    ) -> Vec<Window> {
        let (height, width) = self.window_shape();

        let threshold = histogram.mean().unwrap_or(0.0) + histogram.std(0.0);
        let distance = self.calib.get_pixels(self.params.min_line_width_m).max(1) as usize;
        let peaks = signal::find_peaks(histogram, Some(threshold), distance);

        let img_height = image.height() as i32;
        let centre = image.width() as i32 / 2;
        let mut windows: Vec<Window> = peaks.iter()
            .map(|&p| Window::new(
                p as i32, img_height, height, width, self.params.direction_memory
            ))
            .collect();

        for _ in 0..(img_height / height) {
            mark_collisions(&mut windows, centre);

            for window in windows.iter_mut().filter(|w| !w.collided) {
                window.step(image, &self.params);
            }
        }

        windows
    }

    /// Remove horizontal bands wider than a line from the image, returning the
    /// number of bands removed.
    fn filter_zebra(&self, image: &mut GrayImage) -> usize {
        let zebra = &self.params.zebra_filter;
        let max_width = self.calib.get_pixels(self.params.max_line_width_m).max(1);

        let histogram = row_histogram(image);
        let peaks = signal::find_peaks(
            histogram.view(),
            Some(zebra.zebra_crossing_threshold),
            (4 * max_width) as usize
        );

        let mut removed = 0;
        for band in signal::peak_widths(histogram.view(), &peaks, zebra.rel_height) {
            if band.width <= max_width as f64 {
                continue
            }

            let top = band.left.floor().max(0.0) as u32;
            let bottom = (band.right.ceil() as u32).min(image.height());
            for row in top..bottom {
                for col in 0..image.width() {
                    image.put_pixel(col, row, Luma([0]));
                }
            }

            removed += 1;
        }

        removed
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the lines between the nearest solid line on each side of `position`.
///
/// The bounding solid lines are included. If there is no solid line on one
/// side the slice extends to that end of `lines`. Empty lines never bound the
/// slice.
pub fn filter_lines(lines: &[Line], position: i32) -> &[Line] {
    let is_boundary = |l: &Line| l.line_type == LineType::Solid && !l.is_empty();

    let right = lines.iter().position(
        |l| is_boundary(l) && l.start_x().map_or(false, |x| x >= position)
    );

    let start = lines[..right.unwrap_or(lines.len())]
        .iter()
        .rposition(is_boundary)
        .unwrap_or(0);
    let end = right.map(|i| i + 1).unwrap_or(lines.len());

    &lines[start..end]
}

/// Sum the intensity of each column of the image.
///
/// If `weighted` the rows are weighted on a logarithmic ramp, from 1 at the
/// bottom of the image down to 0.1 at the top.
pub fn column_histogram(image: &GrayImage, weighted: bool) -> Array1<f64> {
    let height = image.height() as usize;

    let weights: Array1<f64> = match weighted && height > 1 {
        true => Array1::from_shape_fn(height, |r| {
            NEAR_FIELD_WEIGHT_RATIO.powf(r as f64 / (height - 1) as f64 - 1.0)
        }),
        false => Array1::ones(height)
    };

    let mut histogram = Array1::zeros(image.width() as usize);
    for (col, row, px) in image.enumerate_pixels() {
        histogram[col as usize] += px[0] as f64 * weights[row as usize];
    }

    histogram
}

/// Sum the intensity of each row of the image.
pub fn row_histogram(image: &GrayImage) -> Array1<f64> {
    let mut histogram = Array1::zeros(image.height() as usize);
    for (_, row, px) in image.enumerate_pixels() {
        histogram[row as usize] += px[0] as f64;
    }

    histogram
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Retire windows which have run into each other.
///
/// If both windows found the line in the last step they are tracing the same
/// line, and the one farther from the `centre` column is retired. If only one
/// found it the other has merged into it.
fn mark_collisions(windows: &mut [Window], centre: i32) {
    for i in 0..windows.len() {
        for j in (i + 1)..windows.len() {
            if windows[i].collided || windows[j].collided {
                continue
            }

            if !windows[i].overlaps(&windows[j]) {
                continue
            }

            match (windows[i].found_in_previous, windows[j].found_in_previous) {
                (true, true) => {
                    match (windows[j].x - centre).abs() <= (windows[i].x - centre).abs() {
                        true => windows[i].collided = true,
                        false => windows[j].collided = true
                    }
                },
                (true, false) => windows[j].collided = true,
                (false, true) => windows[i].collided = true,
                (false, false) => ()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::path_gen::{PathGenerator, test::test_path_params};

    pub(crate) fn test_params() -> LineDetParams {
        LineDetParams {
            window_height_m: 0.5,
            window_width_m: 1.0,
            min_line_width_m: 0.1,
            max_line_width_m: 0.3,
            min_pixels_in_window: 5,
            min_shift_fraction: 0.5,
            width_growth_factor: 1.5,
            max_width_growth: 2.0,
            direction_memory: 3,
            drop_last_on_miss: true,
            base_gaps_allowed: 2,
            zebra_filter: ZebraFilterParams {
                active: false,
                zebra_crossing_threshold: 20000.0,
                rel_height: 0.98
            }
        }
    }

    /// 20 pixels per meter, 400 x 600 pixel image
    pub(crate) fn test_calib() -> Arc<Calibration> {
        Arc::new(Calibration {
            pixels_per_meter: 20.0,
            output_shape: [400, 600]
        })
    }

    /// Draw a filled rectangle into the image
    pub(crate) fn draw_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
        for row in y..(y + h).min(img.height()) {
            for col in x..(x + w).min(img.width()) {
                img.put_pixel(col, row, Luma([255]));
            }
        }
    }

    /// Two solid lines 150 pixels apart either side of the image centre
    pub(crate) fn straight_road() -> GrayImage {
        let mut img = GrayImage::new(400, 600);
        draw_rect(&mut img, 123, 0, 4, 600);
        draw_rect(&mut img, 273, 0, 4, 600);
        img
    }

    /// Same as the shipped line detection parameters
    pub(crate) fn curved_params() -> LineDetParams {
        LineDetParams {
            window_height_m: 0.4,
            window_width_m: 1.2,
            max_line_width_m: 0.5,
            max_width_growth: 3.0,
            zebra_filter: ZebraFilterParams {
                active: true,
                ..test_params().zebra_filter
            },
            ..test_params()
        }
    }

    /// 25 pixels per meter, 1000 x 800 pixel image
    pub(crate) fn curved_calib() -> Arc<Calibration> {
        Arc::new(Calibration {
            pixels_per_meter: 25.0,
            output_shape: [1000, 800]
        })
    }

    /// A three lane road curving gently to the right, with dashed lane
    /// dividers and a zebra crossing.
    ///
    /// The dividers leave two maxima in the column histogram a few pixels
    /// apart, so two windows start on each of them.
    pub(crate) fn curved_road() -> GrayImage {
        let (width, height) = (1000u32, 800u32);
        let mut img = GrayImage::new(width, height);

        for row in 0..height {
            let t = (height - row) as f64 / height as f64;
            let shift = (60.0 * t * t) as u32;

            for (i, base) in [200u32, 400, 600, 800].iter().enumerate() {
                let dashed = i == 1 || i == 2;
                if dashed && (row / 40) % 2 == 1 {
                    continue
                }

                draw_rect(&mut img, base + shift, row, 6, 1);
            }
        }

        draw_rect(&mut img, 200, 300, 600, 15);

        img
    }

    #[test]
    fn test_detect_straight() {
        let det = LineDetector::new(&test_params(), test_calib());
        let lines = det.detect(&straight_road());

        assert_eq!(lines.len(), 2);
        for line in lines.iter() {
            assert_eq!(line.line_type, LineType::Solid);
            assert_eq!(line.len(), 60);

            // Near to far ordering
            for p in line.points.windows(2) {
                assert!(p[1].y <= p[0].y);
            }
        }

        assert!((lines[0].start_x().unwrap() - 125).abs() <= 1);
        assert!((lines[1].start_x().unwrap() - 275).abs() <= 1);
    }

    #[test]
    fn test_detect_dashed() {
        let mut img = straight_road();

        // Centre dashed line, 30 pixels on and 30 off
        let mut y = 0;
        while y < 600 {
            draw_rect(&mut img, 198, 570 - y, 4, 30);
            y += 60;
        }

        let det = LineDetector::new(&test_params(), test_calib());
        let lines = det.detect(&img);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line_type, LineType::Solid);
        assert_eq!(lines[1].line_type, LineType::Dashed);
        assert_eq!(lines[2].line_type, LineType::Solid);
    }

    #[test]
    fn test_detect_blank() {
        let det = LineDetector::new(&test_params(), test_calib());
        assert!(det.detect(&GrayImage::new(400, 600)).is_empty());
    }

    #[test]
    fn test_zebra_filter() {
        let mut params = test_params();
        params.zebra_filter.active = true;
        let det = LineDetector::new(&params, test_calib());

        let mut img = straight_road();
        draw_rect(&mut img, 0, 300, 400, 40);

        let mut work = img.clone();
        assert_eq!(det.filter_zebra(&mut work), 1);
        assert_eq!(work.get_pixel(200, 320)[0], 0);
        assert_eq!(work.get_pixel(125, 100)[0], 255);

        // The band leaves a gap in both lines which is allowed for
        let lines = det.detect(&img);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.line_type == LineType::Solid));
    }

    #[test]
    fn test_collisions() {
        let mut windows = vec![
            Window::new(100, 600, 10, 20, 3),
            Window::new(110, 600, 10, 20, 3),
            Window::new(200, 600, 10, 20, 3),
            Window::new(210, 600, 10, 20, 3),
        ];
        windows[0].found_in_previous = true;
        windows[1].found_in_previous = true;
        windows[2].found_in_previous = true;

        let collided = |windows: &[Window]| -> Vec<bool> {
            windows.iter().map(|w| w.collided).collect()
        };

        // The window nearer the centre survives
        let mut centred = windows.clone();
        mark_collisions(&mut centred, 200);
        assert_eq!(collided(&centred), vec![true, false, false, true]);

        let mut left = windows.clone();
        mark_collisions(&mut left, 0);
        assert_eq!(collided(&left), vec![false, true, false, true]);

        // Level with the centre the later window survives
        let mut level = windows;
        mark_collisions(&mut level, 105);
        assert_eq!(collided(&level), vec![true, false, false, true]);
    }

    #[test]
    fn test_short_lines_dropped() {
        let det = LineDetector::new(&test_params(), test_calib());

        // A stub only a few windows tall next to a full line
        let mut img = straight_road();
        draw_rect(&mut img, 198, 550, 4, 50);

        let (_, win_width) = det.window_shape();
        let histogram = column_histogram(&img, true);
        assert_eq!(det.window_search(&img, histogram.view()).len(), 3);

        let lines = det.detect(&img);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.len() > MIN_LINE_POINTS));
        assert!((lines[1].start_x().unwrap() - 275).abs() < win_width);
    }

    #[test]
    fn test_detect_curved_dashed() {
        let det = LineDetector::new(&curved_params(), curved_calib());
        let lines = det.detect(&curved_road());

        let types: Vec<LineType> = lines.iter().map(|l| l.line_type).collect();
        assert_eq!(
            types,
            vec![LineType::Solid, LineType::Dashed, LineType::Dashed, LineType::Solid]
        );

        for line in lines.iter() {
            assert!(line.len() > MIN_LINE_POINTS);

            // Every line reaches well up the image
            let rows: Vec<i32> = line.points.iter().map(|p| p.y).collect();
            assert!(rows.iter().max().unwrap() - rows.iter().min().unwrap() > 400);
        }

        // Every lane of the road can be driven
        let driving = filter_lines(&lines, 500);
        assert_eq!(driving.len(), 4);

        let path_gen = PathGenerator::new(&test_path_params(), curved_calib());
        for lane in 0..3 {
            let path = path_gen.generate(driving, lane).unwrap();
            assert!(path.len() >= 100);
        }
    }

    fn line_at(x: i32, line_type: LineType) -> Line {
        Line {
            points: vec![nalgebra::Point2::new(x, 100)],
            line_type
        }
    }

    #[test]
    fn test_filter_lines() {
        let lines = vec![
            line_at(10, LineType::Solid),
            line_at(100, LineType::Solid),
            line_at(150, LineType::Dashed),
            line_at(250, LineType::Dashed),
            line_at(300, LineType::Solid),
            line_at(390, LineType::Solid),
        ];

        let f = filter_lines(&lines, 200);
        assert_eq!(f.len(), 4);
        assert_eq!(f[0].start_x(), Some(100));
        assert_eq!(f[3].start_x(), Some(300));

        // No solid line on the right
        let f = filter_lines(&lines[..4], 200);
        assert_eq!(f.len(), 3);
        assert_eq!(f[0].start_x(), Some(100));

        // No solid line on the left
        let f = filter_lines(&lines[2..], 200);
        assert_eq!(f.len(), 3);
        assert_eq!(f[2].start_x(), Some(300));

        assert!(filter_lines(&[], 200).is_empty());
    }
}
