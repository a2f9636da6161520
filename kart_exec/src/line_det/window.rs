//! # Search window
//!
//! A window traces a single line up the image, one window height per step.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use image::GrayImage;
use nalgebra::Point2;

// Internal
use super::LineDetParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tracking state of a single line.
#[derive(Debug, Clone)]
pub struct Window {
    /// Column of the centre of the window
    pub x: i32,

    /// Row of the bottom edge of the window
    pub y: i32,

    /// Height of the window in pixels
    pub height: i32,

    /// Current width of the window in pixels, which grows while the line is
    /// lost.
    pub width: i32,

    base_width: i32,

    /// Recent horizontal steps, oldest first
    directions: VecDeque<i32>,

    direction_memory: usize,

    /// Points found so far, nearest the kart first
    pub points: Vec<Point2<i32>>,

    /// Number of steps in which the line was not found
    pub not_found: usize,

    /// If true this window has merged into another and no longer updates
    pub collided: bool,

    /// If true the line was found in the last step
    pub found_in_previous: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Window {
    /// Create a new window with its bottom edge at row `y`.
    pub fn new(x: i32, y: i32, height: i32, width: i32, direction_memory: usize) -> Self {
        Self {
            x,
            y,
            height,
            width,
            base_width: width,
            directions: VecDeque::with_capacity(direction_memory),
            direction_memory,
            points: Vec::new(),
            not_found: 0,
            collided: false,
            found_in_previous: false
        }
    }

    /// Half the current width
    pub fn margin(&self) -> i32 {
        self.width / 2
    }

    /// Returns true if the two windows overlap horizontally.
    pub fn overlaps(&self, other: &Window) -> bool {
        (self.x - other.x).abs() < self.margin() + other.margin()
    }

    /// Advance the window one step up the image.
    ///
    /// If enough pixels are set inside the window it is recentred on their
    /// mean column and a point is recorded. Otherwise the window widens and
    /// keeps moving in the recent direction of the line.
    pub fn step(&mut self, image: &GrayImage, params: &LineDetParams) {
        let y_high = self.y.max(0);
        let y_low = (self.y - self.height).max(0);
        let x_low = (self.x - self.margin()).max(0);
        let x_high = (self.x + self.margin()).min(image.width() as i32);

        // Count set pixels and accumulate their columns
        let mut count = 0usize;
        let mut col_sum = 0i64;
        for row in y_low..y_high.min(image.height() as i32) {
            for col in x_low..x_high {
                if image.get_pixel(col as u32, row as u32)[0] > 0 {
                    count += 1;
                    col_sum += col as i64;
                }
            }
        }

        if count > params.min_pixels_in_window {
            let new_x = (col_sum as f64 / count as f64).round() as i32;
            self.accept(Point2::new(new_x, y_low), params.min_shift_fraction);
            self.found_in_previous = true;
            self.width = self.base_width;
        }
        else {
            self.not_found += 1;

            if self.found_in_previous && params.drop_last_on_miss {
                self.points.pop();
            }
            self.found_in_previous = false;

            let max_width = (self.base_width as f64 * params.max_width_growth) as i32;
            self.width = ((self.width as f64 * params.width_growth_factor) as i32)
                .min(max_width)
                .max(self.base_width);

            self.x += self.mean_direction();
        }

        self.y = y_low;
    }

    /// Record a newly found point and move the window onto it.
    fn accept(&mut self, point: Point2<i32>, min_shift_fraction: f64) {
        let min_shift = self.height as f64 * min_shift_fraction;

        let crowded = match self.points.last() {
            Some(prev) => {
                let dx = (point.x - prev.x) as f64;
                let dy = (point.y - prev.y) as f64;
                dx.hypot(dy) < min_shift
            },
            None => false
        };

        if !crowded {
            self.points.push(point);
        }

        if self.direction_memory > 0 {
            if self.directions.len() == self.direction_memory {
                self.directions.pop_front();
            }
            self.directions.push_back(point.x - self.x);
        }

        self.x = point.x;
    }

    /// Mean of the recent horizontal steps, 0 if there are none
    fn mean_direction(&self) -> i32 {
        if self.directions.is_empty() {
            return 0
        }

        let sum: i32 = self.directions.iter().sum();
        (sum as f64 / self.directions.len() as f64).round() as i32
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
