//! # Line
//!
//! A detected line marking in the top-down image.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Point2;
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A line in the top-down image.
///
/// Points are ordered from nearest the kart (bottom of the image, high row
/// index) to farthest (top of the image, low row index). Points are
/// `(column, row)` pairs in pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub points: Vec<Point2<i32>>,
    pub line_type: LineType
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Classification of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineType {
    Solid,
    Dashed,
    Stop
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Line {
    /// Build a lane line from the points traced by a window, classifying it
    /// from the pattern of gaps between its points.
    ///
    /// A gap is an interval between consecutive points which is at least one
    /// window height longer than the nominal single window step. If there are
    /// more than `gaps_allowed` gaps the line is dashed, otherwise it is
    /// solid.
    pub fn new(points: Vec<Point2<i32>>, window_height: i32, gaps_allowed: usize) -> Self {
        let line_type = match count_gaps(&points, window_height) > gaps_allowed {
            true => LineType::Dashed,
            false => LineType::Solid
        };

        Self {
            points,
            line_type
        }
    }

    /// Build a stop line, which is not classified from its points.
    pub fn stop(points: Vec<Point2<i32>>) -> Self {
        Self {
            points,
            line_type: LineType::Stop
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Column of the point nearest the kart, if there is one.
    pub fn start_x(&self) -> Option<i32> {
        self.points.first().map(|p| p.x)
    }

    /// Mean row of all points in the line.
    pub fn mean_row(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None
        }

        let sum: f64 = self.points.iter().map(|p| p.y as f64).sum();
        Some(sum / self.points.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Count the intervals between consecutive points which span a missing window.
pub fn count_gaps(points: &[Point2<i32>], window_height: i32) -> usize {
    points.windows(2)
        .filter(|p| (p[1].y - p[0].y).abs() - window_height >= window_height)
        .count()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Build a vertical line at `x` from the given rows
    fn line_points(x: i32, rows: &[i32]) -> Vec<Point2<i32>> {
        rows.iter().map(|&y| Point2::new(x, y)).collect()
    }

    #[test]
    fn test_dashed_classification() {
        // Window height of 10, three missing windows
        let rows = [100, 90, 70, 60, 40, 30, 10, 0];
        let points = line_points(50, &rows);

        assert_eq!(count_gaps(&points, 10), 3);
        assert_eq!(Line::new(points.clone(), 10, 1).line_type, LineType::Dashed);
        assert_eq!(Line::new(points, 10, 5).line_type, LineType::Solid);
    }

    #[test]
    fn test_solid_classification() {
        let rows: Vec<i32> = (0..10).rev().map(|i| i * 10).collect();
        let line = Line::new(line_points(50, &rows), 10, 0);

        assert_eq!(line.line_type, LineType::Solid);
        assert_eq!(line.start_x(), Some(50));
        assert!((line.mean_row().unwrap() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_line() {
        let line = Line::new(Vec::new(), 10, 0);

        assert!(line.is_empty());
        assert_eq!(line.line_type, LineType::Solid);
        assert_eq!(line.start_x(), None);
        assert_eq!(line.mean_row(), None);
    }
}
