//! # Calibration
//!
//! The calibration pipeline (camera homographies and stitching) runs outside of this crate. What
//! remains here is the metric scale of the top-down image it produces and the source of those
//! top-down frames.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::{Path, PathBuf};
use image::GrayImage;
use log::debug;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Metric calibration of the top-down image.
///
/// A single instance is loaded at start up and shared (via `Arc`) between all
/// modules that need to convert between pixels and metres.
#[derive(Deserialize, Debug, Clone)]
pub struct Calibration {
    /// Scale of the top-down image
    ///
    /// Units: pixels/meter
    pub pixels_per_meter: f64,

    /// Shape of the top-down image as `[width, height]`
    ///
    /// Units: pixels
    pub output_shape: [u32; 2]
}

/// A frame source replaying a directory of pre-computed top-down images.
///
/// Frames are returned in file name order.
pub struct ImageDirSource {
    paths: Vec<PathBuf>,
    next: usize,

    /// Expected `[width, height]` of every frame
    shape: [u32; 2]
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with producing top-down frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameSourceError {
    #[error("The top-down transform is not available: {0}")]
    TopDownUnavailable(String),

    #[error("Could not read the frame directory: {0}")]
    DirReadError(std::io::Error),

    #[error("Could not decode frame {0:?}: {1}")]
    DecodeError(PathBuf, image::ImageError)
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A producer of binary (0/255) top-down images.
///
/// Calls may block until a frame is available. `Ok(None)` signals that the
/// source is exhausted.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, FrameSourceError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Calibration {
    /// Convert a distance in metres into a whole number of pixels.
    ///
    /// Fractional pixels are truncated.
    pub fn get_pixels(&self, meters: f64) -> i32 {
        (meters * self.pixels_per_meter) as i32
    }

    /// Convert a distance in pixels into metres.
    pub fn get_distance(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_meter
    }
}

impl ImageDirSource {
    /// Create a new source from all PNG images in the given directory.
    ///
    /// Frames which are not of the given `[width, height]` were not produced
    /// by the calibrated top-down transform and are rejected when read.
    pub fn new<P: AsRef<Path>>(dir: P, shape: [u32; 2]) -> Result<Self, FrameSourceError> {
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(dir).map_err(FrameSourceError::DirReadError)? {
            let path = entry.map_err(FrameSourceError::DirReadError)?.path();

            let is_png = path.extension()
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false);

            if is_png {
                paths.push(path);
            }
        }

        paths.sort();

        debug!("Found {} frames", paths.len());

        Ok(Self {
            paths,
            next: 0,
            shape
        })
    }

    /// Number of frames the source will produce in total
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, FrameSourceError> {
        let path = match self.paths.get(self.next) {
            Some(p) => p,
            None => return Ok(None)
        };
        self.next += 1;

        let img = image::open(path)
            .map_err(|e| FrameSourceError::DecodeError(path.clone(), e))?
            .to_luma8();

        if img.dimensions() != (self.shape[0], self.shape[1]) {
            return Err(FrameSourceError::TopDownUnavailable(format!(
                "frame {:?} is {}x{}, expected {}x{}",
                path, img.width(), img.height(), self.shape[0], self.shape[1]
            )))
        }

        Ok(Some(img))
    }
}

/// A frame source over images already held in memory. Used for replaying
/// synthetic frames.
impl FrameSource for std::vec::IntoIter<GrayImage> {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, FrameSourceError> {
        Ok(self.next())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
