//! # Kart library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to
//! access the perception and control modules of the kart.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Calibration - metric scale of the top-down image and the frame sources
/// which provide it
pub mod calib;

/// CAN controller - actuation demands and feedback listeners
pub mod can_ctrl;

/// Lane assist - the per-frame perception to control loop
pub mod lane_assist;

/// Line detection - finds lane and stop lines in the top-down image
pub mod line_det;

/// Parameters of the whole kart
pub mod params;

/// Path following - steers the kart along the generated path
pub mod path_follow;

/// Path generation - builds a smoothed centre line for the requested lane
pub mod path_gen;

/// Speed control - converts a target speed into throttle and brake demands
pub mod speed_ctrl;

/// Stop line assist - stops the kart at stop lines when asked to
pub mod stop_line_assist;
