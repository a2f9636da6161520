//! Target speed policies for the lane assist

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::path_gen::Path;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Gravitational acceleration.
///
/// Units: meters/second^2
const GRAVITY_MSS: f64 = 9.81;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How the lane assist chooses the target speed for a path.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeedPolicy {
    /// Always drive at the same speed.
    Constant {
        /// Units: kilometers/hour
        speed_kmh: f64
    },

    /// Drive at the highest speed the path's corner can be taken at without
    /// sliding.
    Corner {
        friction_coefficient: f64
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SpeedPolicy {
    /// Target speed for the path in km/h, before limiting to the maximum
    /// speed.
    pub fn target_speed(&self, path: &Path) -> f64 {
        match self {
            SpeedPolicy::Constant { speed_kmh } => *speed_kmh,
            SpeedPolicy::Corner { friction_coefficient } =>
                max_corner_speed(path.radius, *friction_coefficient)
        }
    }
}

impl Default for SpeedPolicy {
    fn default() -> Self {
        SpeedPolicy::Constant { speed_kmh: 10.0 }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Highest speed in km/h at which a corner of the given radius (in meters)
/// can be taken. Infinite for a straight.
pub fn max_corner_speed(radius_m: f64, friction_coefficient: f64) -> f64 {
    (friction_coefficient * GRAVITY_MSS * radius_m).sqrt() * 3.6
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
