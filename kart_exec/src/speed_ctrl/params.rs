//! Speed controller parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the speed controller
#[derive(Deserialize, Debug, Clone)]
pub struct SpeedCtrlParams {
    /// Braking demands
    pub braking: BrakingParams,

    /// Friction coefficient between the tyres and the road, used for the
    /// braking distance.
    pub friction_coefficient: f64,

    /// Speed ceiling of each speed mode
    pub speed_modes: SpeedModes,

    /// The selected speed mode. Its ceiling is full throttle and the initial
    /// maximum speed.
    pub selected_mode: SpeedMode,

    /// If true the controller actuates from start up, otherwise it must be
    /// toggled on.
    pub start_enabled: bool
}

/// Braking parameters
#[derive(Deserialize, Debug, Clone)]
pub struct BrakingParams {
    /// Speed above the target at which braking starts
    ///
    /// Units: km/h
    pub margin_kmh: f64,

    /// Brake demand when over speed
    ///
    /// Units: percent
    pub min_force: u8,

    /// Brake demand when stopped
    ///
    /// Units: percent
    pub max_force: u8
}

/// Speed ceiling of each speed mode.
///
/// Units: km/h
#[derive(Deserialize, Debug, Clone)]
pub struct SpeedModes {
    pub slow: f64,
    pub medium: f64,
    pub fast: f64,
    pub very_fast: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    Slow,
    Medium,
    Fast,
    VeryFast
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SpeedModes {
    /// Get the speed ceiling of the given mode
    pub fn ceiling(&self, mode: SpeedMode) -> f64 {
        match mode {
            SpeedMode::Slow => self.slow,
            SpeedMode::Medium => self.medium,
            SpeedMode::Fast => self.fast,
            SpeedMode::VeryFast => self.very_fast
        }
    }
}

impl SpeedCtrlParams {
    /// Speed ceiling of the selected mode
    ///
    /// Units: km/h
    pub fn selected_ceiling(&self) -> f64 {
        self.speed_modes.ceiling(self.selected_mode)
    }
}
