//! # PID controller
//!
//! A time-aware PID controller with a fixed setpoint and output limits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Instant;
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Previous instant that an input was passed in
    #[serde(skip)]
    prev_time: Option<Instant>,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// The value the controller drives the input towards
    setpoint: f64,

    /// Lower and upper limits of the output, also applied to the integral
    /// term to prevent windup.
    limits: (f64, f64),

    /// Previous input
    prev_input: Option<f64>,

    /// The integral term, already multiplied by the integral gain
    integral: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains, setpoint and output
    /// limits.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, setpoint: f64, limits: (f64, f64)) -> Self {
        Self {
            k_p, k_i, k_d,
            setpoint,
            limits,
            integral: 0f64,
            prev_time: None,
            prev_input: None
        }
    }

    /// Get the output of the controller for the given input, using the
    /// current time.
    pub fn update(&mut self, input: f64) -> f64 {
        self.update_at(input, Instant::now())
    }

    /// Get the output of the controller for the given input measured at
    /// `now`.
    ///
    /// On the first call after creation or a reset there is no time
    /// difference, so only the proportional term contributes.
    pub fn update_at(&mut self, input: f64, now: Instant) -> f64 {
        let error = self.setpoint - input;

        let dt = self.prev_time
            .map(|t0| now.saturating_duration_since(t0).as_secs_f64());

        if let Some(dt) = dt {
            self.integral = clamp(self.integral + self.k_i * error * dt, self.limits);
        }

        // Derivative on the input rather than the error, so the output does
        // not kick when the setpoint changes.
        let deriv = match (self.prev_input, dt) {
            (Some(prev), Some(dt)) if dt > 0.0 => -(input - prev) / dt,
            _ => 0f64
        };

        let out = clamp(
            self.k_p * error + self.integral + self.k_d * deriv,
            self.limits
        );

        self.prev_input = Some(input);
        self.prev_time = Some(now);

        out
    }

    /// Clear the integral, previous input and timing.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_input = None;
        self.prev_time = None;
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn clamp(value: f64, limits: (f64, f64)) -> f64 {
    value.max(limits.0).min(limits.1)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
