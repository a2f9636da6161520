//! # Path follower module
//!
//! The path follower converts a [`Path`] and the kart's position in the
//! top-down image into a steering demand.
//!
//! The target is the first path point whose distance along the path is at
//! least the look-ahead distance. The look-ahead grows from a minimum with the
//! distance the kart has covered since the previous evaluation, so the target
//! keeps pace with the kart. The lateral offset to the target, in meters, is
//! passed through a PID controller to give the steering angle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod pid;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::{sync::Arc, time::Instant};
use log::trace;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// Internal
use crate::{
    calib::Calibration,
    can_ctrl::MAX_STEERING_FRACTION,
    path_gen::Path,
    speed_ctrl::SpeedController
};
use pid::PidController;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the path follower
#[derive(Deserialize, Debug, Clone)]
pub struct PathFollowParams {
    /// Proportional gain of the steering controller
    pub k_p: f64,

    /// Integral gain of the steering controller
    pub k_i: f64,

    /// Derivative gain of the steering controller
    pub k_d: f64,

    /// Look-ahead distance when stationary or on the first evaluation.
    ///
    /// Units: meters
    pub min_lookahead_m: f64,

    /// Limit of the steering angle output in either direction.
    ///
    /// Units: degrees
    pub max_steering_angle: f64,

    /// Steering angle which corresponds to full lock on the actuator.
    ///
    /// Units: degrees
    pub max_steering_range: f64
}

pub struct PathFollower {
    params: PathFollowParams,

    calib: Arc<Calibration>,

    speed_ctrl: Arc<dyn SpeedController>,

    pid: PidController,

    prev_time: Option<Instant>,

    report: FollowReport
}

/// Report of the last path follower evaluation
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct FollowReport {
    /// Look-ahead distance along the path in pixels
    pub lookahead_px: f64,

    /// Index of the target point in the path
    pub target_index: usize,

    pub target_x: f64,
    pub target_y: f64,

    /// Lateral offset from the kart to the target, positive to the right
    pub offset_m: f64,

    /// Raw steering angle in degrees
    pub steering_angle: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathFollower {
    pub fn new(
        params: &PathFollowParams,
        calib: Arc<Calibration>,
        speed_ctrl: Arc<dyn SpeedController>
    ) -> Self {
        Self {
            params: params.clone(),
            calib,
            speed_ctrl,
            pid: PidController::new(
                params.k_p,
                params.k_i,
                params.k_d,
                0.0,
                (-params.max_steering_angle, params.max_steering_angle)
            ),
            prev_time: None,
            report: FollowReport::default()
        }
    }

    /// Get the raw steering angle, in degrees, to follow the path from
    /// `car_pos`.
    pub fn get_steering_angle(&mut self, path: &Path, car_pos: Point2<f64>) -> f64 {
        self.get_steering_angle_at(path, car_pos, Instant::now())
    }

    /// As `get_steering_angle`, evaluated at `now`.
    ///
    /// An empty path gives a zero angle and does not advance the controller.
    pub fn get_steering_angle_at(
        &mut self,
        path: &Path,
        car_pos: Point2<f64>,
        now: Instant
    ) -> f64 {
        let elapsed_s = self.prev_time
            .map(|t0| now.saturating_duration_since(t0).as_secs_f64())
            .unwrap_or(0.0);
        self.prev_time = Some(now);

        let speed_ms = self.speed_ctrl.current_speed() / 3.6;
        let lookahead_px = (self.params.min_lookahead_m + elapsed_s * speed_ms)
            * self.calib.pixels_per_meter;

        let target_index = match find_target(path, lookahead_px) {
            Some(i) => i,
            None => {
                self.report = FollowReport {
                    lookahead_px,
                    ..FollowReport::default()
                };
                return 0.0
            }
        };
        let target = path.points[target_index];

        let offset_m = (target.x - car_pos.x) / self.calib.pixels_per_meter;
        let angle = self.pid.update_at(-offset_m, now);

        self.report = FollowReport {
            lookahead_px,
            target_index,
            target_x: target.x,
            target_y: target.y,
            offset_m,
            steering_angle: angle
        };
        trace!("{:?}", self.report);

        angle
    }

    /// Get the steering demand in the actuator's convention, in
    /// `[-MAX_STEERING_FRACTION, MAX_STEERING_FRACTION]`.
    pub fn get_steering_fraction(&mut self, path: &Path, car_pos: Point2<f64>) -> f64 {
        let angle = self.get_steering_angle(path, car_pos);
        self.angle_to_fraction(angle)
    }

    pub fn angle_to_fraction(&self, angle: f64) -> f64 {
        (angle / self.params.max_steering_range).max(-1.0).min(1.0) * MAX_STEERING_FRACTION
    }

    pub fn report(&self) -> FollowReport {
        self.report
    }

    /// Forget the controller history, so the next evaluation starts from the
    /// minimum look-ahead.
    pub fn reset(&mut self) {
        self.pid.reset();
        self.prev_time = None;
        self.report = FollowReport::default();
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Index of the first point at least `lookahead_px` along the path. If the
/// path is shorter than the look-ahead the last point is used.
fn find_target(path: &Path, lookahead_px: f64) -> Option<usize> {
    if path.is_empty() {
        return None
    }

    let mut dist = 0f64;
    for i in 0..path.len() {
        if i > 0 {
            dist += (path.points[i] - path.points[i - 1]).norm();
        }
        if dist >= lookahead_px {
            return Some(i)
        }
    }

    Some(path.len() - 1)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
