//! # Speed controller module
//!
//! The speed controller turns a target speed into throttle and brake demands.
//!
//! The controller is a state machine over [`SpeedControllerState`], with
//! transitions made only from outside (stop line assist, object handlers or
//! the operator). Every setter immediately recomputes the actuation:
//!
//! - When stopped the throttle is released in neutral and the brake is fully
//!   applied.
//! - Otherwise the throttle is the target speed as a percentage of the
//!   selected speed mode's ceiling, and the brake is applied at a fixed
//!   demand whenever the kart is faster than the target plus a margin.
//!
//! The current speed is updated asynchronously by a listener on the speed
//! sensor feedback message. All controller data sits behind a single mutex
//! which is held while demands are issued, so demands from the frame loop and
//! the feedback listener are never interleaved.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Internal
use crate::can_ctrl::CanController;
use comms_if::eqpt::can::{CanFeedbackId, CanMessage, Gear, SpeedFeedback};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Interface of a speed controller, as used by the rest of the kart.
///
/// Speeds are in km/h.
pub trait SpeedController: Send + Sync {
    fn state(&self) -> SpeedControllerState;

    /// Set the state, recomputing the actuation.
    fn set_state(&self, state: SpeedControllerState);

    fn gear(&self) -> Gear;

    /// Set the gear, recomputing the actuation.
    fn set_gear(&self, gear: Gear);

    fn max_speed(&self) -> f64;

    /// Set the maximum speed, lowering the target speed to it if needed.
    ///
    /// Negative speeds are rejected.
    fn set_max_speed(&self, speed_kmh: f64) -> Result<(), SpeedCtrlError>;

    fn target_speed(&self) -> f64;

    /// Set the target speed, clamped to the maximum speed.
    ///
    /// Negative speeds are rejected.
    fn set_target_speed(&self, speed_kmh: f64) -> Result<(), SpeedCtrlError>;

    /// Latest speed reported by the speed sensor
    fn current_speed(&self) -> f64;

    /// Estimated distance to stop from the current speed, in meters.
    fn get_braking_distance(&self) -> f64;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The kart's speed controller.
pub struct SpeedCtrl {
    params: SpeedCtrlParams,

    can: Arc<dyn CanController>,

    data: Mutex<StatusReport>
}

/// Snapshot of the speed controller.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: SpeedControllerState,
    pub gear: Gear,
    pub max_speed_kmh: f64,
    pub target_speed_kmh: f64,
    pub current_speed_kmh: f64,
    pub enabled: bool
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedControllerState {
    Stopped,
    WaitingToStop,
    Driving,
    Parking
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SpeedCtrlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SpeedControllerState {
    fn default() -> Self {
        SpeedControllerState::Stopped
    }
}

impl SpeedCtrl {
    /// Create a new speed controller.
    ///
    /// The controller starts stopped in neutral, with the maximum speed at the
    /// selected mode's ceiling. No demands are issued until a setter is
    /// called, and feedback is not received until `start` is called.
    pub fn new(params: &SpeedCtrlParams, can: Arc<dyn CanController>) -> Self {
        let data = StatusReport {
            state: SpeedControllerState::Stopped,
            gear: Gear::Neutral,
            max_speed_kmh: params.selected_ceiling(),
            target_speed_kmh: 0.0,
            current_speed_kmh: 0.0,
            enabled: params.start_enabled
        };

        Self {
            params: params.clone(),
            can,
            data: Mutex::new(data)
        }
    }

    /// Register the speed sensor listener with the CAN controller.
    pub fn start(self: &Arc<Self>) {
        // The CAN controller owns the listener, so hold a weak reference to
        // avoid a cycle.
        let weak = Arc::downgrade(self);

        self.can.add_listener(
            CanFeedbackId::SpeedSensor.id(),
            Box::new(move |msg| {
                if let Some(sc) = weak.upgrade() {
                    sc.on_speed_feedback(msg);
                }
            })
        );

        info!("Speed controller listening for speed feedback");
    }

    /// Start the controller and engage drive, so that the target speed is
    /// followed from now on.
    pub fn start_driving(self: &Arc<Self>) {
        self.start();
        self.set_gear(Gear::Drive);
        self.set_state(SpeedControllerState::Driving);
    }

    /// Handle a speed sensor message.
    ///
    /// Messages which cannot be decoded are ignored.
    pub fn on_speed_feedback(&self, msg: &CanMessage) {
        let fb = match SpeedFeedback::from_message(msg) {
            Ok(fb) => fb,
            Err(e) => {
                debug!("Ignoring speed feedback: {}", e);
                return
            }
        };

        let mut data = self.lock();
        data.current_speed_kmh = fb.speed_kmh;
        self.adjust_speed(&data);
    }

    /// Enable or disable the controller, returning the new enabled state.
    ///
    /// Disabling releases the throttle in neutral and fully applies the
    /// brake. While disabled no other demands are issued.
    pub fn toggle(&self) -> bool {
        let mut data = self.lock();
        data.enabled = !data.enabled;

        info!(
            "Speed controller {}", if data.enabled { "enabled" } else { "disabled" }
        );

        if data.enabled {
            self.adjust_speed(&data);
        }
        else {
            self.can.set_throttle(0, Gear::Neutral);
            self.can.set_brake(self.params.braking.max_force);
        }

        data.enabled
    }

    pub fn enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Get a snapshot of the controller
    pub fn status(&self) -> StatusReport {
        *self.lock()
    }

    /// Throttle demand in percent for the given target speed
    pub fn throttle_percentage(&self, target_speed_kmh: f64) -> u8 {
        let ceiling = self.params.selected_ceiling();

        if target_speed_kmh <= 0.0 {
            0
        }
        else if target_speed_kmh >= ceiling {
            100
        }
        else {
            (target_speed_kmh / ceiling * 100.0).round() as u8
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusReport> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue the demands for the current data. Must be called with the data
    /// lock held.
    fn adjust_speed(&self, data: &StatusReport) {
        if !data.enabled {
            return
        }

        if data.state == SpeedControllerState::Stopped {
            self.can.set_throttle(0, Gear::Neutral);
            self.can.set_brake(self.params.braking.max_force);
            return
        }

        self.can.set_throttle(self.throttle_percentage(data.target_speed_kmh), data.gear);

        let brake = match data.current_speed_kmh
            <= data.target_speed_kmh + self.params.braking.margin_kmh
        {
            true => 0,
            false => self.params.braking.min_force
        };
        self.can.set_brake(brake);
    }
}

impl SpeedController for SpeedCtrl {
    fn state(&self) -> SpeedControllerState {
        self.lock().state
    }

    fn set_state(&self, state: SpeedControllerState) {
        let mut data = self.lock();

        if data.state != state {
            info!("Speed controller state {:?} -> {:?}", data.state, state);
        }

        data.state = state;
        self.adjust_speed(&data);
    }

    fn gear(&self) -> Gear {
        self.lock().gear
    }

    fn set_gear(&self, gear: Gear) {
        let mut data = self.lock();
        data.gear = gear;
        self.adjust_speed(&data);
    }

    fn max_speed(&self) -> f64 {
        self.lock().max_speed_kmh
    }

    fn set_max_speed(&self, speed_kmh: f64) -> Result<(), SpeedCtrlError> {
        check_speed(speed_kmh, "maximum")?;

        let mut data = self.lock();
        if speed_kmh < data.target_speed_kmh {
            data.target_speed_kmh = speed_kmh;
        }
        data.max_speed_kmh = speed_kmh;
        self.adjust_speed(&data);

        Ok(())
    }

    fn target_speed(&self) -> f64 {
        self.lock().target_speed_kmh
    }

    fn set_target_speed(&self, speed_kmh: f64) -> Result<(), SpeedCtrlError> {
        check_speed(speed_kmh, "target")?;

        let mut data = self.lock();
        let mut speed_kmh = speed_kmh;
        if speed_kmh > data.max_speed_kmh {
            warn!(
                "Target speed {:.1} km/h is above the maximum, clamping to {:.1} km/h",
                speed_kmh, data.max_speed_kmh
            );
            speed_kmh = data.max_speed_kmh;
        }
        data.target_speed_kmh = speed_kmh;
        self.adjust_speed(&data);

        Ok(())
    }

    fn current_speed(&self) -> f64 {
        self.lock().current_speed_kmh
    }

    fn get_braking_distance(&self) -> f64 {
        braking_distance(self.current_speed(), self.params.friction_coefficient)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Stopping distance in meters from `speed_kmh` on a road with the given
/// friction coefficient.
pub fn braking_distance(speed_kmh: f64, friction_coefficient: f64) -> f64 {
    speed_kmh.powi(2) / (250.0 * friction_coefficient)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_speed(speed_kmh: f64, name: &str) -> Result<(), SpeedCtrlError> {
    if speed_kmh.is_nan() || speed_kmh < 0.0 {
        return Err(SpeedCtrlError::InvalidArgument(format!(
            "The {} speed must be a non-negative number, got {}", name, speed_kmh
        )))
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::can_ctrl::{Actuation, SimCanController};
    use std::thread;

    pub(crate) fn test_speed_params() -> SpeedCtrlParams {
        SpeedCtrlParams {
            braking: BrakingParams {
                margin_kmh: 2.0,
                min_force: 40,
                max_force: 100
            },
            friction_coefficient: 0.8,
            speed_modes: SpeedModes {
                slow: 25.0,
                medium: 50.0,
                fast: 75.0,
                very_fast: 100.0
            },
            selected_mode: SpeedMode::Medium,
            start_enabled: true
        }
    }

    fn setup() -> (Arc<SimCanController>, Arc<SpeedCtrl>) {
        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&test_speed_params(), can.clone()));
        sc.start();
        (can, sc)
    }

    fn feedback(can: &SimCanController, speed_kmh: f64) {
        can.dispatch(&SpeedFeedback { speed_kmh }.to_message());
    }

    #[test]
    fn test_initial() {
        let (can, sc) = setup();

        assert_eq!(sc.state(), SpeedControllerState::Stopped);
        assert_eq!(sc.gear(), Gear::Neutral);
        assert_eq!(sc.max_speed(), 50.0);
        assert_eq!(sc.target_speed(), 0.0);
        assert!(can.history().is_empty());
    }

    #[test]
    fn test_start_driving() {
        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&test_speed_params(), can.clone()));
        sc.start_driving();

        assert_eq!(sc.state(), SpeedControllerState::Driving);
        assert_eq!(sc.gear(), Gear::Drive);

        sc.set_target_speed(25.0).unwrap();
        let dems = can.dems();
        assert_eq!(dems.throttle, 50);
        assert_eq!(dems.gear, Gear::Drive);
        assert_eq!(dems.brake, 0);

        // Feedback is received
        feedback(&can, 12.0);
        assert!((sc.current_speed() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_stopped_actuation() {
        let (can, sc) = setup();

        sc.set_gear(Gear::Drive);
        sc.set_target_speed(20.0).unwrap();

        // Still stopped, so no throttle regardless of target
        let d = can.dems();
        assert_eq!(d.throttle, 0);
        assert_eq!(d.gear, Gear::Neutral);
        assert_eq!(d.brake, 100);
    }

    #[test]
    fn test_driving_throttle() {
        let (can, sc) = setup();
        sc.set_gear(Gear::Drive);
        sc.set_state(SpeedControllerState::Driving);

        sc.set_target_speed(0.0).unwrap();
        assert_eq!(can.dems().throttle, 0);

        sc.set_target_speed(20.0).unwrap();
        assert_eq!(can.dems().throttle, 40);
        assert_eq!(can.dems().gear, Gear::Drive);

        sc.set_target_speed(33.3).unwrap();
        assert_eq!(can.dems().throttle, 67);

        sc.set_target_speed(50.0).unwrap();
        assert_eq!(can.dems().throttle, 100);
    }

    #[test]
    fn test_braking() {
        let (can, sc) = setup();
        sc.set_state(SpeedControllerState::Driving);
        sc.set_target_speed(20.0).unwrap();

        feedback(&can, 22.0);
        assert_eq!(sc.current_speed(), 22.0);
        assert_eq!(can.dems().brake, 0);

        feedback(&can, 22.5);
        assert_eq!(can.dems().brake, 40);

        sc.set_target_speed(30.0).unwrap();
        assert_eq!(can.dems().brake, 0);
    }

    #[test]
    fn test_speed_clamp() {
        let (_, sc) = setup();

        sc.set_target_speed(45.0).unwrap();
        assert_eq!(sc.target_speed(), 45.0);

        sc.set_max_speed(30.0).unwrap();
        assert_eq!(sc.target_speed(), 30.0);

        sc.set_target_speed(80.0).unwrap();
        assert_eq!(sc.target_speed(), 30.0);

        for m in [0.0, 5.0, 12.5, 60.0].iter() {
            sc.set_max_speed(*m).unwrap();
            for t in [0.0, 3.0, 10.0, 55.0, 100.0].iter() {
                sc.set_target_speed(*t).unwrap();
                assert!(sc.target_speed() >= 0.0);
                assert!(sc.target_speed() <= sc.max_speed());
            }
        }
    }

    #[test]
    fn test_negative_speed() {
        let (_, sc) = setup();

        assert!(matches!(
            sc.set_target_speed(-1.0),
            Err(SpeedCtrlError::InvalidArgument(_))
        ));
        assert!(matches!(
            sc.set_max_speed(-0.1),
            Err(SpeedCtrlError::InvalidArgument(_))
        ));
        assert!(sc.set_target_speed(f64::NAN).is_err());

        assert_eq!(sc.max_speed(), 50.0);
        assert_eq!(sc.target_speed(), 0.0);
    }

    #[test]
    fn test_braking_distance() {
        let (can, sc) = setup();

        assert_eq!(sc.get_braking_distance(), 0.0);

        let mut prev = 0.0;
        for v in [5.0, 10.0, 20.0, 40.0].iter() {
            feedback(&can, *v);
            let d = sc.get_braking_distance();
            assert!(d > prev);
            prev = d;
        }

        // 40^2 / (250 * 0.8)
        assert!((prev - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_state_idempotence() {
        let (can, sc) = setup();
        sc.set_target_speed(20.0).unwrap();

        for state in [
            SpeedControllerState::Stopped,
            SpeedControllerState::Driving,
            SpeedControllerState::WaitingToStop
        ].iter() {
            sc.set_state(*state);
            let first = can.dems();

            can.clear_history();
            sc.set_state(*state);
            let hist_a = can.history();

            can.clear_history();
            sc.set_state(*state);
            let hist_b = can.history();

            assert_eq!(can.dems(), first);
            assert_eq!(hist_a, hist_b);
        }
    }

    #[test]
    fn test_toggle() {
        let (can, sc) = setup();
        sc.set_gear(Gear::Drive);
        sc.set_state(SpeedControllerState::Driving);
        sc.set_target_speed(25.0).unwrap();
        assert_eq!(can.dems().throttle, 50);

        // Disabling forces the kart to stop
        assert!(!sc.toggle());
        assert_eq!(can.dems().throttle, 0);
        assert_eq!(can.dems().gear, Gear::Neutral);
        assert_eq!(can.dems().brake, 100);

        // Setters no longer actuate, but still update the controller
        can.clear_history();
        sc.set_target_speed(40.0).unwrap();
        feedback(&can, 10.0);
        assert!(can.history().is_empty());
        assert_eq!(sc.target_speed(), 40.0);
        assert_eq!(sc.current_speed(), 10.0);

        // Enabling actuates the latest data
        assert!(sc.toggle());
        assert_eq!(can.history(), vec![
            Actuation::Throttle(80, Gear::Drive),
            Actuation::Brake(0)
        ]);
    }

    #[test]
    fn test_concurrent_setters() {
        let (can, sc) = setup();
        sc.set_state(SpeedControllerState::Driving);

        let sc_a = sc.clone();
        let a = thread::spawn(move || {
            for i in 0..200 {
                sc_a.set_max_speed((i % 50) as f64).unwrap();
            }
        });

        let sc_b = sc.clone();
        let b = thread::spawn(move || {
            for i in 0..200 {
                sc_b.set_target_speed((i % 60) as f64).unwrap();
                let s = sc_b.status();
                assert!(s.target_speed_kmh <= s.max_speed_kmh);
            }
        });

        for i in 0..200 {
            feedback(&can, (i % 30) as f64);
        }

        a.join().unwrap();
        b.join().unwrap();

        let s = sc.status();
        assert!(s.target_speed_kmh <= s.max_speed_kmh);
    }
}
