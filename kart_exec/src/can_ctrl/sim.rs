//! # Simulated CAN controller
//!
//! Records all demands instead of sending them to a bus, and dispatches
//! injected feedback messages to the registered listeners.
//!
//! A simple model of the kart's speed can be run alongside, reporting the
//! speed that the current demands would produce as speed sensor feedback.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender}
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};
use log::{info, trace};
use serde::{Deserialize, Serialize};

// Internal
use super::{CanController, CanListener, MAX_STEERING_FRACTION};
use comms_if::eqpt::can::{CanMessage, Gear, SpeedFeedback};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The latest demand of each actuator.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct ActuationDems {
    pub steering: f64,
    pub throttle: u8,
    pub gear: Gear,
    pub brake: u8
}

/// A CAN controller which records demands rather than sending them.
#[derive(Default)]
pub struct SimCanController {
    dems: Mutex<ActuationDems>,

    history: Mutex<Vec<Actuation>>,

    listeners: Mutex<HashMap<u32, Vec<CanListener>>>
}

/// Parameters of the simulated speed response
#[derive(Deserialize, Debug, Clone)]
pub struct SimSpeedParams {
    /// Speed reached at full throttle.
    ///
    /// Units: kilometers/hour
    pub top_speed_kmh: f64,

    /// Time constant of the response to the throttle.
    ///
    /// Units: seconds
    pub time_constant_s: f64,

    /// Deceleration at full brake.
    ///
    /// Units: kilometers/hour/second
    pub max_decel_kmh_s: f64,

    /// Period between speed feedback messages.
    ///
    /// Units: milliseconds
    pub feedback_period_ms: u64
}

/// First order model of the kart's speed.
#[derive(Debug, Clone)]
pub struct SimSpeedModel {
    params: SimSpeedParams,

    speed_kmh: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single demand issued to the controller.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum Actuation {
    Steering(f64),
    Throttle(u8, Gear),
    Brake(u8)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimCanController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the latest demands.
    pub fn dems(&self) -> ActuationDems {
        *self.dems.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get every demand issued since the last call to `clear_history`, oldest
    /// first.
    pub fn history(&self) -> Vec<Actuation> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Deliver a message to all listeners registered for its identifier,
    /// returning the number of listeners called.
    pub fn dispatch(&self, msg: &CanMessage) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);

        match listeners.get(&msg.id) {
            Some(ls) => {
                for l in ls.iter() {
                    l(msg);
                }
                ls.len()
            },
            None => 0
        }
    }

    /// Start a thread which dispatches every message received on `rx`.
    ///
    /// The thread exits once all senders of the channel have been dropped.
    pub fn spawn_feedback_thread(self: &Arc<Self>, rx: Receiver<CanMessage>) -> JoinHandle<()> {
        let can = Arc::clone(self);

        thread::spawn(move || {
            info!("CAN feedback thread started");

            let mut num_msgs = 0usize;
            for msg in rx.iter() {
                trace!("Feedback message {:#X}: {:?}", msg.id, msg.data);
                can.dispatch(&msg);
                num_msgs += 1;
            }

            info!("CAN feedback thread stopped after {} messages", num_msgs);
        })
    }

    /// Start a thread which steps the speed model every feedback period and
    /// sends the modelled speed on `tx`.
    ///
    /// The thread exits, dropping `tx`, once `running` is cleared or the
    /// receiving end of the channel is gone.
    pub fn spawn_speed_model(
        self: &Arc<Self>,
        mut model: SimSpeedModel,
        tx: Sender<CanMessage>,
        running: Arc<AtomicBool>
    ) -> JoinHandle<()> {
        let can = Arc::clone(self);
        let period = Duration::from_millis(model.params.feedback_period_ms);

        thread::spawn(move || {
            info!("Speed model started");

            let mut last = Instant::now();
            while running.load(Ordering::SeqCst) {
                thread::sleep(period);

                let now = Instant::now();
                let speed_kmh = model.step(&can.dems(), (now - last).as_secs_f64());
                last = now;

                if tx.send(SpeedFeedback { speed_kmh }.to_message()).is_err() {
                    break
                }
            }

            info!("Speed model stopped at {:.1} km/h", model.speed_kmh());
        })
    }

    fn record(&self, act: Actuation) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).push(act);
    }
}

impl SimSpeedModel {
    /// Create a new model of a stationary kart.
    pub fn new(params: &SimSpeedParams) -> Self {
        Self {
            params: params.clone(),
            speed_kmh: 0.0
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    /// Advance the model by `dt_s` seconds under the given demands, returning
    /// the new speed.
    ///
    /// The speed tends towards the throttle's share of the top speed, or to
    /// rest in neutral, while the brake removes speed at a rate proportional
    /// to its demand. The speed never goes below zero.
    pub fn step(&mut self, dems: &ActuationDems, dt_s: f64) -> f64 {
        let dt_s = dt_s.max(0.0);

        let target = match dems.gear {
            Gear::Neutral => 0.0,
            Gear::Drive | Gear::Reverse => {
                self.params.top_speed_kmh * dems.throttle as f64 / 100.0
            }
        };

        let gain = match self.params.time_constant_s > 0.0 {
            true => (dt_s / self.params.time_constant_s).min(1.0),
            false => 1.0
        };

        let braking = self.params.max_decel_kmh_s * dems.brake as f64 / 100.0 * dt_s;

        self.speed_kmh = (self.speed_kmh + (target - self.speed_kmh) * gain - braking)
            .max(0.0);

        self.speed_kmh
    }
}

impl CanController for SimCanController {
    fn set_steering(&self, fraction: f64) {
        let fraction = fraction.max(-MAX_STEERING_FRACTION).min(MAX_STEERING_FRACTION);

        self.dems.lock().unwrap_or_else(PoisonError::into_inner).steering = fraction;
        self.record(Actuation::Steering(fraction));
    }

    fn set_throttle(&self, percent: u8, gear: Gear) {
        let percent = percent.min(100);

        {
            let mut dems = self.dems.lock().unwrap_or_else(PoisonError::into_inner);
            dems.throttle = percent;
            dems.gear = gear;
        }
        self.record(Actuation::Throttle(percent, gear));
    }

    fn set_brake(&self, percent: u8) {
        let percent = percent.min(100);

        self.dems.lock().unwrap_or_else(PoisonError::into_inner).brake = percent;
        self.record(Actuation::Brake(percent));
    }

    fn add_listener(&self, id: u32, listener: CanListener) {
        self.listeners.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(Vec::new)
            .push(listener);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
