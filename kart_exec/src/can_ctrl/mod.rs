//! # CAN controller module
//!
//! The CAN controller is the actuation sink of the kart. Steering, throttle
//! and brake demands are written through it, and feedback messages from the
//! bus are delivered to listeners registered against a message identifier.
//!
//! The bus transport itself lives outside this crate, implementations of
//! [`CanController`] wrap it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub(crate) mod sim;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use sim::{Actuation, ActuationDems, SimCanController, SimSpeedModel, SimSpeedParams};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use comms_if::eqpt::can::{CanMessage, Gear};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Limit of the steering demand in either direction
pub const MAX_STEERING_FRACTION: f64 = 1.25;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// A callback invoked with every message received for the identifier it was
/// registered against.
pub type CanListener = Box<dyn Fn(&CanMessage) + Send + Sync>;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Interface to the kart's actuators and sensors on the CAN bus.
///
/// All methods take `&self` as the controller is shared between the frame
/// loop and the feedback listener context.
pub trait CanController: Send + Sync {
    /// Set the steering demand, a fraction of full lock in
    /// `[-MAX_STEERING_FRACTION, MAX_STEERING_FRACTION]`.
    fn set_steering(&self, fraction: f64);

    /// Set the throttle demand in percent, and the gear to drive in.
    fn set_throttle(&self, percent: u8, gear: Gear);

    /// Set the brake demand in percent.
    fn set_brake(&self, percent: u8);

    /// Register a listener for messages with the given identifier.
    fn add_listener(&self, id: u32, listener: CanListener);
}
