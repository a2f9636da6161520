//! # CAN Equipment Communications Module
//!
//! Identifiers of the messages on the kart's CAN bus, the gear selection sent with throttle
//! demands, and the codec for the speed sensor feedback.
//!
//! The speed sensor reports the current speed as an unsigned 16 bit big-endian integer in the
//! first two bytes of the message, in tenths of a kilometre per hour.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{BigEndian, ByteOrder};
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of data bytes in a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// Number of bytes used by the speed value in a speed sensor message
const SPEED_FEEDBACK_LEN: usize = 2;

/// Resolution of the speed sensor in km/h per LSB
const SPEED_FEEDBACK_RES_KMH: f64 = 0.1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single message on the CAN bus.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CanMessage {
    /// Arbitration identifier of the message
    pub id: u32,

    /// Payload, at most `MAX_DATA_LEN` bytes
    pub data: Vec<u8>
}

/// Decoded speed sensor feedback
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct SpeedFeedback {
    /// Current speed of the kart in kilometres per hour
    pub speed_kmh: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifiers of the control messages sent to the kart's ECUs.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
#[repr(u32)]
pub enum CanControlId {
    Brake = 0x110,
    Steering = 0x220,
    Throttle = 0x330
}

/// Identifiers of the feedback messages sent by the kart's ECUs and sensors.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
#[repr(u32)]
pub enum CanFeedbackId {
    Brake = 0x710,
    SpeedSensor = 0x440,
    SteeringEcu = 0x720,
    SteeringSensor = 0x1E5,
    Throttle = 0x730
}

/// Gear selection, sent alongside every throttle demand.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum Gear {
    Neutral = 0,
    Drive = 1,
    Reverse = 2
}

/// Errors which can occur while building or decoding CAN messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanError {
    #[error("Message payload of {0} bytes exceeds the maximum of {} bytes", MAX_DATA_LEN)]
    DataTooLong(usize),

    #[error("Message payload of {found} bytes is shorter than the expected {expected} bytes")]
    DataTooShort {
        expected: usize,
        found: usize
    },

    #[error("Unexpected message identifier {0:#X}")]
    UnexpectedId(u32)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CanControlId {
    /// Get the raw arbitration identifier
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl CanFeedbackId {
    /// Get the raw arbitration identifier
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl Gear {
    /// Get the value of the gear as sent on the bus
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl Default for Gear {
    fn default() -> Self {
        Gear::Neutral
    }
}

impl CanMessage {
    /// Create a new message, checking the payload fits in a single frame.
    pub fn new(id: u32, data: &[u8]) -> Result<Self, CanError> {
        if data.len() > MAX_DATA_LEN {
            return Err(CanError::DataTooLong(data.len()))
        }

        Ok(Self {
            id,
            data: data.to_vec()
        })
    }
}

impl SpeedFeedback {
    /// Decode the speed feedback from a speed sensor message.
    ///
    /// Only the first two bytes are used, any further bytes are ignored.
    pub fn from_message(msg: &CanMessage) -> Result<Self, CanError> {
        if msg.id != CanFeedbackId::SpeedSensor.id() {
            return Err(CanError::UnexpectedId(msg.id))
        }

        if msg.data.len() < SPEED_FEEDBACK_LEN {
            return Err(CanError::DataTooShort {
                expected: SPEED_FEEDBACK_LEN,
                found: msg.data.len()
            })
        }

        let raw = BigEndian::read_u16(&msg.data[..SPEED_FEEDBACK_LEN]);

        Ok(Self {
            speed_kmh: raw as f64 * SPEED_FEEDBACK_RES_KMH
        })
    }

    /// Encode this feedback into a speed sensor message.
    ///
    /// Speeds outside the representable range saturate at 0 and 6553.5 km/h.
    pub fn to_message(&self) -> CanMessage {
        let raw = (self.speed_kmh / SPEED_FEEDBACK_RES_KMH)
            .round()
            .max(0.0)
            .min(u16::MAX as f64) as u16;

        let mut data = vec![0u8; SPEED_FEEDBACK_LEN];
        BigEndian::write_u16(&mut data, raw);

        CanMessage {
            id: CanFeedbackId::SpeedSensor.id(),
            data
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ids() {
        assert_eq!(CanControlId::Brake.id(), 0x110);
        assert_eq!(CanControlId::Steering.id(), 0x220);
        assert_eq!(CanControlId::Throttle.id(), 0x330);
        assert_eq!(CanFeedbackId::SpeedSensor.id(), 0x440);
        assert_eq!(CanFeedbackId::SteeringSensor.id(), 0x1E5);
        assert_eq!(Gear::Reverse.value(), 2);
    }

    #[test]
    fn test_speed_feedback_decode() {
        // 0x012C = 300 tenths of km/h
        let msg = CanMessage::new(0x440, &[0x01, 0x2C, 0xFF, 0xFF]).unwrap();
        let fb = SpeedFeedback::from_message(&msg).unwrap();
        assert!((fb.speed_kmh - 30.0).abs() < 1e-9);

        // Byte order matters
        let msg = CanMessage::new(0x440, &[0x2C, 0x01]).unwrap();
        let fb = SpeedFeedback::from_message(&msg).unwrap();
        assert!((fb.speed_kmh - 1126.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_feedback_encode() {
        let msg = SpeedFeedback { speed_kmh: 12.3 }.to_message();
        assert_eq!(msg.id, 0x440);
        assert_eq!(msg.data, vec![0x00, 0x7B]);

        let msg = SpeedFeedback { speed_kmh: -4.0 }.to_message();
        assert_eq!(msg.data, vec![0x00, 0x00]);
    }

    #[test]
    fn test_speed_feedback_invalid() {
        let msg = CanMessage::new(0x440, &[0x01]).unwrap();
        assert_eq!(
            SpeedFeedback::from_message(&msg),
            Err(CanError::DataTooShort { expected: 2, found: 1 })
        );

        let msg = CanMessage::new(0x710, &[0x01, 0x2C]).unwrap();
        assert_eq!(
            SpeedFeedback::from_message(&msg),
            Err(CanError::UnexpectedId(0x710))
        );

        assert_eq!(
            CanMessage::new(0x440, &[0u8; 9]),
            Err(CanError::DataTooLong(9))
        );
    }
}
