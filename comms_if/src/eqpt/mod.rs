//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the kart's equipment
//! (brake, steering and throttle ECUs, and the speed sensor).

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod can;
