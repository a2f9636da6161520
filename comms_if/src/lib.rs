//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the kart software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message and identifier definitions for equipment on the kart's CAN bus
pub mod eqpt;
