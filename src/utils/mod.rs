//! Utility functions and helpers
//!
//! This module contains the clock abstraction and timestamp helpers.

pub mod time;

pub use time::{iso_timestamp, system_clock, Clock, ManualClock, SystemClock};
