//! Core library for the icarus_calib application.
//!
//! This library contains the sweep planner, measurement procedure, and
//! instrument drivers used to calibrate the Daedalus vector electromagnet
//! against its Hall-probe readout.

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod instrument;
pub mod procedure;
pub mod runner;
pub mod stats;
pub mod storage;
pub mod sweep;
pub mod tools;

pub use error::{AppResult, CalibError};
