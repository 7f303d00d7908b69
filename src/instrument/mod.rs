//! Instrument drivers for the Daedalus/Icarus calibration bench.

pub mod hall_probe;
pub mod sim_magnet;

pub use hall_probe::SenisHallProbe;
pub use sim_magnet::{MagnetCalibration, SimVectorMagnet};
