//! Core library for the seed_daq application.
//!
//! Control and monitoring of NKT Basik seed lasers over the register
//! protocol. The layers, from the wire up:
//!
//! - [`hardware`]: the transport contract, result codes and an in-process
//!   simulated module.
//! - [`register`]: the register map and the codec between wire values and
//!   physical units.
//! - [`bits`]: bit-field decoding of the status, error and setup words.
//! - [`laser`]: the device driver with typed properties.
//! - [`monitor`]: the poll loop and the stabilization monitor.
//! - [`discovery`], [`control`] and [`session`]: front-end helpers used by
//!   the command-line binary.

pub mod bits;
pub mod config;
pub mod control;
pub mod data;
pub mod discovery;
pub mod error;
pub mod hardware;
pub mod laser;
pub mod logging;
pub mod monitor;
pub mod register;
pub mod session;
pub mod units;

pub use error::{LaserError, LaserResult};
pub use laser::BasikDriver;
