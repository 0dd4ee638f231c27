//! Basik seed laser device layer.
//!
//! [`BasikDriver`] turns register reads and writes into physical-unit
//! properties; [`modes`] holds the enumerated properties and their coercion
//! rules.

pub mod basik;
pub mod modes;
pub mod modulation;

pub use basik::BasikDriver;
pub use modes::{
    coerce, CodedEnum, IntoCoded, LaserMode, ModulationCoupling, ModulationRange,
    ModulationSource, ModulationWaveform,
};
pub use modulation::WavelengthModulation;
