use super::modes::{ModulationCoupling, ModulationRange, ModulationSource, ModulationWaveform};
use serde::Serialize;

/// Wavelength modulation settings read at one point in time.
///
/// This is a read aggregate only; change settings through the individual
/// setters on [`BasikDriver`](super::BasikDriver).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthModulation {
    /// Modulation enabled
    pub enabled: bool,
    /// Modulation frequency in Hz
    pub frequency: f64,
    /// Amplitude in per-mille of full scale
    pub amplitude: f64,
    /// Offset in per-mille of full scale
    pub offset: f64,
    #[allow(missing_docs)]
    pub range: ModulationRange,
    /// `None` when neither input is selected
    pub source: Option<ModulationSource>,
    #[allow(missing_docs)]
    pub waveform: ModulationWaveform,
    #[allow(missing_docs)]
    pub coupling: ModulationCoupling,
}
