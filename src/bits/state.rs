//! Named-flag views over the Basik status, error and setup words.
//!
//! Each view is decoded once from a raw register value and is immutable
//! afterwards. Bits the module sets that have no name are logged and ignored.

use super::{BitField, REGISTER_WIDTH};
use serde::Serialize;
use std::fmt;
use tracing::warn;

macro_rules! state_view {
    (
        $(#[$meta:meta])*
        $view:ident, $bit:ident, $register:literal {
            $($variant:ident => $field:ident = $pos:literal, $label:literal;)+
        }
    ) => {
        /// Bit positions of the
        #[doc = $register]
        /// register
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $bit {
            $(#[allow(missing_docs)] $variant,)+
        }

        impl $bit {
            /// Every named bit, in ascending bit order
            pub const ALL: &'static [$bit] = &[$($bit::$variant,)+];

            /// Bit position in the register
            pub const fn position(self) -> u8 {
                match self {
                    $($bit::$variant => $pos,)+
                }
            }

            /// Flag name as shown in the vendor documentation
            pub const fn label(self) -> &'static str {
                match self {
                    $($bit::$variant => $label,)+
                }
            }

            /// Look a flag up by bit position
            pub fn from_position(position: u8) -> Option<Self> {
                Self::ALL.iter().copied().find(|b| b.position() == position)
            }
        }

        impl fmt::Display for $bit {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
        pub struct $view {
            $(#[allow(missing_docs)] pub $field: bool,)+
            #[serde(skip)]
            raw: u32,
        }

        impl $view {
            /// Decode a raw register value
            pub fn decode(raw: u32) -> Self {
                let bits = BitField::new(raw, REGISTER_WIDTH);
                for position in bits.get_set_bits() {
                    if $bit::from_position(position).is_none() {
                        warn!(register = $register, bit = position, raw, "Ignoring unknown bit");
                    }
                }
                Self {
                    $($field: bits.get_bit($pos),)+
                    raw: bits.value(),
                }
            }

            /// The register value this view was decoded from
            pub fn raw(&self) -> u32 {
                self.raw
            }

            /// Whether a named flag is set
            pub fn is_set(&self, bit: $bit) -> bool {
                match bit {
                    $($bit::$variant => self.$field,)+
                }
            }

            /// Set flags in ascending bit order
            pub fn active_flags(&self) -> Vec<$bit> {
                $bit::ALL.iter().copied().filter(|b| self.is_set(*b)).collect()
            }
        }

        impl fmt::Display for $view {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let flags: Vec<&str> = self.active_flags().iter().map(|b| b.label()).collect();
                if flags.is_empty() {
                    f.write_str("-")
                } else {
                    f.write_str(&flags.join(", "))
                }
            }
        }
    };
}

state_view! {
    /// Decoded STATUS register
    Status, StatusBit, "STATUS" {
        Emission => emission = 0, "EMISSION";
        InterlockOff => interlock_off = 1, "INTERLOCK_OFF";
        Disabled => disabled = 4, "DISABLED";
        SupplyVoltageLow => supply_voltage_low = 5, "SUPPLY_VOLTAGE_LOW";
        ModuleTempRange => module_temp_range = 6, "MODULE_TEMP_RANGE";
        WaitingTemperature => waiting_temperature = 11, "WAITING_TEMPERATURE";
        WavelengthStabilized => wavelength_stabilized = 14, "WAVELENGTH_STABILIZED";
        ErrorCodePresent => error_code_present = 15, "ERROR_CODE_PRESENT";
    }
}

state_view! {
    /// Decoded ERROR register
    ErrorFlags, ErrorBit, "ERROR" {
        NoError => no_error = 0, "NO_ERROR";
        Interlock => interlock = 2, "INTERLOCK";
        LowVoltage => low_voltage = 3, "LOW_VOLTAGE";
        ModuleTemperatureRange => module_temperature_range = 7, "MODULE_TEMPERATURE_RANGE";
        ModuleDisabled => module_disabled = 8, "MODULE_DISABLED";
    }
}

state_view! {
    /// Decoded SETUP register
    Setup, SetupBit, "SETUP" {
        NarrowWavelengthModulation => narrow_wavelength_modulation = 1, "NARROW_WAVELENGTH_MODULATION";
        ExternalWavelengthModulation => external_wavelength_modulation = 2, "EXTERNAL_WAVELENGTH_MODULATION";
        WavelengthModulationDc => wavelength_modulation_dc = 3, "WAVELENGTH_MODULATION_DC";
        InternalWavelengthModulation => internal_wavelength_modulation = 4, "INTERNAL_WAVELENGTH_MODULATION";
        ModulationOutput => modulation_output = 5, "MODULATION_OUTPUT";
        PumpOperationConstantCurrent => pump_operation_constant_current = 8, "PUMP_OPERATION_CONSTANT_CURRENT";
        ExternalAmplitudeModulationSource => external_amplitude_modulation_source = 9, "EXTERNAL_AMPLITUDE_MODULATION_SOURCE";
    }
}

/// Single-bit settings of the MODULATION_SETUP register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModulationSetupBit {
    /// Amplitude modulation frequency selector
    AmplitudeModulationFrequencySelector,
    /// Amplitude modulation waveform (0 = sine, 1 = triangle)
    AmplitudeModulationWaveform,
    /// Wavelength modulation frequency selector
    WavelengthModulationFrequencySelector,
}

impl ModulationSetupBit {
    /// Bit position in the register
    pub const fn position(self) -> u8 {
        match self {
            ModulationSetupBit::AmplitudeModulationFrequencySelector => 0,
            ModulationSetupBit::AmplitudeModulationWaveform => 2,
            ModulationSetupBit::WavelengthModulationFrequencySelector => 4,
        }
    }
}

/// Packed MODULATION_SETUP register.
///
/// Bits 6-7 hold the wavelength modulation waveform code. Unlike the other
/// views this one is also encoded back into the register, so it is mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModulationSetup {
    bits: BitField,
}

impl ModulationSetup {
    const WAVEFORM_BASE: u8 = 6;
    const WAVEFORM_WIDTH: u8 = 2;

    /// Wrap a raw register value
    pub fn new(raw: u32) -> Self {
        Self {
            bits: BitField::new(raw, REGISTER_WIDTH),
        }
    }

    /// Packed register value
    pub fn raw(&self) -> u32 {
        self.bits.value()
    }

    /// Raw two-bit waveform code
    pub fn waveform_code(&self) -> u8 {
        self.bits
            .get_field(Self::WAVEFORM_BASE, Self::WAVEFORM_WIDTH) as u8
    }

    /// Replace the waveform code, leaving every other bit untouched
    pub fn set_waveform_code(&mut self, code: u8) {
        self.bits
            .set_field(Self::WAVEFORM_BASE, Self::WAVEFORM_WIDTH, code as u32);
    }

    /// State of a single-bit setting
    pub fn get(&self, bit: ModulationSetupBit) -> bool {
        self.bits.get_bit(bit.position())
    }

    /// Change a single-bit setting
    pub fn set(&mut self, bit: ModulationSetupBit, on: bool) {
        self.bits.set_bit(bit.position(), on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_status_decode() {
        let status = Status::decode(0b1100_0000_0000_0001);
        assert!(status.emission);
        assert!(status.wavelength_stabilized);
        assert!(status.error_code_present);
        assert!(!status.interlock_off);
        assert_eq!(
            status.active_flags(),
            vec![
                StatusBit::Emission,
                StatusBit::WavelengthStabilized,
                StatusBit::ErrorCodePresent
            ]
        );
        assert_eq!(
            status.to_string(),
            "EMISSION, WAVELENGTH_STABILIZED, ERROR_CODE_PRESENT"
        );
    }

    #[traced_test]
    #[test]
    fn test_unknown_bits_are_logged_and_ignored() {
        let status = Status::decode(0b0000_0000_0001_1101);
        assert!(status.emission);
        assert!(status.disabled);
        assert_eq!(status.active_flags().len(), 2);
        assert_eq!(status.raw(), 0b1_1101);
        assert!(logs_contain("Ignoring unknown bit"));
    }

    #[test]
    fn test_error_and_setup_views() {
        let errors = ErrorFlags::decode(1 << 2 | 1 << 8);
        assert!(errors.interlock);
        assert!(errors.module_disabled);
        assert!(!errors.no_error);

        let setup = Setup::decode(1 << 8 | 1 << 3);
        assert!(setup.is_set(SetupBit::PumpOperationConstantCurrent));
        assert!(setup.wavelength_modulation_dc);
        assert_eq!(ErrorFlags::decode(0).to_string(), "-");
    }

    #[test]
    fn test_modulation_setup_waveform_preserves_low_bits() {
        let mut setup = ModulationSetup::new(0b1101_0101);
        assert_eq!(setup.waveform_code(), 3);

        setup.set_waveform_code(0);
        assert_eq!(setup.raw(), 0b0001_0101);
        assert!(setup.get(ModulationSetupBit::AmplitudeModulationFrequencySelector));
        assert!(setup.get(ModulationSetupBit::AmplitudeModulationWaveform));
        assert!(setup.get(ModulationSetupBit::WavelengthModulationFrequencySelector));

        setup.set_waveform_code(2);
        assert_eq!(setup.raw(), 0b1001_0101);
    }
}
