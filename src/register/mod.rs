//! Register map of the Basik K1x2 seed laser module.
//!
//! Each [`Register`] resolves at compile time to a fixed [`RegisterSpec`]:
//! bus address, wire type, unit scaling and whether the module accepts
//! writes. The [`codec`] submodule is the only place raw wire units are
//! converted to physical units and back.

pub mod codec;

pub use codec::{RegisterCodec, RegisterValue};

use crate::hardware::WireType;
use serde::Serialize;
use std::fmt;

/// Decimal unit scaling of a register.
///
/// The scale factor is always a negative power of ten, so it is stored as the
/// number of raw counts per physical unit. Reads divide by it, writes multiply
/// by it; both are exact for the integer counts involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    counts_per_unit: u32,
}

impl Scale {
    /// Scale where one physical unit equals `counts_per_unit` raw counts
    pub const fn per_unit(counts_per_unit: u32) -> Self {
        Self { counts_per_unit }
    }

    /// The multiplicative factor applied on read (e.g. 0.1)
    pub fn factor(self) -> f64 {
        1.0 / self.counts_per_unit as f64
    }

    /// Raw counts to physical units
    pub fn to_physical(self, raw: f64) -> f64 {
        raw / self.counts_per_unit as f64
    }

    /// Physical units to raw counts, before truncation
    pub fn to_raw(self, physical: f64) -> f64 {
        physical * self.counts_per_unit as f64
    }
}

/// Static description of a register
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterSpec {
    /// Bus address
    pub address: u8,
    /// Wire type used on read and write
    pub wire: WireType,
    /// Unit scaling, if the register carries a scaled quantity
    pub scale: Option<Scale>,
    /// Physical unit after scaling
    pub unit: Option<&'static str>,
    /// Whether the module accepts writes to this register
    pub writable: bool,
}

/// Named registers of the Basik module
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Register {
    Emission,
    WavelengthOffset,
    WavelengthCenter,
    OutputPowerMw,
    OutputPowerDbm,
    OutputPowerSetpointMw,
    OutputPowerSetpointDbm,
    Temperature,
    Setup,
    Status,
    Error,
    WavelengthOffsetReadout,
    Name,
    SupplyVoltage,
    SerialNumber,
    WavelengthModulation,
    ModulationSetup,
    WavelengthModulationFrequency,
    WavelengthModulationLevel,
    WavelengthModulationOffset,
    AmplitudeModulationFrequency,
    AmplitudeModulationDepth,
}

const fn spec(
    address: u8,
    wire: WireType,
    scale: Option<Scale>,
    unit: Option<&'static str>,
    writable: bool,
) -> RegisterSpec {
    RegisterSpec {
        address,
        wire,
        scale,
        unit,
        writable,
    }
}

const TENTHS: Option<Scale> = Some(Scale::per_unit(10));
const HUNDREDTHS: Option<Scale> = Some(Scale::per_unit(100));
const THOUSANDTHS: Option<Scale> = Some(Scale::per_unit(1_000));
const TEN_THOUSANDTHS: Option<Scale> = Some(Scale::per_unit(10_000));

impl Register {
    /// Every register in the map
    pub const ALL: [Register; 22] = [
        Register::Emission,
        Register::WavelengthOffset,
        Register::WavelengthCenter,
        Register::OutputPowerMw,
        Register::OutputPowerDbm,
        Register::OutputPowerSetpointMw,
        Register::OutputPowerSetpointDbm,
        Register::Temperature,
        Register::Setup,
        Register::Status,
        Register::Error,
        Register::WavelengthOffsetReadout,
        Register::Name,
        Register::SupplyVoltage,
        Register::SerialNumber,
        Register::WavelengthModulation,
        Register::ModulationSetup,
        Register::WavelengthModulationFrequency,
        Register::WavelengthModulationLevel,
        Register::WavelengthModulationOffset,
        Register::AmplitudeModulationFrequency,
        Register::AmplitudeModulationDepth,
    ];

    /// Address, wire type and scaling of this register
    pub const fn spec(self) -> RegisterSpec {
        use WireType::*;
        match self {
            Register::Emission => spec(0x30, U8, None, Some("bool"), true),
            Register::WavelengthOffset => spec(0x2A, I16, TENTHS, Some("pm"), true),
            Register::WavelengthCenter => spec(0x32, U32, TEN_THOUSANDTHS, Some("nm"), true),
            Register::OutputPowerMw => spec(0x17, U16, HUNDREDTHS, Some("mW"), false),
            Register::OutputPowerDbm => spec(0x90, U16, HUNDREDTHS, Some("dBm"), false),
            Register::OutputPowerSetpointMw => spec(0x22, U16, HUNDREDTHS, Some("mW"), true),
            Register::OutputPowerSetpointDbm => spec(0xA0, I16, HUNDREDTHS, Some("dBm"), true),
            Register::Temperature => spec(0x1C, I16, TENTHS, Some("C"), false),
            Register::Setup => spec(0x31, U16, None, None, true),
            Register::Status => spec(0x66, U16, None, None, false),
            Register::Error => spec(0x67, U16, None, None, false),
            Register::WavelengthOffsetReadout => spec(0x72, I16, TENTHS, Some("pm"), false),
            Register::Name => spec(0x8D, Ascii, None, None, true),
            Register::SupplyVoltage => spec(0x1E, U16, THOUSANDTHS, Some("V"), false),
            Register::SerialNumber => spec(0x65, Ascii, None, None, false),
            Register::WavelengthModulation => spec(0xB5, U8, None, Some("bool"), true),
            Register::ModulationSetup => spec(0xB7, U16, None, None, true),
            Register::WavelengthModulationFrequency => spec(0xB8, F32, None, Some("Hz"), true),
            Register::WavelengthModulationLevel => {
                spec(0x2B, U16, TENTHS, Some("permille"), false)
            }
            Register::WavelengthModulationOffset => {
                spec(0x2F, I16, TENTHS, Some("permille"), false)
            }
            Register::AmplitudeModulationFrequency => spec(0xBA, F32, None, Some("Hz"), false),
            Register::AmplitudeModulationDepth => spec(0x2C, U16, None, None, false),
        }
    }

    /// Register name as printed in the vendor documentation
    pub const fn name(self) -> &'static str {
        match self {
            Register::Emission => "EMISSION",
            Register::WavelengthOffset => "WAVELENGTH_OFFSET",
            Register::WavelengthCenter => "WAVELENGTH_CENTER",
            Register::OutputPowerMw => "OUTPUT_POWER_mW",
            Register::OutputPowerDbm => "OUTPUT_POWER_dBm",
            Register::OutputPowerSetpointMw => "OUTPUT_POWER_SETPOINT_mW",
            Register::OutputPowerSetpointDbm => "OUTPUT_POWER_SETPOINT_dBm",
            Register::Temperature => "TEMPERATURE",
            Register::Setup => "SETUP",
            Register::Status => "STATUS",
            Register::Error => "ERROR",
            Register::WavelengthOffsetReadout => "WAVELENGTH_OFFSET_READOUT",
            Register::Name => "NAME",
            Register::SupplyVoltage => "SUPPLY_VOLTAGE",
            Register::SerialNumber => "SERIAL_NUMBER",
            Register::WavelengthModulation => "WAVELENGTH_MODULATION",
            Register::ModulationSetup => "MODULATION_SETUP",
            Register::WavelengthModulationFrequency => "WAVELENGTH_MODULATION_FREQUENCY",
            Register::WavelengthModulationLevel => "WAVELENGTH_MODULATION_LEVEL",
            Register::WavelengthModulationOffset => "WAVELENGTH_MODULATION_OFFSET",
            Register::AmplitudeModulationFrequency => "AMPLITUDE_MODULATION_FREQUENCY",
            Register::AmplitudeModulationDepth => "AMPLITUDE_MODULATION_DEPTH",
        }
    }

    /// Bus address
    pub const fn address(self) -> u8 {
        self.spec().address
    }

    /// Look a register up by bus address
    pub fn from_address(address: u8) -> Option<Register> {
        Register::ALL.iter().copied().find(|r| r.address() == address)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
