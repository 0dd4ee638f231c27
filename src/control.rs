//! Text-driven property assignment for interactive front ends.
//!
//! User text is converted to typed values here, including case-insensitive
//! enum names. The device setters underneath keep their strict rules: they
//! only see enum variants or numbers.

use crate::error::{LaserError, LaserResult};
use crate::laser::{
    BasikDriver, CodedEnum, LaserMode, ModulationCoupling, ModulationRange, ModulationSource,
    ModulationWaveform,
};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// A settable device property
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Wavelength,
    Frequency,
    Power,
    ModulationSource,
    ModulationRange,
    ModulationFrequency,
    ModulationCoupling,
    ModulationWaveform,
    MoveFrequency,
    Emission,
    Modulation,
    Mode,
    Name,
}

impl Property {
    /// Every property, in menu order
    pub const ALL: [Property; 13] = [
        Property::Wavelength,
        Property::Frequency,
        Property::Power,
        Property::ModulationSource,
        Property::ModulationRange,
        Property::ModulationFrequency,
        Property::ModulationCoupling,
        Property::ModulationWaveform,
        Property::MoveFrequency,
        Property::Emission,
        Property::Modulation,
        Property::Mode,
        Property::Name,
    ];

    /// Canonical name
    pub const fn name(self) -> &'static str {
        match self {
            Property::Wavelength => "wavelength",
            Property::Frequency => "frequency",
            Property::Power => "power",
            Property::ModulationSource => "modulation_source",
            Property::ModulationRange => "modulation_range",
            Property::ModulationFrequency => "modulation_frequency",
            Property::ModulationCoupling => "modulation_coupling",
            Property::ModulationWaveform => "modulation_waveform",
            Property::MoveFrequency => "move_frequency",
            Property::Emission => "emission",
            Property::Modulation => "modulation",
            Property::Mode => "mode",
            Property::Name => "name",
        }
    }

    /// Command names accepted in addition to [`name`](Self::name)
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Property::Wavelength => &["set_wavelength", "wavelength_setpoint"],
            Property::Frequency => &["set_frequency", "frequency_setpoint"],
            Property::Power => &["set_power", "output_power_setpoint"],
            Property::ModulationSource => &["set_mod_source", "mod_source"],
            Property::ModulationRange => &["set_mod_range", "mod_range"],
            Property::ModulationFrequency => &["set_mod_freq", "mod_freq"],
            Property::ModulationCoupling => &["set_mod_coupling", "mod_coupling"],
            Property::ModulationWaveform => &["set_mod_waveform", "mod_waveform"],
            Property::MoveFrequency => &["move_freq"],
            Property::Emission => &["set_emission"],
            Property::Modulation => &["set_modulation"],
            Property::Mode => &["set_mode"],
            Property::Name => &["set_name"],
        }
    }

    /// Input hint shown next to the property
    pub fn hint(self) -> String {
        fn names<E: CodedEnum>() -> String {
            let names: Vec<String> = E::VARIANTS
                .iter()
                .map(|v| v.label().to_ascii_lowercase())
                .collect();
            names.join(" / ")
        }
        match self {
            Property::Wavelength => "Wavelength setpoint (nm)".to_string(),
            Property::Frequency => "Frequency setpoint (GHz)".to_string(),
            Property::Power => "Power setpoint (mW)".to_string(),
            Property::ModulationSource => names::<ModulationSource>(),
            Property::ModulationRange => names::<ModulationRange>(),
            Property::ModulationFrequency => "Frequency (Hz)".to_string(),
            Property::ModulationCoupling => names::<ModulationCoupling>(),
            Property::ModulationWaveform => names::<ModulationWaveform>(),
            Property::MoveFrequency => "Move frequency (GHz)".to_string(),
            Property::Emission | Property::Modulation => "on / off".to_string(),
            Property::Mode => names::<LaserMode>(),
            Property::Name => "Module name".to_string(),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = LaserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Property::ALL
            .into_iter()
            .find(|p| p.name() == key || p.aliases().contains(&key.as_str()))
            .ok_or(LaserError::UnknownField(s.trim().to_string()))
    }
}

fn parse_number(property: Property, raw: &str) -> LaserResult<f64> {
    let value: f64 = raw.trim().parse().map_err(|_| LaserError::InvalidInput {
        field: property.name().to_string(),
        reason: format!("'{}' is not a number", raw.trim()),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LaserError::InvalidInput {
            field: property.name().to_string(),
            reason: format!("'{}' is not finite", raw.trim()),
        })
    }
}

fn parse_switch(property: Property, raw: &str) -> LaserResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "enable" | "enabled" => Ok(true),
        "off" | "false" | "0" | "disable" | "disabled" => Ok(false),
        other => Err(LaserError::InvalidInput {
            field: property.name().to_string(),
            reason: format!("'{}' is not on/off", other),
        }),
    }
}

/// Variant named by `raw` (any case) or given by its integer code
fn parse_enum<E: CodedEnum>(raw: &str) -> LaserResult<E> {
    let raw = raw.trim();
    if let Some(variant) = E::from_name(raw) {
        return Ok(variant);
    }
    match raw.parse::<i64>() {
        Ok(code) => crate::laser::coerce(code),
        Err(_) => Err(LaserError::InvalidEnumValue {
            property: E::PROPERTY,
            value: format!("\"{}\"", raw),
            expected: E::expected(),
        }),
    }
}

/// Parse `raw` for `property` and apply it to the device.
///
/// Returns a short confirmation message.
pub async fn apply_property(laser: &BasikDriver, property: Property, raw: &str) -> LaserResult<String> {
    let message = match property {
        Property::Wavelength => {
            let value = parse_number(property, raw)?;
            laser.set_wavelength_setpoint(value).await?;
            format!("Wavelength setpoint -> {} nm", value)
        }
        Property::Frequency => {
            let value = parse_number(property, raw)?;
            laser.set_frequency_setpoint(value).await?;
            format!("Frequency setpoint -> {} GHz", value)
        }
        Property::Power => {
            let value = parse_number(property, raw)?;
            laser.set_output_power_setpoint(value).await?;
            format!("Power setpoint -> {} mW", value)
        }
        Property::ModulationSource => {
            let value: ModulationSource = parse_enum(raw)?;
            laser.set_modulation_source(value).await?;
            format!("Modulation source -> {}", value)
        }
        Property::ModulationRange => {
            let value: ModulationRange = parse_enum(raw)?;
            laser.set_modulation_range(value).await?;
            format!("Modulation range -> {}", value)
        }
        Property::ModulationFrequency => {
            let value = parse_number(property, raw)?;
            laser.set_modulation_frequency(value).await?;
            format!("Modulation frequency -> {} Hz", value)
        }
        Property::ModulationCoupling => {
            let value: ModulationCoupling = parse_enum(raw)?;
            laser.set_modulation_coupling(value).await?;
            format!("Modulation coupling -> {}", value)
        }
        Property::ModulationWaveform => {
            let value: ModulationWaveform = parse_enum(raw)?;
            laser.set_modulation_waveform(value).await?;
            format!("Modulation waveform -> {}", value)
        }
        Property::MoveFrequency => {
            let value = parse_number(property, raw)?;
            laser.move_frequency(value).await?;
            format!("Move frequency by {} GHz", value)
        }
        Property::Emission => {
            let value = parse_switch(property, raw)?;
            laser.set_emission(value).await?;
            format!("Emission set to {}", if value { "ON" } else { "OFF" })
        }
        Property::Modulation => {
            let value = parse_switch(property, raw)?;
            laser.set_modulation(value).await?;
            format!("Modulation set to {}", if value { "ON" } else { "OFF" })
        }
        Property::Mode => {
            let value: LaserMode = parse_enum(raw)?;
            laser.set_mode(value).await?;
            format!("Mode set to {}", value)
        }
        Property::Name => {
            let name = raw.trim();
            if name.is_empty() {
                return Err(LaserError::InvalidInput {
                    field: property.name().to_string(),
                    reason: "name is empty".to_string(),
                });
            }
            laser.set_name(name).await?;
            format!("Name set to {}", name)
        }
    };
    info!(property = %property, "{}", message);
    Ok(message)
}
