//! Fields the poll loop can sample, and how their values are shown.

use crate::error::{LaserError, LaserResult};
use crate::laser::BasikDriver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display metadata of a polled field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Row label
    pub label: &'static str,
    /// Unit appended to successful readings, empty for none
    pub unit: &'static str,
    /// Whether the field may be plotted
    pub plot: bool,
}

/// A device property the poll loop can read
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollField {
    Temperature,
    Power,
    Wavelength,
    Frequency,
    SupplyVoltage,
    Emission,
    Status,
    Error,
    Mode,
}

impl PollField {
    /// Every field, in table order
    pub const ALL: [PollField; 9] = [
        PollField::Temperature,
        PollField::Power,
        PollField::Wavelength,
        PollField::Frequency,
        PollField::SupplyVoltage,
        PollField::Emission,
        PollField::Status,
        PollField::Error,
        PollField::Mode,
    ];

    /// Key used for history series and command-line selection
    pub const fn name(self) -> &'static str {
        match self {
            PollField::Temperature => "temperature",
            PollField::Power => "power",
            PollField::Wavelength => "wavelength",
            PollField::Frequency => "frequency",
            PollField::SupplyVoltage => "supply_voltage",
            PollField::Emission => "emission",
            PollField::Status => "status",
            PollField::Error => "error",
            PollField::Mode => "mode",
        }
    }

    #[allow(missing_docs)]
    pub const fn spec(self) -> FieldSpec {
        const fn field(label: &'static str, unit: &'static str, plot: bool) -> FieldSpec {
            FieldSpec { label, unit, plot }
        }
        match self {
            PollField::Temperature => field("Temperature", "C", true),
            PollField::Power => field("Power", "mW", true),
            PollField::Wavelength => field("Wavelength", "nm", true),
            PollField::Frequency => field("Frequency", "GHz", true),
            PollField::SupplyVoltage => field("Supply voltage", "V", true),
            PollField::Emission => field("Emission", "", false),
            PollField::Status => field("Status", "", false),
            PollField::Error => field("Error", "", false),
            PollField::Mode => field("Mode", "", false),
        }
    }

    /// Fields that may be plotted
    pub fn plottable() -> Vec<PollField> {
        PollField::ALL.into_iter().filter(|f| f.spec().plot).collect()
    }

    /// Read this field from the device
    pub async fn read(self, laser: &BasikDriver) -> LaserResult<FieldValue> {
        Ok(match self {
            PollField::Temperature => FieldValue::Number(laser.temperature().await?),
            PollField::Power => FieldValue::Number(laser.power().await?),
            PollField::Wavelength => FieldValue::Number(laser.wavelength().await?),
            PollField::Frequency => FieldValue::Number(laser.frequency().await?),
            PollField::SupplyVoltage => FieldValue::Number(laser.supply_voltage().await?),
            PollField::Emission => FieldValue::Flag(laser.emission().await?),
            PollField::Status => FieldValue::Text(laser.status().await?.to_string()),
            PollField::Error => FieldValue::Text(laser.error().await?.to_string()),
            PollField::Mode => FieldValue::Text(laser.mode().await?.to_string()),
        })
    }
}

impl fmt::Display for PollField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PollField {
    type Err = LaserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        PollField::ALL
            .into_iter()
            .find(|f| f.name() == key)
            .ok_or(LaserError::UnknownField(key))
    }
}

/// Outcome of reading one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[allow(missing_docs)]
    Number(f64),
    #[allow(missing_docs)]
    Flag(bool),
    #[allow(missing_docs)]
    Text(String),
    /// The read failed; carries the error message
    Failed(String),
}

impl FieldValue {
    /// Value to plot, if numeric
    pub fn numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn is_failed(&self) -> bool {
        matches!(self, FieldValue::Failed(_))
    }

    /// Table text, with `unit` appended to successful non-empty readings
    pub fn display(&self, unit: &str) -> String {
        let text = self.to_string();
        if unit.is_empty() || text.is_empty() || self.is_failed() {
            text
        } else {
            format!("{} {}", text, unit)
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Flag(true) => f.write_str("ON"),
            FieldValue::Flag(false) => f.write_str("OFF"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Failed(msg) => write!(f, "ERR: {}", msg),
        }
    }
}

/// One field's value in a poll tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReading {
    #[allow(missing_docs)]
    pub field: PollField,
    #[allow(missing_docs)]
    pub value: FieldValue,
}

impl FieldReading {
    /// `(label, text)` row for the value table
    pub fn row(&self) -> (String, String) {
        let spec = self.field.spec();
        (spec.label.to_string(), self.value.display(spec.unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_appends_unit_only_on_success() {
        assert_eq!(FieldValue::Number(25.3).display("C"), "25.3 C");
        assert_eq!(
            FieldValue::Failed("timeout".into()).display("C"),
            "ERR: timeout"
        );
        assert_eq!(FieldValue::Flag(true).display(""), "ON");
        assert_eq!(FieldValue::Text(String::new()).display("V"), "");
    }

    #[test]
    fn test_parse_field_names() {
        assert_eq!("Supply_Voltage".parse::<PollField>().unwrap(), PollField::SupplyVoltage);
        assert!(matches!(
            "humidity".parse::<PollField>(),
            Err(LaserError::UnknownField(_))
        ));
    }

    #[test]
    fn test_only_numeric_fields_plot() {
        let plottable = PollField::plottable();
        assert!(plottable.contains(&PollField::Wavelength));
        assert!(!plottable.contains(&PollField::Status));
        assert!(!plottable.contains(&PollField::Mode));
    }
}
