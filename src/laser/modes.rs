//! Enumerated laser properties and the coercion rules for assigning them.
//!
//! The integer code of each variant is the value packed into the register
//! bits, so variant order and codes must not change.
//!
//! Setters accept either the variant itself or an integer equal to one of its
//! legal codes (see [`IntoCoded`]). Booleans, text, and out-of-range integers
//! are rejected with [`LaserError::InvalidEnumValue`].

use crate::error::{LaserError, LaserResult};
use serde::Serialize;
use std::fmt;

/// An enumerated property whose variants map one-to-one to register codes
pub trait CodedEnum: Copy + Eq + fmt::Debug + 'static {
    /// Property name used in error messages
    const PROPERTY: &'static str;

    /// Every legal variant, in code order
    const VARIANTS: &'static [Self];

    /// Register code of this variant
    fn code(self) -> u8;

    /// Upper-case variant name
    fn label(self) -> &'static str;

    /// Variant with the given code, if legal
    fn from_code(code: i64) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.code() as i64 == code)
    }

    /// Variant with the given name, compared case-insensitively
    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::VARIANTS
            .iter()
            .copied()
            .find(|v| v.label().eq_ignore_ascii_case(name))
    }

    /// Human-readable list of the legal variants and codes,
    /// e.g. `POWER, CURRENT (0, 1)`
    fn expected() -> String {
        let names: Vec<&str> = Self::VARIANTS.iter().map(|v| v.label()).collect();
        let codes: Vec<String> = Self::VARIANTS.iter().map(|v| v.code().to_string()).collect();
        format!("{} ({})", names.join(", "), codes.join(", "))
    }
}

fn invalid<E: CodedEnum>(value: impl fmt::Display) -> LaserError {
    LaserError::InvalidEnumValue {
        property: E::PROPERTY,
        value: value.to_string(),
        expected: E::expected(),
    }
}

/// A value that may be assigned to an enumerated property of type `E`
pub trait IntoCoded<E: CodedEnum> {
    /// Validate and convert to the enum variant
    fn into_coded(self) -> LaserResult<E>;
}

/// Coerce `value` to `E` under the strict setter rules
pub fn coerce<E: CodedEnum, V: IntoCoded<E>>(value: V) -> LaserResult<E> {
    value.into_coded()
}

macro_rules! integer_codes {
    ($($int:ty),*) => {
        $(
            impl<E: CodedEnum> IntoCoded<E> for $int {
                fn into_coded(self) -> LaserResult<E> {
                    i64::try_from(self)
                        .ok()
                        .and_then(E::from_code)
                        .ok_or_else(|| invalid::<E>(self))
                }
            }
        )*
    };
}

integer_codes!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

// true/false coincide with codes 1/0 and would silently select a variant
impl<E: CodedEnum> IntoCoded<E> for bool {
    fn into_coded(self) -> LaserResult<E> {
        Err(invalid::<E>(self))
    }
}

impl<E: CodedEnum> IntoCoded<E> for &str {
    fn into_coded(self) -> LaserResult<E> {
        Err(invalid::<E>(format!("\"{}\"", self)))
    }
}

impl<E: CodedEnum> IntoCoded<E> for String {
    fn into_coded(self) -> LaserResult<E> {
        self.as_str().into_coded()
    }
}

impl<E: CodedEnum, T: IntoCoded<E>> IntoCoded<E> for Option<T> {
    fn into_coded(self) -> LaserResult<E> {
        match self {
            Some(value) => value.into_coded(),
            None => Err(invalid::<E>("None")),
        }
    }
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $property:literal {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl CodedEnum for $name {
            const PROPERTY: &'static str = $property;
            const VARIANTS: &'static [Self] = &[$($name::$variant,)+];

            fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl IntoCoded<$name> for $name {
            fn into_coded(self) -> LaserResult<$name> {
                Ok(self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

coded_enum! {
    /// Pump regulation mode
    LaserMode, "mode" {
        /// Current varies to hold the output power
        Power = 0 => "POWER",
        /// Pump current is held constant
        Current = 1 => "CURRENT",
    }
}

coded_enum! {
    /// Wavelength modulation input. Bit 0 selects external, bit 1 internal.
    ModulationSource, "modulation_source" {
        /// External modulation input
        External = 1 => "EXTERNAL",
        /// Internal modulation generator
        Internal = 2 => "INTERNAL",
        /// Both inputs
        Both = 3 => "BOTH",
    }
}

coded_enum! {
    /// Wavelength modulation range
    ModulationRange, "modulation_range" {
        #[allow(missing_docs)]
        Wide = 0 => "WIDE",
        #[allow(missing_docs)]
        Narrow = 1 => "NARROW",
    }
}

coded_enum! {
    /// Coupling of the external modulation input
    ModulationCoupling, "modulation_coupling" {
        #[allow(missing_docs)]
        Ac = 0 => "AC",
        #[allow(missing_docs)]
        Dc = 1 => "DC",
    }
}

coded_enum! {
    /// Wavelength modulation waveform, packed into bits 6-7 of MODULATION_SETUP
    ModulationWaveform, "modulation_waveform" {
        #[allow(missing_docs)]
        Sine = 0 => "SINE",
        #[allow(missing_docs)]
        Triangle = 1 => "TRIANGLE",
        #[allow(missing_docs)]
        Sawtooth = 2 => "SAWTOOTH",
        #[allow(missing_docs)]
        InverseSawtooth = 3 => "INVERSE_SAWTOOTH",
    }
}

impl ModulationSource {
    /// Source encoded by the external and internal Setup bits, `None` when
    /// neither is set
    pub fn from_bits(external: bool, internal: bool) -> Option<Self> {
        Self::from_code(external as i64 | (internal as i64) << 1)
    }

    /// Whether the external input is selected
    pub fn external(self) -> bool {
        self.code() & 1 != 0
    }

    /// Whether the internal generator is selected
    pub fn internal(self) -> bool {
        self.code() & 2 != 0
    }
}
