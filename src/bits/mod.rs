//! Fixed-width bit vectors for packed configuration and status words.
//!
//! [`BitField`] is a plain value type with no I/O. Single bits are set with a
//! mask OR and cleared with AND-NOT, so touching one bit never perturbs the
//! others. Multi-bit sub-fields are read by shifting to their base bit and
//! masking to their width.

pub mod state;

pub use state::{
    ErrorBit, ErrorFlags, ModulationSetup, ModulationSetupBit, Setup, SetupBit, Status, StatusBit,
};

use std::fmt;

/// Width of the Basik status, error and setup words
pub const REGISTER_WIDTH: u8 = 16;

const fn mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// An unsigned integer value with a logical bit width
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitField {
    value: u32,
    width: u8,
}

impl BitField {
    /// Create a bit field, discarding bits above `width`
    pub const fn new(value: u32, width: u8) -> Self {
        let width = if width > 32 { 32 } else { width };
        Self {
            value: value & mask(width),
            width,
        }
    }

    /// The packed integer
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Logical width in bits
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// State of bit `bit`; bits outside the width read as clear
    pub const fn get_bit(&self, bit: u8) -> bool {
        bit < self.width && (self.value >> bit) & 1 == 1
    }

    /// Set or clear bit `bit`. Indices outside the width are ignored.
    pub fn set_bit(&mut self, bit: u8, on: bool) {
        if bit >= self.width {
            return;
        }
        if on {
            self.value |= 1 << bit;
        } else {
            self.value &= !(1 << bit);
        }
    }

    /// Copy of this field with bit `bit` set to `on`
    pub fn with_bit(mut self, bit: u8, on: bool) -> Self {
        self.set_bit(bit, on);
        self
    }

    /// Read the `width`-bit sub-field starting at `base`
    pub const fn get_field(&self, base: u8, width: u8) -> u32 {
        if base >= 32 {
            return 0;
        }
        (self.value >> base) & mask(width)
    }

    /// Replace the `width`-bit sub-field starting at `base` with `value`.
    ///
    /// The sub-field is cleared before the new value is OR-ed in, so writing
    /// zero clears every bit of the sub-field. Bits of `value` above `width`
    /// are discarded, as is anything past the logical width of the field.
    pub fn set_field(&mut self, base: u8, width: u8, value: u32) {
        if base >= self.width {
            return;
        }
        let field_mask = (mask(width) << base) & mask(self.width);
        self.value = (self.value & !field_mask) | ((value << base) & field_mask);
    }

    /// Ascending indices of the bits currently set
    pub fn get_set_bits(&self) -> Vec<u8> {
        (0..self.width).filter(|&bit| self.get_bit(bit)).collect()
    }
}

impl fmt::Debug for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BitField({:#0w$b})",
            self.value,
            w = self.width as usize + 2
        )
    }
}
