//! Custom error types for the crate.
//!
//! This module defines the primary error type, `LaserError`. Using the
//! `thiserror` crate, it gives register access, device lifecycle and user
//! input one consistent error surface.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: opening or closing the port/device session failed, or
//!   an operation was attempted on a closed device.
//! - **`RegisterIo`**: the transport reported a non-zero result code on a
//!   register read or write. Carries the register and the translated code.
//! - **`TypeMismatch`**: a register returned (or was given) a value whose
//!   wire type does not match the register map.
//! - **`InvalidEnumValue`**: a caller supplied a value outside an enumerated
//!   property's legal set.
//! - **`ValueOutOfRange`** / **`ReadOnlyRegister`**: a write was refused
//!   before reaching the transport.
//! - **`UnknownField`** / **`InvalidInput`**: text coming from the
//!   command-line surface could not be mapped to a property or parsed.
//! - **`Task`**: a background polling task panicked or was aborted.
//!
//! Configuration problems have their own `ConfigError` in `crate::config`.
//!
//! No layer retries or substitutes defaults; errors propagate with `?`.

use crate::register::Register;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type LaserResult<T> = std::result::Result<T, LaserError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum LaserError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Register I/O error on {register}: {category} (code {code})")]
    RegisterIo {
        register: Register,
        code: i32,
        category: String,
    },

    #[error("Type mismatch on {register}: expected {expected}, got {found}")]
    TypeMismatch {
        register: Register,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value {value} for {property}: expected one of {expected}")]
    InvalidEnumValue {
        property: &'static str,
        value: String,
        expected: String,
    },

    #[error("Value {value} does not fit register {register}")]
    ValueOutOfRange { register: Register, value: String },

    #[error("Register {0} is read-only")]
    ReadOnlyRegister(Register),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl LaserError {
    /// Whether the error came from the device session rather than a register
    pub fn is_connection(&self) -> bool {
        matches!(self, LaserError::Connection(_))
    }
}
