//! Conversion between wire payloads and physical values.
//!
//! Reads decode the payload (byte strings become text) and multiply by the
//! register scale; writes divide by the scale and truncate to the wire
//! integer type. Unit conversion happens here and nowhere else.

use super::{Register, RegisterSpec};
use crate::error::{LaserError, LaserResult};
use crate::hardware::{RawValue, SharedTransport, Transport, WireType};
use serde::Serialize;
use std::fmt;
use tracing::{debug, trace};

/// A decoded register value in physical units
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegisterValue {
    /// Unscaled integer register
    Int(i64),
    /// Scaled integer register or float register
    Float(f64),
    /// Text register
    Text(String),
}

impl RegisterValue {
    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RegisterValue::Int(v) => Some(*v as f64),
            RegisterValue::Float(v) => Some(*v),
            RegisterValue::Text(_) => None,
        }
    }

    /// Integer view, only for unscaled integer registers
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RegisterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RegisterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Kind name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            RegisterValue::Int(_) => "integer",
            RegisterValue::Float(_) => "float",
            RegisterValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Int(v) => write!(f, "{}", v),
            RegisterValue::Float(v) => write!(f, "{}", v),
            RegisterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RegisterValue {
    fn from(value: i64) -> Self {
        RegisterValue::Int(value)
    }
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        RegisterValue::Float(value)
    }
}

impl From<&str> for RegisterValue {
    fn from(value: &str) -> Self {
        RegisterValue::Text(value.to_string())
    }
}

impl From<String> for RegisterValue {
    fn from(value: String) -> Self {
        RegisterValue::Text(value)
    }
}

/// Decode a wire payload for `register` into physical units
pub fn decode(register: Register, raw: RawValue) -> LaserResult<RegisterValue> {
    let spec = register.spec();
    if raw.wire_type() != spec.wire {
        return Err(LaserError::TypeMismatch {
            register,
            expected: spec.wire.name(),
            found: raw.wire_type().name(),
        });
    }

    let value = match raw {
        RawValue::Ascii(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            RegisterValue::Text(text.trim_end_matches('\0').trim().to_string())
        }
        RawValue::F32(v) => RegisterValue::Float(v as f64),
        other => match other.as_integer() {
            Some(v) => RegisterValue::Int(v),
            None => {
                return Err(LaserError::TypeMismatch {
                    register,
                    expected: spec.wire.name(),
                    found: other.wire_type().name(),
                })
            }
        },
    };

    Ok(match (spec.scale, value) {
        (Some(scale), RegisterValue::Int(v)) => RegisterValue::Float(scale.to_physical(v as f64)),
        (Some(scale), RegisterValue::Float(v)) => RegisterValue::Float(scale.to_physical(v)),
        (_, value) => value,
    })
}

/// Encode a physical value for `register` into its wire payload
pub fn encode(register: Register, value: &RegisterValue) -> LaserResult<RawValue> {
    let spec = register.spec();
    match (spec.wire, value) {
        (WireType::Ascii, RegisterValue::Text(text)) => Ok(RawValue::Ascii(text.as_bytes().to_vec())),
        (WireType::Ascii, _) | (_, RegisterValue::Text(_)) => Err(LaserError::TypeMismatch {
            register,
            expected: expected_kind(&spec),
            found: value.kind(),
        }),
        (WireType::F32, value) => {
            let physical = value.as_f64().unwrap_or_default();
            let raw = match spec.scale {
                Some(scale) => scale.to_raw(physical),
                None => physical,
            };
            Ok(RawValue::F32(raw as f32))
        }
        (wire, value) => {
            let counts = match (spec.scale, value) {
                (Some(scale), v) => truncate_counts(scale.to_raw(v.as_f64().unwrap_or_default())),
                (None, RegisterValue::Int(v)) => *v as f64,
                (None, v) => v.as_f64().unwrap_or_default().trunc(),
            };
            if !counts.is_finite() {
                return Err(out_of_range(register, value));
            }
            RawValue::from_integer(wire, counts as i64).ok_or_else(|| out_of_range(register, value))
        }
    }
}

// A value already on the register grid (e.g. 5.0 pm) can land a hair below
// the integer count after scaling; snap those before truncating.
fn truncate_counts(raw: f64) -> f64 {
    let nearest = raw.round();
    if (raw - nearest).abs() < 1e-6 {
        nearest
    } else {
        raw.trunc()
    }
}

fn expected_kind(spec: &RegisterSpec) -> &'static str {
    match spec.wire {
        WireType::Ascii => "text",
        WireType::F32 => "float",
        _ if spec.scale.is_some() => "float",
        _ => "integer",
    }
}

fn out_of_range(register: Register, value: &RegisterValue) -> LaserError {
    LaserError::ValueOutOfRange {
        register,
        value: value.to_string(),
    }
}

/// Register reads and writes for one device session
pub struct RegisterCodec {
    transport: SharedTransport,
    port: String,
    device_id: u8,
}

impl RegisterCodec {
    /// Create a codec addressing `device_id` on `port`
    pub fn new(transport: SharedTransport, port: impl Into<String>, device_id: u8) -> Self {
        Self {
            transport,
            port: port.into(),
            device_id,
        }
    }

    /// Port this codec talks to
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Device id this codec talks to
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// The underlying shared transport
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Read a register and convert it to physical units
    pub async fn read(&self, register: Register, index: i16) -> LaserResult<RegisterValue> {
        let mut transport = self.transport.lock().await;
        self.read_locked(transport.as_mut(), register, index).await
    }

    /// Convert a physical value and write it to a register
    pub async fn write(
        &self,
        register: Register,
        value: RegisterValue,
        index: i16,
    ) -> LaserResult<()> {
        let mut transport = self.transport.lock().await;
        self.write_locked(transport.as_mut(), register, &value, index)
            .await
    }

    /// Read an unscaled integer register, apply `update` and write the whole
    /// word back. The transport stays locked across both transactions.
    pub async fn read_modify_write<F>(&self, register: Register, index: i16, update: F) -> LaserResult<u32>
    where
        F: FnOnce(u32) -> u32,
    {
        let mut transport = self.transport.lock().await;
        let current = self.read_locked(transport.as_mut(), register, index).await?;
        let current = current
            .as_int()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(LaserError::TypeMismatch {
                register,
                expected: "integer",
                found: current.kind(),
            })?;
        let updated = update(current);
        debug!(register = %register, from = current, to = updated, "read-modify-write");
        self.write_locked(
            transport.as_mut(),
            register,
            &RegisterValue::Int(updated as i64),
            index,
        )
        .await?;
        Ok(updated)
    }

    async fn read_locked(
        &self,
        transport: &mut dyn Transport,
        register: Register,
        index: i16,
    ) -> LaserResult<RegisterValue> {
        let spec = register.spec();
        let raw = transport
            .read_register(&self.port, self.device_id, spec.address, spec.wire, index)
            .await
            .map_err(|code| LaserError::RegisterIo {
                register,
                code: code.code(),
                category: code.category(),
            })?;
        trace!(register = %register, index, raw = ?raw, "register read");
        decode(register, raw)
    }

    async fn write_locked(
        &self,
        transport: &mut dyn Transport,
        register: Register,
        value: &RegisterValue,
        index: i16,
    ) -> LaserResult<()> {
        let spec = register.spec();
        if !spec.writable {
            return Err(LaserError::ReadOnlyRegister(register));
        }
        let raw = encode(register, value)?;
        trace!(register = %register, index, raw = ?raw, "register write");
        transport
            .write_register(&self.port, self.device_id, spec.address, raw, index)
            .await
            .map_err(|code| LaserError::RegisterIo {
                register,
                code: code.code(),
                category: code.category(),
            })
    }
}
