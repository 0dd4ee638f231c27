//! Transport boundary to the instrument.
//!
//! The vendor protocol stack that actually talks to the serial port lives
//! outside this crate. Everything above this module sees it only through the
//! [`Transport`] trait: open/close a port, create/remove a device session, and
//! read/write a single register as a typed wire value.
//!
//! Implementations must treat a session as single-threaded; callers share a
//! transport through [`SharedTransport`], whose mutex guarantees that at most
//! one transaction is in flight at any time.
//!
//! # Example
//!
//! ```no_run
//! use seed_daq::hardware::{shared, simulated::SimulatedBasik};
//! use seed_daq::laser::BasikDriver;
//!
//! # async fn demo() -> seed_daq::error::LaserResult<()> {
//! let transport = shared(SimulatedBasik::new("COM6", 1));
//! let laser = BasikDriver::open(transport, "COM6", 1).await?;
//! println!("{} nm", laser.wavelength().await?);
//! laser.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod result_codes;
pub mod simulated;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use result_codes::{DeviceResult, PortResult, RegisterResult};

/// Index value meaning "no sub-index" for registers that are not arrays
pub const NO_INDEX: i16 = -1;

/// Wire representation of a register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// IEEE 754 single precision float
    F32,
    /// ASCII string
    Ascii,
}

impl WireType {
    /// Short name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            WireType::U8 => "u8",
            WireType::U16 => "u16",
            WireType::U32 => "u32",
            WireType::I8 => "i8",
            WireType::I16 => "i16",
            WireType::I32 => "i32",
            WireType::F32 => "f32",
            WireType::Ascii => "ascii",
        }
    }

    /// Inclusive integer range representable by this wire type
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            WireType::U8 => Some((0, u8::MAX as i64)),
            WireType::U16 => Some((0, u16::MAX as i64)),
            WireType::U32 => Some((0, u32::MAX as i64)),
            WireType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            WireType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            WireType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            WireType::F32 | WireType::Ascii => None,
        }
    }
}

/// A register payload exactly as it travels over the wire
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Unsigned 8-bit payload
    U8(u8),
    /// Unsigned 16-bit payload
    U16(u16),
    /// Unsigned 32-bit payload
    U32(u32),
    /// Signed 8-bit payload
    I8(i8),
    /// Signed 16-bit payload
    I16(i16),
    /// Signed 32-bit payload
    I32(i32),
    /// Float payload
    F32(f32),
    /// Byte-string payload
    Ascii(Vec<u8>),
}

impl RawValue {
    /// The wire type carried by this payload
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::U8(_) => WireType::U8,
            RawValue::U16(_) => WireType::U16,
            RawValue::U32(_) => WireType::U32,
            RawValue::I8(_) => WireType::I8,
            RawValue::I16(_) => WireType::I16,
            RawValue::I32(_) => WireType::I32,
            RawValue::F32(_) => WireType::F32,
            RawValue::Ascii(_) => WireType::Ascii,
        }
    }

    /// Build an integer payload of the given wire type.
    ///
    /// Returns `None` when the value does not fit or the wire type is not an
    /// integer type.
    pub fn from_integer(wire: WireType, value: i64) -> Option<Self> {
        Some(match wire {
            WireType::U8 => RawValue::U8(u8::try_from(value).ok()?),
            WireType::U16 => RawValue::U16(u16::try_from(value).ok()?),
            WireType::U32 => RawValue::U32(u32::try_from(value).ok()?),
            WireType::I8 => RawValue::I8(i8::try_from(value).ok()?),
            WireType::I16 => RawValue::I16(i16::try_from(value).ok()?),
            WireType::I32 => RawValue::I32(i32::try_from(value).ok()?),
            WireType::F32 | WireType::Ascii => return None,
        })
    }

    /// Integer view of an integer payload
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RawValue::U8(v) => Some(*v as i64),
            RawValue::U16(v) => Some(*v as i64),
            RawValue::U32(v) => Some(*v as i64),
            RawValue::I8(v) => Some(*v as i64),
            RawValue::I16(v) => Some(*v as i64),
            RawValue::I32(v) => Some(*v as i64),
            RawValue::F32(_) | RawValue::Ascii(_) => None,
        }
    }
}

/// Contract of the vendor transport.
///
/// Every operation reports failure through the corresponding result-code
/// enum; implementations never swallow a non-zero code.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a port for communication
    async fn open_port(&mut self, port: &str) -> Result<(), PortResult>;

    /// Close a previously opened port
    async fn close_port(&mut self, port: &str) -> Result<(), PortResult>;

    /// Create a device session for `device_id` on an open port
    async fn create_device(&mut self, port: &str, device_id: u8) -> Result<(), DeviceResult>;

    /// Remove a device session
    async fn remove_device(&mut self, port: &str, device_id: u8) -> Result<(), DeviceResult>;

    /// Read one register as the requested wire type
    async fn read_register(
        &mut self,
        port: &str,
        device_id: u8,
        address: u8,
        wire: WireType,
        index: i16,
    ) -> Result<RawValue, RegisterResult>;

    /// Write one register
    async fn write_register(
        &mut self,
        port: &str,
        device_id: u8,
        address: u8,
        value: RawValue,
        index: i16,
    ) -> Result<(), RegisterResult>;

    /// Device type table of an open port, indexed by device id (0 = absent)
    async fn device_types(&mut self, port: &str) -> Result<Vec<u8>, DeviceResult>;

    /// Ports this transport can reach
    async fn available_ports(&mut self) -> Vec<String> {
        system_serial_ports()
    }
}

/// A transport shared between the components driving one instrument
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport so it can be shared by drivers, discovery and polling
pub fn shared<T: Transport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

/// Serial ports present on this machine
#[cfg(feature = "instrument_serial")]
pub fn system_serial_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to enumerate serial ports");
            Vec::new()
        }
    }
}

/// Serial ports present on this machine
#[cfg(not(feature = "instrument_serial"))]
pub fn system_serial_ports() -> Vec<String> {
    tracing::warn!("Serial support not enabled. Rebuild with --features instrument_serial");
    Vec::new()
}
