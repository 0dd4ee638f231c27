//! Simulated Basik module for testing and `--simulate` runs
//!
//! This transport keeps a register bank per device in memory and behaves like
//! the vendor stack from the caller's point of view. It provides:
//! - Wire-typed register storage seeded with plausible module defaults
//! - A wavelength readout that relaxes toward the offset setpoint on every read
//! - Per-register failure injection (persistent or next-access only)
//! - Scripted read sequences
//! - Call logging for test verification

use super::{DeviceResult, PortResult, RawValue, RegisterResult, Transport, WireType};
use crate::register::Register;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Module type reported in the device-type table for simulated modules
pub const SIMULATED_MODULE_TYPE: u8 = 0x70;

/// One transport call, as recorded in the call log
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    #[allow(missing_docs)]
    OpenPort(String),
    #[allow(missing_docs)]
    ClosePort(String),
    #[allow(missing_docs)]
    CreateDevice(String, u8),
    #[allow(missing_docs)]
    RemoveDevice(String, u8),
    /// Register read by address and index
    Read {
        device_id: u8,
        address: u8,
        index: i16,
    },
    /// Register write by address and index
    Write {
        device_id: u8,
        address: u8,
        value: RawValue,
        index: i16,
    },
}

impl TransportCall {
    /// Whether this call touched the given register
    pub fn touches(&self, register: Register) -> bool {
        match self {
            TransportCall::Read { address, .. } | TransportCall::Write { address, .. } => {
                *address == register.address()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    code: RegisterResult,
    persistent: bool,
}

type DeviceKey = (String, u8);
type RegisterKey = (u8, i16);

#[derive(Debug, Default)]
struct SimState {
    devices: BTreeMap<DeviceKey, HashMap<RegisterKey, RawValue>>,
    open_ports: BTreeSet<String>,
    sessions: BTreeSet<DeviceKey>,
    failures: HashMap<u8, InjectedFailure>,
    scripted: HashMap<u8, VecDeque<RawValue>>,
    port_failure: Option<PortResult>,
    device_failure: Option<DeviceResult>,
    relaxation: f64,
    latency: Duration,
    calls: Vec<TransportCall>,
}

fn register_key(register: Register, index: i16) -> RegisterKey {
    (register.address(), index.max(0))
}

fn zero(wire: WireType) -> RawValue {
    match wire {
        WireType::U8 => RawValue::U8(0),
        WireType::U16 => RawValue::U16(0),
        WireType::U32 => RawValue::U32(0),
        WireType::I8 => RawValue::I8(0),
        WireType::I16 => RawValue::I16(0),
        WireType::I32 => RawValue::I32(0),
        WireType::F32 => RawValue::F32(0.0),
        WireType::Ascii => RawValue::Ascii(Vec::new()),
    }
}

fn default_bank(name: &str, serial: &str) -> HashMap<RegisterKey, RawValue> {
    let mut bank: HashMap<RegisterKey, RawValue> = Register::ALL
        .iter()
        .map(|r| (register_key(*r, 0), zero(r.spec().wire)))
        .collect();
    let defaults = [
        (Register::WavelengthCenter, RawValue::U32(10_868_000)),
        (Register::Temperature, RawValue::I16(253)),
        (Register::OutputPowerMw, RawValue::U16(1_000)),
        (Register::OutputPowerSetpointMw, RawValue::U16(1_000)),
        (Register::OutputPowerDbm, RawValue::U16(1_000)),
        (Register::SupplyVoltage, RawValue::U16(12_000)),
        (Register::Name, RawValue::Ascii(name.as_bytes().to_vec())),
        (Register::SerialNumber, RawValue::Ascii(serial.as_bytes().to_vec())),
        (Register::WavelengthModulationFrequency, RawValue::F32(1_000.0)),
    ];
    for (register, value) in defaults {
        bank.insert(register_key(register, 0), value);
    }
    bank
}

/// In-memory Basik transport
///
/// Clones share state, so a test can keep a handle for inspection and failure
/// injection after moving another clone into a [`SharedTransport`].
///
/// # Example
///
/// ```
/// use seed_daq::hardware::simulated::SimulatedBasik;
///
/// let sim = SimulatedBasik::new("COM6", 1).with_device("COM7", 2, "seed-b");
/// assert_eq!(sim.ports(), vec!["COM6".to_string(), "COM7".to_string()]);
/// ```
///
/// [`SharedTransport`]: super::SharedTransport
#[derive(Clone)]
pub struct SimulatedBasik {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBasik {
    /// Create a simulator with one module named "Basik" at `port`/`device_id`
    pub fn new(port: &str, device_id: u8) -> Self {
        let sim = Self {
            state: Arc::new(Mutex::new(SimState {
                relaxation: 1.0,
                ..SimState::default()
            })),
        };
        sim.with_device(port, device_id, "Basik")
    }

    /// Add another module
    pub fn with_device(self, port: &str, device_id: u8, name: &str) -> Self {
        {
            let mut state = self.state();
            let serial = format!("SIM{:05}", state.devices.len() + 1);
            state
                .devices
                .insert((port.to_string(), device_id), default_bank(name, &serial));
        }
        self
    }

    /// Fraction of the remaining distance the wavelength readout moves toward
    /// the offset setpoint on each read. 1.0 tracks the setpoint immediately.
    pub fn with_relaxation(self, relaxation: f64) -> Self {
        self.state().relaxation = relaxation.clamp(0.0, 1.0);
        self
    }

    /// Delay every register transaction
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ports that carry at least one simulated module
    pub fn ports(&self) -> Vec<String> {
        let state = self.state();
        let ports: BTreeSet<String> = state.devices.keys().map(|(p, _)| p.clone()).collect();
        ports.into_iter().collect()
    }

    /// Overwrite a raw register value on every simulated module
    pub fn set_raw(&self, register: Register, value: RawValue) {
        for bank in self.state().devices.values_mut() {
            bank.insert(register_key(register, 0), value.clone());
        }
    }

    /// Raw register value of one module
    pub fn raw(&self, port: &str, device_id: u8, register: Register) -> Option<RawValue> {
        self.state()
            .devices
            .get(&(port.to_string(), device_id))
            .and_then(|bank| bank.get(&register_key(register, 0)).cloned())
    }

    /// Fail every access to `register` with `code` until cleared
    pub fn fail_register(&self, register: Register, code: RegisterResult) {
        self.state().failures.insert(
            register.address(),
            InjectedFailure {
                code,
                persistent: true,
            },
        );
    }

    /// Fail only the next access to `register`
    pub fn fail_next(&self, register: Register, code: RegisterResult) {
        self.state().failures.insert(
            register.address(),
            InjectedFailure {
                code,
                persistent: false,
            },
        );
    }

    /// Remove an injected register failure
    pub fn clear_failure(&self, register: Register) {
        self.state().failures.remove(&register.address());
    }

    /// Fail the next port open
    pub fn fail_port_open(&self, code: PortResult) {
        self.state().port_failure = Some(code);
    }

    /// Fail the next device creation
    pub fn fail_device_create(&self, code: DeviceResult) {
        self.state().device_failure = Some(code);
    }

    /// Return these raw values, in order, from the next reads of `register`
    /// before falling back to the stored value
    pub fn script_reads(&self, register: Register, values: impl IntoIterator<Item = RawValue>) {
        self.state()
            .scripted
            .entry(register.address())
            .or_default()
            .extend(values);
    }

    /// Every call made so far
    pub fn call_log(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.state().calls.clear();
    }

    /// Number of reads of `register` in the call log
    pub fn read_count(&self, register: Register) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Read { .. }) && c.touches(register))
            .count()
    }

    /// Whether `port` is currently open
    pub fn is_port_open(&self, port: &str) -> bool {
        self.state().open_ports.contains(port)
    }

    /// Whether a session for `device_id` on `port` currently exists
    pub fn has_session(&self, port: &str, device_id: u8) -> bool {
        self.state()
            .sessions
            .contains(&(port.to_string(), device_id))
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl SimState {
    fn check_session(&self, port: &str, device_id: u8) -> Result<(), RegisterResult> {
        if !self.open_ports.contains(port) {
            return Err(RegisterResult::PortClosed);
        }
        if !self.sessions.contains(&(port.to_string(), device_id)) {
            return Err(RegisterResult::DeviceNotFound);
        }
        Ok(())
    }

    fn take_failure(&mut self, address: u8) -> Option<RegisterResult> {
        let failure = *self.failures.get(&address)?;
        if !failure.persistent {
            self.failures.remove(&address);
        }
        Some(failure.code)
    }

    fn relax_readout(&mut self, key: &DeviceKey) {
        let relaxation = self.relaxation;
        let Some(bank) = self.devices.get_mut(key) else {
            return;
        };
        let target = bank
            .get(&register_key(Register::WavelengthOffset, 0))
            .and_then(RawValue::as_integer)
            .unwrap_or(0);
        let readout_key = register_key(Register::WavelengthOffsetReadout, 0);
        let current = bank
            .get(&readout_key)
            .and_then(RawValue::as_integer)
            .unwrap_or(0);
        let next = current as f64 + (target - current) as f64 * relaxation;
        let next = if (target as f64 - next).abs() < 1.0 {
            target
        } else {
            next.round() as i64
        };
        if let Some(raw) = RawValue::from_integer(WireType::I16, next) {
            bank.insert(readout_key, raw);
        }
    }
}

#[async_trait]
impl Transport for SimulatedBasik {
    async fn open_port(&mut self, port: &str) -> Result<(), PortResult> {
        let mut state = self.state();
        state.calls.push(TransportCall::OpenPort(port.to_string()));
        if let Some(code) = state.port_failure.take() {
            return Err(code);
        }
        if !state.devices.keys().any(|(p, _)| p == port) {
            return Err(PortResult::PortNotFound);
        }
        state.open_ports.insert(port.to_string());
        Ok(())
    }

    async fn close_port(&mut self, port: &str) -> Result<(), PortResult> {
        let mut state = self.state();
        state.calls.push(TransportCall::ClosePort(port.to_string()));
        if !state.open_ports.remove(port) {
            return Err(PortResult::Failed);
        }
        state.sessions.retain(|(p, _)| p != port);
        Ok(())
    }

    async fn create_device(&mut self, port: &str, device_id: u8) -> Result<(), DeviceResult> {
        let mut state = self.state();
        let key = (port.to_string(), device_id);
        state
            .calls
            .push(TransportCall::CreateDevice(port.to_string(), device_id));
        if let Some(code) = state.device_failure.take() {
            return Err(code);
        }
        if !state.open_ports.contains(port) {
            return Err(DeviceResult::PortNotFound);
        }
        if !state.devices.contains_key(&key) {
            return Err(DeviceResult::DeviceNotFound);
        }
        state.sessions.insert(key);
        Ok(())
    }

    async fn remove_device(&mut self, port: &str, device_id: u8) -> Result<(), DeviceResult> {
        let mut state = self.state();
        state
            .calls
            .push(TransportCall::RemoveDevice(port.to_string(), device_id));
        if state.sessions.remove(&(port.to_string(), device_id)) {
            Ok(())
        } else {
            Err(DeviceResult::DeviceNotFound)
        }
    }

    async fn read_register(
        &mut self,
        port: &str,
        device_id: u8,
        address: u8,
        wire: WireType,
        index: i16,
    ) -> Result<RawValue, RegisterResult> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(TransportCall::Read {
            device_id,
            address,
            index,
        });
        state.check_session(port, device_id)?;
        if let Some(code) = state.take_failure(address) {
            return Err(code);
        }
        if let Some(value) = state.scripted.get_mut(&address).and_then(VecDeque::pop_front) {
            return Ok(value);
        }

        let key = (port.to_string(), device_id);
        if address == Register::WavelengthOffsetReadout.address() {
            state.relax_readout(&key);
        }
        let value = state
            .devices
            .get(&key)
            .and_then(|bank| bank.get(&(address, index.max(0))))
            .cloned()
            .ok_or(RegisterResult::RegisterNotFound)?;
        if value.wire_type() != wire {
            return Err(RegisterResult::TypeError);
        }
        Ok(value)
    }

    async fn write_register(
        &mut self,
        port: &str,
        device_id: u8,
        address: u8,
        value: RawValue,
        index: i16,
    ) -> Result<(), RegisterResult> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(TransportCall::Write {
            device_id,
            address,
            value: value.clone(),
            index,
        });
        state.check_session(port, device_id)?;
        if let Some(code) = state.take_failure(address) {
            return Err(code);
        }

        let bank = state
            .devices
            .get_mut(&(port.to_string(), device_id))
            .ok_or(RegisterResult::DeviceNotFound)?;
        let key = (address, index.max(0));
        match bank.get(&key) {
            Some(current) if current.wire_type() != value.wire_type() => {
                return Err(RegisterResult::TypeError)
            }
            None => return Err(RegisterResult::RegisterNotFound),
            Some(_) => {}
        }

        if address == Register::Emission.address() {
            let on = value.as_integer().unwrap_or(0) != 0;
            let status_key = register_key(Register::Status, 0);
            let status = bank
                .get(&status_key)
                .and_then(RawValue::as_integer)
                .unwrap_or(0) as u16;
            let status = if on { status | 1 } else { status & !1 };
            bank.insert(status_key, RawValue::U16(status));
        }
        bank.insert(key, value);
        Ok(())
    }

    async fn device_types(&mut self, port: &str) -> Result<Vec<u8>, DeviceResult> {
        let state = self.state();
        if !state.open_ports.contains(port) {
            return Err(DeviceResult::PortNotFound);
        }
        let ids: Vec<u8> = state
            .devices
            .keys()
            .filter(|(p, _)| p == port)
            .map(|(_, id)| *id)
            .collect();
        let len = ids.iter().max().map(|m| *m as usize + 1).unwrap_or(0);
        let mut types = vec![0u8; len];
        for id in ids {
            types[id as usize] = SIMULATED_MODULE_TYPE;
        }
        Ok(types)
    }

    async fn available_ports(&mut self) -> Vec<String> {
        self.ports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn opened() -> SimulatedBasik {
        let mut sim = SimulatedBasik::new("COM6", 1);
        sim.open_port("COM6").await.unwrap();
        sim.create_device("COM6", 1).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn test_read_requires_session() {
        let mut sim = SimulatedBasik::new("COM6", 1);
        let err = sim
            .read_register("COM6", 1, 0x1C, WireType::I16, -1)
            .await
            .unwrap_err();
        assert_eq!(err, RegisterResult::PortClosed);

        sim.open_port("COM6").await.unwrap();
        let err = sim
            .read_register("COM6", 1, 0x1C, WireType::I16, -1)
            .await
            .unwrap_err();
        assert_eq!(err, RegisterResult::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_defaults_and_write() {
        let mut sim = opened().await;
        let temp = sim
            .read_register("COM6", 1, 0x1C, WireType::I16, -1)
            .await
            .unwrap();
        assert_eq!(temp, RawValue::I16(253));

        sim.write_register("COM6", 1, 0x30, RawValue::U8(1), -1)
            .await
            .unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::Status),
            Some(RawValue::U16(1))
        );

        let err = sim
            .write_register("COM6", 1, 0x30, RawValue::U16(1), -1)
            .await
            .unwrap_err();
        assert_eq!(err, RegisterResult::TypeError);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mut sim = opened().await;
        sim.fail_next(Register::Temperature, RegisterResult::Timeout);
        assert_eq!(
            sim.read_register("COM6", 1, 0x1C, WireType::I16, -1).await,
            Err(RegisterResult::Timeout)
        );
        assert!(sim
            .read_register("COM6", 1, 0x1C, WireType::I16, -1)
            .await
            .is_ok());

        sim.fail_register(Register::Temperature, RegisterResult::Busy);
        for _ in 0..3 {
            assert_eq!(
                sim.read_register("COM6", 1, 0x1C, WireType::I16, -1).await,
                Err(RegisterResult::Busy)
            );
        }
        sim.clear_failure(Register::Temperature);
        assert!(sim
            .read_register("COM6", 1, 0x1C, WireType::I16, -1)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_readout_relaxes_toward_offset() {
        let mut sim = opened().await.with_relaxation(0.5);
        sim.set_raw(Register::WavelengthOffset, RawValue::I16(100));

        let mut readings = Vec::new();
        for _ in 0..4 {
            let raw = sim
                .read_register("COM6", 1, 0x72, WireType::I16, -1)
                .await
                .unwrap();
            readings.push(raw.as_integer().unwrap());
        }
        assert_eq!(readings, vec![50, 75, 88, 94]);
    }

    #[tokio::test]
    async fn test_scripted_reads_come_first() {
        let mut sim = opened().await;
        sim.script_reads(Register::Temperature, [RawValue::I16(1), RawValue::I16(2)]);
        let mut values = Vec::new();
        for _ in 0..3 {
            let raw = sim
                .read_register("COM6", 1, 0x1C, WireType::I16, -1)
                .await
                .unwrap();
            values.push(raw.as_integer().unwrap());
        }
        assert_eq!(values, vec![1, 2, 253]);
        assert_eq!(sim.read_count(Register::Temperature), 3);
    }

    #[tokio::test]
    async fn test_device_types_table() {
        let mut sim = SimulatedBasik::new("COM6", 1).with_device("COM6", 3, "second");
        sim.open_port("COM6").await.unwrap();
        let types = sim.device_types("COM6").await.unwrap();
        assert_eq!(types, vec![0, SIMULATED_MODULE_TYPE, 0, SIMULATED_MODULE_TYPE]);
        assert_eq!(sim.available_ports().await, vec!["COM6".to_string()]);
    }
}
