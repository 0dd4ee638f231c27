//! NKT Photonics Basik K1x2 seed laser driver
//!
//! Register-level protocol, with the transport supplied by the caller:
//! - Scalars: scaled integer registers, converted by [`RegisterCodec`]
//! - Configuration: bit-packed SETUP and MODULATION_SETUP words, always
//!   changed by read-modify-write so unrelated bits survive
//! - Wavelength: center (calibration) + offset (setpoint, pm) or
//!   offset readout (measured, pm)
//!
//! # Example Usage
//!
//! ```no_run
//! use seed_daq::hardware::{shared, simulated::SimulatedBasik};
//! use seed_daq::laser::{BasikDriver, ModulationRange};
//!
//! # async fn demo() -> seed_daq::error::LaserResult<()> {
//! let transport = shared(SimulatedBasik::new("COM6", 1));
//! let laser = BasikDriver::open(transport, "COM6", 1).await?;
//!
//! laser.set_wavelength_setpoint(1086.85).await?;
//! laser.set_modulation_range(ModulationRange::Narrow).await?;
//! println!("{:.4} GHz", laser.frequency().await?);
//!
//! laser.close().await?;
//! # Ok(())
//! # }
//! ```

use super::modes::{
    CodedEnum, IntoCoded, LaserMode, ModulationCoupling, ModulationRange, ModulationSource,
    ModulationWaveform,
};
use super::modulation::WavelengthModulation;
use crate::bits::{BitField, ErrorFlags, ModulationSetup, Setup, SetupBit, Status, REGISTER_WIDTH};
use crate::error::{LaserError, LaserResult};
use crate::hardware::{SharedTransport, NO_INDEX};
use crate::register::{Register, RegisterCodec, RegisterValue};
use crate::units::{frequency_to_wavelength, round_to, wavelength_to_frequency};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Picometres per nanometre
const PM_PER_NM: f64 = 1e3;

/// Driver for one Basik module
///
/// Valid from a successful [`open`](Self::open) until [`close`](Self::close).
/// Every property access on a closed driver fails with
/// [`LaserError::Connection`]; a closed driver cannot be reopened.
pub struct BasikDriver {
    codec: RegisterCodec,
    open: AtomicBool,
}

impl BasikDriver {
    /// Open `port` and create the device session for `device_id`
    ///
    /// # Errors
    /// Returns [`LaserError::Connection`] if the port cannot be opened or the
    /// device session cannot be created. A port opened here is closed again
    /// when session creation fails.
    pub async fn open(transport: SharedTransport, port: &str, device_id: u8) -> LaserResult<Self> {
        {
            let mut guard = transport.lock().await;
            guard.open_port(port).await.map_err(|code| {
                LaserError::Connection(format!("port {}: {}", port, code))
            })?;

            if let Err(code) = guard.create_device(port, device_id).await {
                if let Err(close) = guard.close_port(port).await {
                    warn!(port, error = %close, "Failed to close port after device create failed");
                }
                return Err(LaserError::Connection(format!(
                    "port {}, device {}: {}",
                    port, device_id, code
                )));
            }
        }

        info!(port, device_id, "Basik module connected");
        Ok(Self {
            codec: RegisterCodec::new(transport, port, device_id),
            open: AtomicBool::new(true),
        })
    }

    /// Remove the device session and close the port
    pub async fn close(&self) -> LaserResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        let port = self.codec.port();
        let device_id = self.codec.device_id();
        let mut transport = self.codec.transport().lock().await;

        let removed = transport.remove_device(port, device_id).await;
        let closed = transport.close_port(port).await;
        if let Err(code) = removed {
            return Err(LaserError::Connection(format!(
                "port {}, device {}: {}",
                port, device_id, code
            )));
        }
        closed.map_err(|code| LaserError::Connection(format!("port {}: {}", port, code)))?;

        info!(port, device_id, "Basik module disconnected");
        Ok(())
    }

    /// Whether the session is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Port of this session
    pub fn port(&self) -> &str {
        self.codec.port()
    }

    /// Device id of this session
    pub fn device_id(&self) -> u8 {
        self.codec.device_id()
    }

    /// The transport this session talks through
    pub fn transport(&self) -> &SharedTransport {
        self.codec.transport()
    }

    fn closed_error(&self) -> LaserError {
        LaserError::Connection(format!(
            "device {} on port {} is closed",
            self.codec.device_id(),
            self.codec.port()
        ))
    }

    fn ensure_open(&self) -> LaserResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    // ---- register helpers ----

    async fn read_at(&self, register: Register, index: i16) -> LaserResult<RegisterValue> {
        self.ensure_open()?;
        self.codec.read(register, index).await
    }

    async fn read(&self, register: Register) -> LaserResult<RegisterValue> {
        self.read_at(register, NO_INDEX).await
    }

    async fn write_at(&self, register: Register, value: RegisterValue, index: i16) -> LaserResult<()> {
        self.ensure_open()?;
        self.codec.write(register, value, index).await
    }

    async fn write(&self, register: Register, value: RegisterValue) -> LaserResult<()> {
        self.write_at(register, value, NO_INDEX).await
    }

    async fn read_number(&self, register: Register) -> LaserResult<f64> {
        let value = self.read(register).await?;
        value.as_f64().ok_or(LaserError::TypeMismatch {
            register,
            expected: "number",
            found: value.kind(),
        })
    }

    async fn read_word(&self, register: Register) -> LaserResult<u32> {
        let value = self.read(register).await?;
        value
            .as_int()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(LaserError::TypeMismatch {
                register,
                expected: "integer",
                found: value.kind(),
            })
    }

    async fn read_text(&self, register: Register) -> LaserResult<String> {
        match self.read(register).await? {
            RegisterValue::Text(text) => Ok(text),
            other => Err(LaserError::TypeMismatch {
                register,
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    async fn update_word<F>(&self, register: Register, update: F) -> LaserResult<u32>
    where
        F: FnOnce(BitField) -> BitField,
    {
        self.ensure_open()?;
        self.codec
            .read_modify_write(register, NO_INDEX, |raw| {
                update(BitField::new(raw, REGISTER_WIDTH)).value()
            })
            .await
    }

    async fn setup_flag(&self, bit: SetupBit) -> LaserResult<bool> {
        Ok(self.setup().await?.is_set(bit))
    }

    async fn setup_enum<E: CodedEnum>(&self, bit: SetupBit) -> LaserResult<E> {
        let on = self.setup_flag(bit).await?;
        E::from_code(on as i64).ok_or_else(|| LaserError::InvalidEnumValue {
            property: E::PROPERTY,
            value: (on as u8).to_string(),
            expected: E::expected(),
        })
    }

    async fn set_setup_flag(&self, bit: SetupBit, on: bool) -> LaserResult<()> {
        let raw = self
            .update_word(Register::Setup, |setup| setup.with_bit(bit.position(), on))
            .await?;
        debug!(bit = %bit, on, setup = raw, "Setup bit updated");
        Ok(())
    }

    // ---- identity ----

    /// Module serial number
    pub async fn serial_number(&self) -> LaserResult<String> {
        self.read_text(Register::SerialNumber).await
    }

    /// Module name
    pub async fn name(&self) -> LaserResult<String> {
        self.read_text(Register::Name).await
    }

    /// Set the module name
    pub async fn set_name(&self, name: &str) -> LaserResult<()> {
        self.write(Register::Name, RegisterValue::from(name)).await
    }

    // ---- scalar readouts ----

    /// Module temperature in C
    pub async fn temperature(&self) -> LaserResult<f64> {
        self.read_number(Register::Temperature).await
    }

    /// Supply voltage in V
    pub async fn supply_voltage(&self) -> LaserResult<f64> {
        self.read_number(Register::SupplyVoltage).await
    }

    /// Output power in mW
    pub async fn power(&self) -> LaserResult<f64> {
        self.read_number(Register::OutputPowerMw).await
    }

    /// Output power in dBm
    pub async fn power_dbm(&self) -> LaserResult<f64> {
        self.read_number(Register::OutputPowerDbm).await
    }

    /// Power-mode setpoint in mW
    pub async fn output_power_setpoint(&self) -> LaserResult<f64> {
        self.read_number(Register::OutputPowerSetpointMw).await
    }

    /// Set the power-mode setpoint in mW
    pub async fn set_output_power_setpoint(&self, power_mw: f64) -> LaserResult<()> {
        self.write(Register::OutputPowerSetpointMw, power_mw.into())
            .await
    }

    /// Power-mode setpoint in dBm
    pub async fn output_power_setpoint_dbm(&self) -> LaserResult<f64> {
        self.read_number(Register::OutputPowerSetpointDbm).await
    }

    /// Set the power-mode setpoint in dBm
    pub async fn set_output_power_setpoint_dbm(&self, power_dbm: f64) -> LaserResult<()> {
        self.write(Register::OutputPowerSetpointDbm, power_dbm.into())
            .await
    }

    // ---- wavelength & frequency ----

    /// Calibrated center wavelength in nm
    pub async fn wavelength_center(&self) -> LaserResult<f64> {
        self.read_number(Register::WavelengthCenter).await
    }

    /// Wavelength offset setpoint in pm
    pub async fn wavelength_offset(&self) -> LaserResult<f64> {
        self.read_number(Register::WavelengthOffset).await
    }

    /// Set the wavelength offset setpoint in pm
    pub async fn set_wavelength_offset(&self, offset_pm: f64) -> LaserResult<()> {
        self.write(Register::WavelengthOffset, offset_pm.into())
            .await
    }

    /// Measured wavelength offset in pm
    pub async fn wavelength_offset_readout(&self) -> LaserResult<f64> {
        self.read_number(Register::WavelengthOffsetReadout).await
    }

    /// Measured wavelength in nm
    pub async fn wavelength(&self) -> LaserResult<f64> {
        let center = self.wavelength_center().await?;
        let readout = self.wavelength_offset_readout().await?;
        Ok(center + readout / PM_PER_NM)
    }

    /// Wavelength setpoint in nm
    pub async fn wavelength_setpoint(&self) -> LaserResult<f64> {
        let center = self.wavelength_center().await?;
        let offset = self.wavelength_offset().await?;
        Ok(center + offset / PM_PER_NM)
    }

    /// Set the wavelength setpoint in nm by writing the offset from center.
    /// The offset is truncated toward zero to the 0.1 pm register step.
    pub async fn set_wavelength_setpoint(&self, wavelength_nm: f64) -> LaserResult<()> {
        let center = self.wavelength_center().await?;
        let offset_pm = (wavelength_nm - center) * PM_PER_NM;
        debug!(wavelength_nm, center, offset_pm, "Setting wavelength setpoint");
        self.set_wavelength_offset(offset_pm).await
    }

    /// Measured optical frequency in GHz
    pub async fn frequency(&self) -> LaserResult<f64> {
        let wavelength = self.wavelength().await?;
        Ok(round_to(wavelength_to_frequency(wavelength), 4))
    }

    /// Frequency setpoint in GHz
    pub async fn frequency_setpoint(&self) -> LaserResult<f64> {
        let wavelength = self.wavelength_setpoint().await?;
        Ok(round_to(wavelength_to_frequency(wavelength), 4))
    }

    /// Set the frequency setpoint in GHz. The wavelength is rounded to 1 pm.
    pub async fn set_frequency_setpoint(&self, frequency_ghz: f64) -> LaserResult<()> {
        self.set_wavelength_setpoint(round_to(frequency_to_wavelength(frequency_ghz), 3))
            .await
    }

    /// Shift the frequency setpoint by `delta_ghz`
    ///
    /// A single setpoint write; the module's own control loop does the
    /// physical convergence.
    pub async fn move_frequency(&self, delta_ghz: f64) -> LaserResult<()> {
        let frequency = self.frequency_setpoint().await?;
        self.set_wavelength_setpoint(round_to(
            frequency_to_wavelength(frequency + delta_ghz),
            3,
        ))
        .await
    }

    // ---- emission & mode ----

    /// Whether emission is on
    pub async fn emission(&self) -> LaserResult<bool> {
        Ok(self.read_word(Register::Emission).await? != 0)
    }

    /// Switch emission on or off
    pub async fn set_emission(&self, enable: bool) -> LaserResult<()> {
        info!(port = self.port(), enable, "Setting emission");
        self.write(Register::Emission, RegisterValue::Int(enable as i64))
            .await
    }

    /// Pump regulation mode
    pub async fn mode(&self) -> LaserResult<LaserMode> {
        self.setup_enum(SetupBit::PumpOperationConstantCurrent)
            .await
    }

    /// Set the pump regulation mode
    pub async fn set_mode(&self, mode: impl IntoCoded<LaserMode>) -> LaserResult<()> {
        let mode = mode.into_coded()?;
        self.set_setup_flag(SetupBit::PumpOperationConstantCurrent, mode.code() != 0)
            .await
    }

    /// Constant current mode
    pub async fn set_current_mode(&self) -> LaserResult<()> {
        self.set_mode(LaserMode::Current).await
    }

    /// Constant power mode
    pub async fn set_power_mode(&self) -> LaserResult<()> {
        self.set_mode(LaserMode::Power).await
    }

    // ---- state words ----

    /// Undecoded STATUS register
    pub async fn status_bits(&self) -> LaserResult<u32> {
        self.read_word(Register::Status).await
    }

    /// Decoded STATUS register
    pub async fn status(&self) -> LaserResult<Status> {
        Ok(Status::decode(self.status_bits().await?))
    }

    /// Undecoded ERROR register
    pub async fn error_bits(&self) -> LaserResult<u32> {
        self.read_word(Register::Error).await
    }

    /// Decoded ERROR register
    pub async fn error(&self) -> LaserResult<ErrorFlags> {
        Ok(ErrorFlags::decode(self.error_bits().await?))
    }

    /// Undecoded SETUP register
    pub async fn setup_bits(&self) -> LaserResult<u32> {
        self.read_word(Register::Setup).await
    }

    /// Decoded SETUP register
    pub async fn setup(&self) -> LaserResult<Setup> {
        Ok(Setup::decode(self.setup_bits().await?))
    }

    /// MODULATION_SETUP register
    pub async fn modulation_setup(&self) -> LaserResult<ModulationSetup> {
        Ok(ModulationSetup::new(
            self.read_word(Register::ModulationSetup).await?,
        ))
    }

    // ---- wavelength modulation ----

    /// Whether wavelength modulation is enabled
    pub async fn modulation(&self) -> LaserResult<bool> {
        Ok(self.read_word(Register::WavelengthModulation).await? != 0)
    }

    /// Enable or disable wavelength modulation
    pub async fn set_modulation(&self, enable: bool) -> LaserResult<()> {
        self.write(Register::WavelengthModulation, RegisterValue::Int(enable as i64))
            .await
    }

    /// Modulation input, `None` when neither input is selected
    pub async fn modulation_source(&self) -> LaserResult<Option<ModulationSource>> {
        let setup = self.setup().await?;
        Ok(ModulationSource::from_bits(
            setup.external_wavelength_modulation,
            setup.internal_wavelength_modulation,
        ))
    }

    /// Select the modulation input
    pub async fn set_modulation_source(
        &self,
        source: impl IntoCoded<ModulationSource>,
    ) -> LaserResult<()> {
        let source = source.into_coded()?;
        self.update_word(Register::Setup, |setup| {
            setup
                .with_bit(
                    SetupBit::ExternalWavelengthModulation.position(),
                    source.external(),
                )
                .with_bit(
                    SetupBit::InternalWavelengthModulation.position(),
                    source.internal(),
                )
        })
        .await?;
        Ok(())
    }

    /// Modulation range
    pub async fn modulation_range(&self) -> LaserResult<ModulationRange> {
        self.setup_enum(SetupBit::NarrowWavelengthModulation).await
    }

    /// Set the modulation range
    pub async fn set_modulation_range(
        &self,
        range: impl IntoCoded<ModulationRange>,
    ) -> LaserResult<()> {
        let range = range.into_coded()?;
        self.set_setup_flag(SetupBit::NarrowWavelengthModulation, range.code() != 0)
            .await
    }

    /// Modulation input coupling
    pub async fn modulation_coupling(&self) -> LaserResult<ModulationCoupling> {
        self.setup_enum(SetupBit::WavelengthModulationDc).await
    }

    /// Set the modulation input coupling
    pub async fn set_modulation_coupling(
        &self,
        coupling: impl IntoCoded<ModulationCoupling>,
    ) -> LaserResult<()> {
        let coupling = coupling.into_coded()?;
        self.set_setup_flag(SetupBit::WavelengthModulationDc, coupling.code() != 0)
            .await
    }

    /// Modulation waveform
    pub async fn modulation_waveform(&self) -> LaserResult<ModulationWaveform> {
        let code = self.modulation_setup().await?.waveform_code();
        ModulationWaveform::from_code(code as i64).ok_or_else(|| LaserError::InvalidEnumValue {
            property: ModulationWaveform::PROPERTY,
            value: code.to_string(),
            expected: ModulationWaveform::expected(),
        })
    }

    /// Set the modulation waveform, leaving the other MODULATION_SETUP bits
    pub async fn set_modulation_waveform(
        &self,
        waveform: impl IntoCoded<ModulationWaveform>,
    ) -> LaserResult<()> {
        let waveform = waveform.into_coded()?;
        self.update_word(Register::ModulationSetup, |bits| {
            let mut setup = ModulationSetup::new(bits.value());
            setup.set_waveform_code(waveform.code());
            BitField::new(setup.raw(), REGISTER_WIDTH)
        })
        .await?;
        Ok(())
    }

    /// Modulation frequency in Hz
    pub async fn modulation_frequency(&self) -> LaserResult<f64> {
        let value = self
            .read_at(Register::WavelengthModulationFrequency, 0)
            .await?;
        value.as_f64().ok_or(LaserError::TypeMismatch {
            register: Register::WavelengthModulationFrequency,
            expected: "number",
            found: value.kind(),
        })
    }

    /// Set the modulation frequency in Hz
    pub async fn set_modulation_frequency(&self, frequency_hz: f64) -> LaserResult<()> {
        self.write_at(
            Register::WavelengthModulationFrequency,
            frequency_hz.into(),
            0,
        )
        .await
    }

    /// Modulation amplitude in per-mille of full scale
    pub async fn modulation_amplitude(&self) -> LaserResult<f64> {
        self.read_number(Register::WavelengthModulationLevel).await
    }

    /// Modulation offset in per-mille of full scale
    pub async fn modulation_offset(&self) -> LaserResult<f64> {
        self.read_number(Register::WavelengthModulationOffset).await
    }

    /// Amplitude modulation frequency in Hz
    pub async fn amplitude_modulation_frequency(&self) -> LaserResult<f64> {
        self.read_number(Register::AmplitudeModulationFrequency)
            .await
    }

    /// Amplitude modulation depth
    pub async fn amplitude_modulation_depth(&self) -> LaserResult<f64> {
        self.read_number(Register::AmplitudeModulationDepth).await
    }

    /// All wavelength modulation settings
    pub async fn wavelength_modulation(&self) -> LaserResult<WavelengthModulation> {
        let setup = self.setup().await?;
        let range = ModulationRange::from_code(setup.narrow_wavelength_modulation as i64)
            .unwrap_or(ModulationRange::Wide);
        let coupling = ModulationCoupling::from_code(setup.wavelength_modulation_dc as i64)
            .unwrap_or(ModulationCoupling::Ac);
        Ok(WavelengthModulation {
            enabled: self.modulation().await?,
            frequency: self.modulation_frequency().await?,
            amplitude: self.modulation_amplitude().await?,
            offset: self.modulation_offset().await?,
            range,
            source: ModulationSource::from_bits(
                setup.external_wavelength_modulation,
                setup.internal_wavelength_modulation,
            ),
            waveform: self.modulation_waveform().await?,
            coupling,
        })
    }
}

impl std::fmt::Debug for BasikDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasikDriver")
            .field("port", &self.port())
            .field("device_id", &self.device_id())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedBasik;
    use crate::hardware::{shared, RawValue};

    async fn open_sim() -> (SimulatedBasik, BasikDriver) {
        let sim = SimulatedBasik::new("COM6", 1);
        let laser = BasikDriver::open(shared(sim.clone()), "COM6", 1)
            .await
            .unwrap();
        (sim, laser)
    }

    #[tokio::test]
    async fn test_wavelength_composition() {
        let (sim, laser) = open_sim().await;
        sim.set_raw(Register::WavelengthOffset, RawValue::I16(500));

        assert!((laser.wavelength_setpoint().await.unwrap() - 1086.85).abs() < 1e-9);
        // relaxation 1.0: the readout tracks the setpoint on the first read
        assert!((laser.wavelength().await.unwrap() - 1086.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_set_wavelength_setpoint_writes_offset() {
        let (sim, laser) = open_sim().await;
        laser.set_wavelength_setpoint(1086.85).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::WavelengthOffset),
            Some(RawValue::I16(500))
        );

        laser.set_wavelength_setpoint(1086.7912).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::WavelengthOffset),
            Some(RawValue::I16(-88))
        );

        // sub-step remainders truncate toward zero
        laser.set_wavelength_setpoint(1086.80049).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::WavelengthOffset),
            Some(RawValue::I16(4))
        );
        laser.set_wavelength_setpoint(1086.79951).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::WavelengthOffset),
            Some(RawValue::I16(-4))
        );
    }

    #[tokio::test]
    async fn test_setup_bit_updates_preserve_other_bits() {
        let (sim, laser) = open_sim().await;
        sim.set_raw(Register::Setup, RawValue::U16(0b10_0010_0000));

        laser.set_mode(LaserMode::Current).await.unwrap();
        laser.set_modulation_coupling(1).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::Setup),
            Some(RawValue::U16(0b11_0010_1000))
        );
        assert_eq!(laser.mode().await.unwrap(), LaserMode::Current);

        laser.set_power_mode().await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::Setup),
            Some(RawValue::U16(0b10_0010_1000))
        );
    }

    #[tokio::test]
    async fn test_modulation_range_uses_setup_register() {
        let (sim, laser) = open_sim().await;
        sim.set_raw(Register::ModulationSetup, RawValue::U16(0b1000_0000));

        laser
            .set_modulation_range(ModulationRange::Narrow)
            .await
            .unwrap();
        assert_eq!(sim.raw("COM6", 1, Register::Setup), Some(RawValue::U16(0b10)));
        assert_eq!(
            sim.raw("COM6", 1, Register::ModulationSetup),
            Some(RawValue::U16(0b1000_0000))
        );
        assert_eq!(
            laser.modulation_range().await.unwrap(),
            ModulationRange::Narrow
        );
    }

    #[tokio::test]
    async fn test_modulation_source_bits() {
        let (sim, laser) = open_sim().await;
        assert_eq!(laser.modulation_source().await.unwrap(), None);

        laser
            .set_modulation_source(ModulationSource::Internal)
            .await
            .unwrap();
        assert_eq!(sim.raw("COM6", 1, Register::Setup), Some(RawValue::U16(1 << 4)));

        laser.set_modulation_source(3).await.unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::Setup),
            Some(RawValue::U16(1 << 4 | 1 << 2))
        );
        assert_eq!(
            laser.modulation_source().await.unwrap(),
            Some(ModulationSource::Both)
        );
    }

    #[tokio::test]
    async fn test_waveform_round_trip_keeps_selector_bits() {
        let (sim, laser) = open_sim().await;
        sim.set_raw(Register::ModulationSetup, RawValue::U16(0b1101_0101));

        laser
            .set_modulation_waveform(ModulationWaveform::Sine)
            .await
            .unwrap();
        assert_eq!(
            sim.raw("COM6", 1, Register::ModulationSetup),
            Some(RawValue::U16(0b0001_0101))
        );

        laser.set_modulation_waveform(2).await.unwrap();
        assert_eq!(
            laser.modulation_waveform().await.unwrap(),
            ModulationWaveform::Sawtooth
        );
    }

    #[tokio::test]
    async fn test_invalid_enum_values_do_no_io() {
        let (sim, laser) = open_sim().await;
        sim.clear_log();

        assert!(laser.set_modulation_range(true).await.is_err());
        assert!(laser.set_modulation_range("narrow").await.is_err());
        assert!(laser.set_modulation_range(3).await.is_err());
        assert!(laser.set_modulation_source(0).await.is_err());
        assert!(laser.set_modulation_coupling(2).await.is_err());
        assert!(laser.set_modulation_waveform(4).await.is_err());
        let err = laser.set_mode(2).await.unwrap_err();
        assert!(err.to_string().contains("(0, 1)"));

        assert!(sim.call_log().is_empty());
    }

    #[tokio::test]
    async fn test_frequency_round_trip() {
        let (_sim, laser) = open_sim().await;
        let start = laser.frequency_setpoint().await.unwrap();
        laser.move_frequency(10.0).await.unwrap();
        let moved = laser.frequency_setpoint().await.unwrap();
        // 1 pm of wavelength is ~0.25 GHz at 1086 nm
        assert!((moved - start - 10.0).abs() < 0.3, "{} -> {}", start, moved);

        laser.set_frequency_setpoint(start).await.unwrap();
        assert!((laser.frequency_setpoint().await.unwrap() - start).abs() < 0.3);
    }

    #[tokio::test]
    async fn test_closed_driver_refuses_access() {
        let (sim, laser) = open_sim().await;
        laser.close().await.unwrap();
        assert!(!sim.is_port_open("COM6"));

        let err = laser.temperature().await.unwrap_err();
        assert!(err.is_connection());
        assert!(laser.set_emission(true).await.unwrap_err().is_connection());
        assert!(laser.close().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_open_failure_closes_port() {
        let sim = SimulatedBasik::new("COM6", 1);
        let err = BasikDriver::open(shared(sim.clone()), "COM6", 9)
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert!(!sim.is_port_open("COM6"));
    }

    #[tokio::test]
    async fn test_emission_and_status() {
        let (_sim, laser) = open_sim().await;
        assert!(!laser.emission().await.unwrap());
        laser.set_emission(true).await.unwrap();
        assert!(laser.emission().await.unwrap());
        assert!(laser.status().await.unwrap().emission);
    }

    #[tokio::test]
    async fn test_wavelength_modulation_snapshot() {
        let (sim, laser) = open_sim().await;
        sim.set_raw(Register::Setup, RawValue::U16(1 << 1 | 1 << 2 | 1 << 3));
        sim.set_raw(Register::WavelengthModulationLevel, RawValue::U16(250));
        laser.set_modulation(true).await.unwrap();

        let snapshot = laser.wavelength_modulation().await.unwrap();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.frequency, 1000.0);
        assert_eq!(snapshot.amplitude, 25.0);
        assert_eq!(snapshot.range, ModulationRange::Narrow);
        assert_eq!(snapshot.coupling, ModulationCoupling::Dc);
        assert_eq!(snapshot.source, Some(ModulationSource::External));
    }
}
