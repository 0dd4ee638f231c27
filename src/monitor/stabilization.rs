//! Settling detection for the wavelength or frequency loop.
//!
//! The module's firmware does the actual control. This monitor only samples
//! the measured value against the fixed setpoint on a period `dt` and reports
//! convergence once `consecutive_in_band * dt >= dt_stable`. Any sample out of
//! band (or any failed read) resets the count.

use crate::error::{LaserError, LaserResult};
use crate::laser::BasikDriver;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Quantity whose convergence is monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    /// Wavelength in nm
    Wavelength,
    /// Frequency in GHz
    Frequency,
}

impl Quantity {
    #[allow(missing_docs)]
    pub fn name(self) -> &'static str {
        match self {
            Quantity::Wavelength => "wavelength",
            Quantity::Frequency => "frequency",
        }
    }

    #[allow(missing_docs)]
    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Wavelength => "nm",
            Quantity::Frequency => "GHz",
        }
    }

    /// Measured value
    pub async fn read(self, laser: &BasikDriver) -> LaserResult<f64> {
        match self {
            Quantity::Wavelength => laser.wavelength().await,
            Quantity::Frequency => laser.frequency().await,
        }
    }

    /// Current setpoint
    pub async fn setpoint(self, laser: &BasikDriver) -> LaserResult<f64> {
        match self {
            Quantity::Wavelength => laser.wavelength_setpoint().await,
            Quantity::Frequency => laser.frequency_setpoint().await,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quantity {
    type Err = LaserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wavelength" => Ok(Quantity::Wavelength),
            "frequency" => Ok(Quantity::Frequency),
            other => Err(LaserError::UnknownField(other.to_string())),
        }
    }
}

/// Parameters of one stabilization wait
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilizationSettings {
    /// Quantity to watch
    pub quantity: Quantity,
    /// Half-width of the accepted band, in the quantity's unit
    pub tolerance: f64,
    /// Sampling period
    pub dt: Duration,
    /// How long the value must stay in band
    pub dt_stable: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub max_wait: Option<Duration>,
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            quantity: Quantity::Wavelength,
            tolerance: 1e-3,
            dt: Duration::from_secs(1),
            dt_stable: Duration::from_secs(5),
            max_wait: None,
        }
    }
}

/// Consecutive in-band counter
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    tolerance: f64,
    dt: Duration,
    dt_stable: Duration,
    counter: u32,
}

impl StabilityFilter {
    #[allow(missing_docs)]
    pub fn new(tolerance: f64, dt: Duration, dt_stable: Duration) -> Self {
        Self {
            tolerance,
            dt,
            dt_stable,
            counter: 0,
        }
    }

    /// Feed one sample; returns true once the value has been in band long
    /// enough
    pub fn observe(&mut self, value: f64, setpoint: f64) -> bool {
        if (value - setpoint).abs() < self.tolerance {
            self.counter += 1;
        } else {
            self.counter = 0;
        }
        self.is_stable()
    }

    /// Whether the current run of in-band samples is long enough
    pub fn is_stable(&self) -> bool {
        self.counter > 0 && self.dt * self.counter >= self.dt_stable
    }

    /// Start counting from zero
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Length of the current run of in-band samples
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Time the current run has been in band
    pub fn stable_for(&self) -> Duration {
        self.dt * self.counter
    }
}

/// How a stabilization wait ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StabilizationOutcome {
    /// The value stayed in band for `dt_stable`
    Stabilized {
        /// Time from the start of the wait
        elapsed: Duration,
        /// Number of samples taken
        samples: usize,
    },
    /// `max_wait` passed first
    TimedOut {
        /// Time from the start of the wait
        elapsed: Duration,
        /// Last value read successfully
        last_value: Option<f64>,
    },
    /// A stop request arrived between ticks
    Cancelled {
        /// Time from the start of the wait
        elapsed: Duration,
    },
}

impl StabilizationOutcome {
    /// Whether the wait ended stabilized
    pub fn is_stabilized(&self) -> bool {
        matches!(self, StabilizationOutcome::Stabilized { .. })
    }
}

/// Periodic sampler that waits for a quantity to settle
#[derive(Debug, Clone)]
pub struct StabilizationMonitor {
    settings: StabilizationSettings,
}

impl StabilizationMonitor {
    #[allow(missing_docs)]
    pub fn new(settings: StabilizationSettings) -> Self {
        Self { settings }
    }

    #[allow(missing_docs)]
    pub fn settings(&self) -> &StabilizationSettings {
        &self.settings
    }

    /// Sample until the quantity settles, `max_wait` expires, or `stop`
    /// becomes true.
    ///
    /// The setpoint is read once at the start; a failure there is returned.
    /// Read failures during sampling reset the in-band count and are logged.
    /// Stop requests are only observed between ticks.
    pub async fn wait(
        &self,
        laser: &BasikDriver,
        stop: Option<watch::Receiver<bool>>,
    ) -> LaserResult<StabilizationOutcome> {
        let settings = &self.settings;
        let quantity = settings.quantity;
        let setpoint = quantity.setpoint(laser).await?;
        let mut filter = StabilityFilter::new(settings.tolerance, settings.dt, settings.dt_stable);

        info!(
            %quantity,
            setpoint,
            tolerance = settings.tolerance,
            "Waiting for {} to stabilize",
            quantity
        );

        let start = Instant::now();
        let mut ticker = tokio::time::interval(settings.dt.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut samples = 0usize;
        let mut last_value = None;

        loop {
            ticker.tick().await;

            if stop.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                info!(%quantity, "Stabilization wait cancelled");
                return Ok(StabilizationOutcome::Cancelled {
                    elapsed: start.elapsed(),
                });
            }

            samples += 1;
            match quantity.read(laser).await {
                Ok(value) => {
                    last_value = Some(value);
                    let stable = filter.observe(value, setpoint);
                    debug!(
                        %quantity,
                        value,
                        delta = setpoint - value,
                        counter = filter.counter(),
                        "Stabilization sample"
                    );
                    if stable {
                        info!(
                            %quantity,
                            stable_for = ?filter.stable_for(),
                            "Reached setpoint {:.4} {} within {:.2e}",
                            setpoint,
                            quantity.unit(),
                            settings.tolerance
                        );
                        return Ok(StabilizationOutcome::Stabilized {
                            elapsed: start.elapsed(),
                            samples,
                        });
                    }
                }
                Err(err) => {
                    warn!(%quantity, error = %err, "Read failed during stabilization");
                    filter.reset();
                }
            }

            if let Some(max_wait) = settings.max_wait {
                if start.elapsed() >= max_wait {
                    warn!(%quantity, ?max_wait, "Did not stabilize in time");
                    return Ok(StabilizationOutcome::TimedOut {
                        elapsed: start.elapsed(),
                        last_value,
                    });
                }
            }
        }
    }
}
