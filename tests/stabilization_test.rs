//! Stabilization monitor against the simulated module, on paused time

use seed_daq::hardware::simulated::SimulatedBasik;
use seed_daq::hardware::{shared, RawValue, RegisterResult};
use seed_daq::laser::BasikDriver;
use seed_daq::monitor::{Quantity, StabilizationMonitor, StabilizationOutcome, StabilizationSettings};
use seed_daq::register::Register;
use seed_daq::LaserError;
use std::time::Duration;
use tokio::sync::watch;
use tracing_test::traced_test;

async fn open(sim: &SimulatedBasik) -> BasikDriver {
    BasikDriver::open(shared(sim.clone()), "COM6", 1)
        .await
        .unwrap()
}

fn settings(quantity: Quantity) -> StabilizationSettings {
    StabilizationSettings {
        quantity,
        tolerance: 1e-3,
        dt: Duration::from_secs(1),
        dt_stable: Duration::from_secs(3),
        max_wait: None,
    }
}

fn readouts(counts: &[i16]) -> Vec<RawValue> {
    counts.iter().map(|c| RawValue::I16(*c)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_converges_on_third_sample() {
    let sim = SimulatedBasik::new("COM6", 1);
    // -1.0 pm, +0.5 pm, -0.5 pm: all inside 1 pm of 1086.8 nm
    sim.script_reads(Register::WavelengthOffsetReadout, readouts(&[-10, 5, -5]));
    let laser = open(&sim).await;

    let outcome = StabilizationMonitor::new(settings(Quantity::Wavelength))
        .wait(&laser, None)
        .await
        .unwrap();

    match outcome {
        StabilizationOutcome::Stabilized { elapsed, samples } => {
            assert_eq!(samples, 3);
            assert!(elapsed >= Duration::from_secs(2));
            assert!(elapsed < Duration::from_secs(3));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(sim.read_count(Register::WavelengthOffsetReadout), 3);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_band_sample_restarts_count() {
    let sim = SimulatedBasik::new("COM6", 1);
    // third sample is 3 pm away
    sim.script_reads(
        Register::WavelengthOffsetReadout,
        readouts(&[-10, 5, 30, -5, 5, -10]),
    );
    let laser = open(&sim).await;

    let outcome = StabilizationMonitor::new(settings(Quantity::Wavelength))
        .wait(&laser, None)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        StabilizationOutcome::Stabilized { samples: 6, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_times_out_when_readout_stays_away() {
    let sim = SimulatedBasik::new("COM6", 1).with_relaxation(0.0);
    sim.set_raw(Register::WavelengthOffsetReadout, RawValue::I16(200));
    let laser = open(&sim).await;

    let mut settings = settings(Quantity::Wavelength);
    settings.max_wait = Some(Duration::from_secs(5));
    let outcome = StabilizationMonitor::new(settings)
        .wait(&laser, None)
        .await
        .unwrap();

    match outcome {
        StabilizationOutcome::TimedOut {
            elapsed,
            last_value,
        } => {
            assert!(elapsed >= Duration::from_secs(5));
            let last = last_value.unwrap();
            assert!((last - 1086.82).abs() < 1e-9);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_request_cancels_before_sampling() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let (stop_tx, stop_rx) = watch::channel(false);
    stop_tx.send(true).unwrap();

    let outcome = StabilizationMonitor::new(settings(Quantity::Wavelength))
        .wait(&laser, Some(stop_rx))
        .await
        .unwrap();

    assert!(matches!(outcome, StabilizationOutcome::Cancelled { .. }));
    assert!(!outcome.is_stabilized());
    assert_eq!(sim.read_count(Register::WavelengthOffsetReadout), 0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_read_failure_resets_and_continues() {
    let sim = SimulatedBasik::new("COM6", 1);
    sim.fail_next(Register::WavelengthOffsetReadout, RegisterResult::Timeout);
    let laser = open(&sim).await;

    let outcome = StabilizationMonitor::new(settings(Quantity::Wavelength))
        .wait(&laser, None)
        .await
        .unwrap();

    // first sample failed; three good samples follow
    assert!(matches!(
        outcome,
        StabilizationOutcome::Stabilized { samples: 4, .. }
    ));
    assert!(logs_contain("Read failed during stabilization"));
}

#[tokio::test(start_paused = true)]
async fn test_setpoint_read_failure_is_returned() {
    let sim = SimulatedBasik::new("COM6", 1);
    sim.fail_register(Register::WavelengthCenter, RegisterResult::ComError);
    let laser = open(&sim).await;

    let result = StabilizationMonitor::new(settings(Quantity::Wavelength))
        .wait(&laser, None)
        .await;
    assert!(matches!(result, Err(LaserError::RegisterIo { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_follows_a_moved_frequency_setpoint() {
    let sim = SimulatedBasik::new("COM6", 1).with_relaxation(0.5);
    let laser = open(&sim).await;
    laser.set_wavelength_setpoint(1086.85).await.unwrap();

    let mut settings = settings(Quantity::Frequency);
    settings.tolerance = 1e-3;
    settings.max_wait = Some(Duration::from_secs(60));
    let outcome = StabilizationMonitor::new(settings)
        .wait(&laser, None)
        .await
        .unwrap();

    match outcome {
        StabilizationOutcome::Stabilized { samples, .. } => assert!(samples > 3),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        sim.raw("COM6", 1, Register::WavelengthOffsetReadout),
        Some(RawValue::I16(500))
    );
}
