//! Intent handling through a Session

use seed_daq::hardware::simulated::SimulatedBasik;
use seed_daq::hardware::{shared, RawValue};
use seed_daq::monitor::{PollField, PollSettings};
use seed_daq::register::Register;
use seed_daq::session::{Intent, Session};
use std::time::Duration;

fn session(sim: &SimulatedBasik) -> Session {
    Session::new(
        shared(sim.clone()),
        PollSettings {
            fields: vec![PollField::Temperature, PollField::Emission],
            plot_fields: vec![PollField::Temperature],
            ..PollSettings::default()
        },
    )
}

fn connect() -> Intent {
    Intent::Connect {
        port: "COM6".to_string(),
        device_id: 1,
    }
}

fn set(name: &str, value: &str) -> Intent {
    Intent::SetProperty {
        name: name.to_string(),
        value: value.to_string(),
    }
}

async fn wait_for_tick(session: &Session, tick: u64) {
    while session.snapshot().map(|s| s.tick).unwrap_or(0) < tick {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_requires_connection() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);

    assert_eq!(session.handle(set("power", "10")).await, "Not connected");
    assert_eq!(
        session
            .handle(Intent::StartPolling { interval: None })
            .await,
        "Not connected"
    );
    assert_eq!(session.handle(Intent::Disconnect).await, "Not connected");
    assert!(sim.call_log().is_empty());
}

#[tokio::test]
async fn test_connect_and_set_properties() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);

    assert_eq!(
        session.handle(connect()).await,
        "Connected to COM6 (device 1)"
    );
    assert!(session.is_connected());
    assert!(session.handle(connect()).await.starts_with("Already connected"));

    assert_eq!(
        session.handle(set("set_wavelength", "1086.85")).await,
        "Wavelength setpoint -> 1086.85 nm"
    );
    assert_eq!(
        sim.raw("COM6", 1, Register::WavelengthOffset),
        Some(RawValue::I16(500))
    );

    assert_eq!(
        session.handle(set("mod_range", "Narrow")).await,
        "Modulation range -> NARROW"
    );
    assert_eq!(session.handle(set("emission", "on")).await, "Emission set to ON");
    assert_eq!(
        sim.raw("COM6", 1, Register::Emission),
        Some(RawValue::U8(1))
    );
}

#[tokio::test]
async fn test_bad_input_is_reported_not_raised() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);
    session.handle(connect()).await;

    let unknown = session.handle(set("laser_color", "green")).await;
    assert_eq!(unknown, "Set laser_color failed: Unknown field 'laser_color'");

    let bad_enum = session.handle(set("mod_coupling", "magnetic")).await;
    assert!(bad_enum.starts_with("Set mod_coupling failed: Invalid value"));
    assert!(bad_enum.contains("AC, DC (0, 1)"));

    let bad_number = session.handle(set("power", "bright")).await;
    assert!(bad_number.contains("'bright' is not a number"));

    // the device was never written
    assert!(!sim
        .call_log()
        .iter()
        .any(|call| matches!(call, seed_daq::hardware::simulated::TransportCall::Write { .. })));
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);

    let message = session
        .handle(Intent::Connect {
            port: "COM7".to_string(),
            device_id: 1,
        })
        .await;
    assert!(message.starts_with("Connect failed: "), "{}", message);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_zero_polling_interval_is_rejected() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);
    session.handle(connect()).await;

    let message = session
        .handle(Intent::StartPolling {
            interval: Some(Duration::ZERO),
        })
        .await;
    assert_eq!(message, "Invalid polling interval: must be greater than zero");
    assert!(!session.is_polling());
    assert!(session.snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_polling_history_survives_reconnect() {
    let sim = SimulatedBasik::new("COM6", 1);
    let mut session = session(&sim);
    session.handle(connect()).await;

    let started = session
        .handle(Intent::StartPolling {
            interval: Some(Duration::from_millis(500)),
        })
        .await;
    assert_eq!(started, "Polling every 0.500 s");
    assert!(session.is_polling());

    wait_for_tick(&session, 3).await;
    let rows = session.table();
    assert_eq!(rows[0].0, "Temperature");
    assert_eq!(rows[1], ("Emission".to_string(), "OFF".to_string()));

    assert_eq!(session.handle(Intent::StopPolling).await, "Polling stopped");
    assert!(!session.is_polling());

    assert_eq!(
        session.handle(Intent::Disconnect).await,
        "Disconnected from COM6"
    );
    assert!(!sim.has_session("COM6", 1));
    assert!(!sim.is_port_open("COM6"));
    let kept = session.series()["temperature"].len();
    assert!(kept >= 3);

    session.handle(connect()).await;
    session
        .handle(Intent::StartPolling { interval: None })
        .await;
    wait_for_tick(&session, 1).await;
    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.series["temperature"].len(), kept + 1);

    assert_eq!(session.shutdown().await, "Disconnected from COM6");
}
