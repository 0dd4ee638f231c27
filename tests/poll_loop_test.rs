//! Background poll task: start/stop, interval changes and history hand-back

use seed_daq::hardware::simulated::SimulatedBasik;
use seed_daq::hardware::{shared, RegisterResult};
use seed_daq::laser::BasikDriver;
use seed_daq::monitor::{FieldValue, PollField, PollHandle, PollLoop, PollSettings};
use seed_daq::register::Register;
use std::sync::Arc;
use std::time::Duration;

async fn open(sim: &SimulatedBasik) -> Arc<BasikDriver> {
    Arc::new(
        BasikDriver::open(shared(sim.clone()), "COM6", 1)
            .await
            .unwrap(),
    )
}

fn two_fields() -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(1),
        fields: vec![PollField::Temperature, PollField::Wavelength, PollField::Status],
        plot_fields: vec![PollField::Temperature, PollField::Wavelength],
        history_capacity: 300,
    }
}

#[tokio::test(start_paused = true)]
async fn test_handle_ticks_until_stopped() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser, true);
    let mut snapshots = handle.subscribe();

    for expected in 1..=3u64 {
        snapshots.changed().await.unwrap();
        let tick = snapshots.borrow_and_update().as_ref().map(|s| s.tick);
        assert_eq!(tick, Some(expected));
    }
    handle.stop();
    assert!(!handle.is_running());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.latest().map(|s| s.tick), Some(3));

    let poll = handle.shutdown().await.unwrap();
    assert_eq!(poll.ticks(), 3);
    assert_eq!(poll.history().len_of("temperature"), 3);
    assert_eq!(poll.history().len_of("status"), 0);
    assert_eq!(sim.read_count(Register::Temperature), 3);
}

#[tokio::test(start_paused = true)]
async fn test_paused_handle_starts_on_request() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser, false);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(handle.latest().is_none());
    assert_eq!(sim.read_count(Register::Temperature), 0);

    let mut snapshots = handle.subscribe();
    handle.start();
    snapshots.changed().await.unwrap();
    assert_eq!(handle.latest().map(|s| s.tick), Some(1));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_spaces_samples() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser, true);
    let mut snapshots = handle.subscribe();

    snapshots.changed().await.unwrap();
    handle.set_interval(Duration::from_millis(250));
    assert_eq!(handle.interval(), Duration::from_millis(250));

    // the next tick is due 250 ms after the first, not at the change
    for _ in 0..3 {
        snapshots.changed().await.unwrap();
    }
    let poll = handle.shutdown().await.unwrap();
    let times: Vec<f64> = poll
        .history()
        .get("temperature")
        .unwrap()
        .samples()
        .iter()
        .map(|s| s.elapsed)
        .collect();
    assert_eq!(times.len(), 4);
    for (i, t) in times.iter().enumerate() {
        assert!((t - 0.25 * i as f64).abs() < 1e-9, "{:?}", times);
    }
    assert_eq!(poll.settings().interval, Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_start_keeps_cadence() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser, true);
    let mut snapshots = handle.subscribe();
    snapshots.changed().await.unwrap();

    handle.start();
    handle.start();
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(handle.latest().map(|s| s.tick), Some(1));

    snapshots.changed().await.unwrap();
    let snapshot = handle.latest().unwrap();
    assert_eq!(snapshot.tick, 2);
    assert!((snapshot.elapsed - 1.0).abs() < 1e-9);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_history_survives_restart() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;

    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser.clone(), true);
    let mut snapshots = handle.subscribe();
    snapshots.changed().await.unwrap();
    snapshots.changed().await.unwrap();
    let poll = handle.shutdown().await.unwrap();
    assert_eq!(poll.history().len_of("wavelength"), 2);

    let handle = PollHandle::spawn(poll, laser, true);
    let mut snapshots = handle.subscribe();
    snapshots.changed().await.unwrap();
    let snapshot = handle.latest().unwrap();
    assert_eq!(snapshot.tick, 3);
    assert_eq!(snapshot.series["wavelength"].len(), 3);

    let poll = handle.shutdown().await.unwrap();
    assert_eq!(poll.ticks(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failing_field_does_not_stop_task() {
    let sim = SimulatedBasik::new("COM6", 1);
    sim.fail_register(Register::Status, RegisterResult::Nacked);
    let laser = open(&sim).await;
    let handle = PollHandle::spawn(PollLoop::new(two_fields()), laser, true);
    let mut snapshots = handle.subscribe();

    snapshots.changed().await.unwrap();
    snapshots.changed().await.unwrap();
    let snapshot = handle.latest().unwrap();
    assert_eq!(snapshot.tick, 2);
    assert_eq!(snapshot.failed(), vec![PollField::Status]);
    assert!(matches!(
        snapshot.value(PollField::Temperature),
        Some(FieldValue::Number(_))
    ));
    let status_row = snapshot
        .table()
        .into_iter()
        .find(|(label, _)| label == "Status")
        .unwrap();
    assert!(status_row.1.starts_with("ERR: "));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_history_capacity_evicts_oldest() {
    let sim = SimulatedBasik::new("COM6", 1);
    let laser = open(&sim).await;
    let mut poll = PollLoop::new(PollSettings {
        history_capacity: 2,
        ..two_fields()
    });

    for _ in 0..3 {
        poll.tick(&laser).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    let history = poll.history().get("temperature").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.capacity(), 2);
    let times: Vec<f64> = history.samples().iter().map(|s| s.elapsed).collect();
    assert_eq!(times, vec![1.0, 2.0]);
}
