//! Discovery against a simulated multi-port bench

use seed_daq::discovery::{find_device, find_devices, find_devices_by_names, DeviceRef};
use seed_daq::hardware::simulated::{SimulatedBasik, TransportCall};
use seed_daq::hardware::{shared, PortResult};

fn bench() -> SimulatedBasik {
    SimulatedBasik::new("COM6", 1)
        .with_device("COM6", 4, "seed-b")
        .with_device("COM9", 2, "seed-b")
}

fn device(port: &str, device_id: u8, name: &str) -> DeviceRef {
    DeviceRef {
        port: port.to_string(),
        device_id,
        name: name.to_string(),
    }
}

#[tokio::test]
async fn test_find_devices_scans_every_port() {
    let sim = bench();
    let transport = shared(sim.clone());

    let devices = find_devices(&transport, None).await.unwrap();
    assert_eq!(
        devices,
        vec![
            device("COM6", 1, "Basik"),
            device("COM6", 4, "seed-b"),
            device("COM9", 2, "seed-b"),
        ]
    );
    assert!(!sim.is_port_open("COM6"));
    assert!(!sim.is_port_open("COM9"));
}

#[tokio::test]
async fn test_find_devices_restricted_ports() {
    let sim = bench();
    let transport = shared(sim.clone());

    let ports = vec!["COM9".to_string()];
    let devices = find_devices(&transport, Some(&ports)).await.unwrap();
    assert_eq!(devices, vec![device("COM9", 2, "seed-b")]);
    assert!(!sim
        .call_log()
        .contains(&TransportCall::OpenPort("COM6".to_string())));
}

#[tokio::test]
async fn test_by_names_includes_empty_groups() {
    let transport = shared(bench());
    let grouped = find_devices_by_names(&transport, &["seed-b", "missing"], None)
        .await
        .unwrap();

    assert_eq!(grouped["seed-b"].len(), 2);
    assert!(grouped["missing"].is_empty());
    assert!(!grouped.contains_key("Basik"));
}

#[tokio::test]
async fn test_find_device_by_name() {
    let transport = shared(bench());
    let found = find_device(&transport, "Basik", None).await.unwrap();
    assert_eq!(found, vec![device("COM6", 1, "Basik")]);

    assert!(find_device(&transport, "nothing", None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unopenable_port_is_skipped() {
    let sim = bench();
    sim.fail_port_open(PortResult::ApplicationBusy);
    let transport = shared(sim.clone());

    // the first port in the scan (COM6) fails to open
    let devices = find_devices(&transport, None).await.unwrap();
    assert_eq!(devices, vec![device("COM9", 2, "seed-b")]);
}
