//! Name-match scan for Basik modules.
//!
//! Discovery opens the requested ports (or every port the transport can
//! reach), reads the device-type table of each, then opens a short session
//! per present device to read its name. All ports opened for the scan are
//! closed again before sessions are created.

use crate::error::LaserResult;
use crate::hardware::SharedTransport;
use crate::laser::BasikDriver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// A module found on a port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceRef {
    #[allow(missing_docs)]
    pub port: String,
    #[allow(missing_docs)]
    pub device_id: u8,
    /// Module name as stored in the NAME register
    pub name: String,
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (port {}, device {})", self.name, self.port, self.device_id)
    }
}

async fn discover_raw(transport: &SharedTransport, ports: Option<&[String]>) -> Vec<(String, u8)> {
    let mut guard = transport.lock().await;
    let targets = match ports {
        Some(ports) => ports.to_vec(),
        None => guard.available_ports().await,
    };

    let mut opened = Vec::new();
    for port in targets {
        match guard.open_port(&port).await {
            Ok(()) => opened.push(port),
            Err(code) => debug!(port = %port, result = %code, "Skipping port"),
        }
    }

    let mut found = Vec::new();
    for port in &opened {
        match guard.device_types(port).await {
            Ok(types) => found.extend(
                types
                    .iter()
                    .enumerate()
                    .filter(|(_, kind)| **kind != 0)
                    .filter_map(|(id, _)| u8::try_from(id).ok())
                    .map(|id| (port.clone(), id)),
            ),
            Err(code) => warn!(port = %port, result = %code, "discover_devices: {}", code),
        }
    }

    for port in opened {
        if let Err(code) = guard.close_port(&port).await {
            warn!(port = %port, result = %code, "Failed to close port after scan");
        }
    }
    found
}

/// Every module reachable through `transport`.
///
/// `ports` restricts the scan; `None` scans every port the transport
/// enumerates. Returns an empty list when nothing is found.
pub async fn find_devices(
    transport: &SharedTransport,
    ports: Option<&[String]>,
) -> LaserResult<Vec<DeviceRef>> {
    let mut devices = Vec::new();
    for (port, device_id) in discover_raw(transport, ports).await {
        let laser = BasikDriver::open(transport.clone(), &port, device_id).await?;
        let name = laser.name().await;
        let closed = laser.close().await;
        let name = name?;
        closed?;
        devices.push(DeviceRef {
            port,
            device_id,
            name,
        });
    }
    info!(count = devices.len(), "Device scan complete");
    Ok(devices)
}

/// Modules grouped by requested name. Every requested name has an entry,
/// empty when no module carries it.
pub async fn find_devices_by_names(
    transport: &SharedTransport,
    names: &[&str],
    ports: Option<&[String]>,
) -> LaserResult<BTreeMap<String, Vec<DeviceRef>>> {
    let mut grouped: BTreeMap<String, Vec<DeviceRef>> =
        names.iter().map(|n| (n.to_string(), Vec::new())).collect();

    for device in find_devices(transport, ports).await? {
        if let Some(group) = grouped.get_mut(&device.name) {
            group.push(device);
        }
    }
    Ok(grouped)
}

/// Modules named `name`
pub async fn find_device(
    transport: &SharedTransport,
    name: &str,
    ports: Option<&[String]>,
) -> LaserResult<Vec<DeviceRef>> {
    Ok(find_devices_by_names(transport, &[name], ports)
        .await?
        .remove(name)
        .unwrap_or_default())
}
