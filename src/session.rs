//! Front-end session: turns user intents into device and poll-task actions.
//!
//! A [`Session`] owns at most one open device and one poll task. Every
//! intent resolves to a status line; failures are reported in the message
//! rather than returned, so a display loop can show them and carry on.
//! The poll history survives disconnects and reconnects.

use crate::control::{apply_property, Property};
use crate::data::Sample;
use crate::error::LaserResult;
use crate::hardware::SharedTransport;
use crate::laser::BasikDriver;
use crate::monitor::{PollHandle, PollLoop, PollSettings, PollSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A request coming from the display or command line
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Open a device session
    Connect {
        #[allow(missing_docs)]
        port: String,
        #[allow(missing_docs)]
        device_id: u8,
    },
    /// Stop polling and close the device
    Disconnect,
    /// Apply raw user text to a property
    SetProperty {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        value: String,
    },
    /// Start (or resume) polling, optionally changing the period
    StartPolling {
        #[allow(missing_docs)]
        interval: Option<Duration>,
    },
    /// Pause polling; history is kept
    StopPolling,
}

/// Device plus poll task behind one intent handler
pub struct Session {
    transport: SharedTransport,
    settings: PollSettings,
    laser: Option<Arc<BasikDriver>>,
    poller: Option<PollHandle>,
    idle: Option<PollLoop>,
}

impl Session {
    #[allow(missing_docs)]
    pub fn new(transport: SharedTransport, settings: PollSettings) -> Self {
        Self {
            transport,
            laser: None,
            poller: None,
            idle: Some(PollLoop::new(settings.clone())),
            settings,
        }
    }

    /// Currently open device
    pub fn laser(&self) -> Option<&Arc<BasikDriver>> {
        self.laser.as_ref()
    }

    #[allow(missing_docs)]
    pub fn is_connected(&self) -> bool {
        self.laser.is_some()
    }

    #[allow(missing_docs)]
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollHandle::is_running)
    }

    /// Latest poll snapshot, if the poll task has ticked
    pub fn snapshot(&self) -> Option<PollSnapshot> {
        self.poller.as_ref().and_then(PollHandle::latest)
    }

    /// `(label, text)` rows of the latest snapshot
    pub fn table(&self) -> Vec<(String, String)> {
        self.snapshot().map(|s| s.table()).unwrap_or_default()
    }

    /// Plotted series, from the running task or the parked loop
    pub fn series(&self) -> BTreeMap<String, Vec<Sample>> {
        match (&self.poller, &self.idle) {
            (Some(handle), _) => handle.latest().map(|s| s.series).unwrap_or_default(),
            (None, Some(poll)) => poll.history().series(),
            (None, None) => BTreeMap::new(),
        }
    }

    /// Handle one intent and describe the result
    pub async fn handle(&mut self, intent: Intent) -> String {
        match intent {
            Intent::Connect { port, device_id } => self.connect(&port, device_id).await,
            Intent::Disconnect => self.disconnect().await,
            Intent::SetProperty { name, value } => self.set_property(&name, &value).await,
            Intent::StartPolling { interval } => self.start_polling(interval),
            Intent::StopPolling => match &self.poller {
                Some(handle) => {
                    handle.stop();
                    "Polling stopped".to_string()
                }
                None => "Not polling".to_string(),
            },
        }
    }

    async fn connect(&mut self, port: &str, device_id: u8) -> String {
        if let Some(laser) = &self.laser {
            return format!(
                "Already connected to {} (device {})",
                laser.port(),
                laser.device_id()
            );
        }
        match BasikDriver::open(self.transport.clone(), port, device_id).await {
            Ok(laser) => {
                info!(port, device_id, "Session connected");
                self.laser = Some(Arc::new(laser));
                format!("Connected to {} (device {})", port, device_id)
            }
            Err(err) => {
                warn!(port, device_id, error = %err, "Connect failed");
                format!("Connect failed: {}", err)
            }
        }
    }

    async fn disconnect(&mut self) -> String {
        let Some(laser) = self.laser.take() else {
            return "Not connected".to_string();
        };
        if let Err(err) = self.park_poller().await {
            warn!(error = %err, "Poll task did not stop cleanly");
        }
        match laser.close().await {
            Ok(()) => format!("Disconnected from {}", laser.port()),
            Err(err) => format!("Disconnect failed: {}", err),
        }
    }

    async fn set_property(&mut self, name: &str, value: &str) -> String {
        let Some(laser) = &self.laser else {
            return "Not connected".to_string();
        };
        let result = match name.parse::<Property>() {
            Ok(property) => apply_property(laser, property, value).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(message) => message,
            Err(err) => format!("Set {} failed: {}", name, err),
        }
    }

    fn start_polling(&mut self, interval: Option<Duration>) -> String {
        let Some(laser) = &self.laser else {
            return "Not connected".to_string();
        };
        if interval.is_some_and(|i| i.is_zero()) {
            return "Invalid polling interval: must be greater than zero".to_string();
        }
        if let Some(interval) = interval {
            self.settings.interval = interval;
        }
        let period = self.settings.interval;
        if let Some(handle) = &self.poller {
            handle.set_interval(period);
            handle.start();
        } else {
            let mut poll = self.idle.take().unwrap_or_else(|| {
                warn!("Poll history was lost; starting a fresh history");
                PollLoop::new(self.settings.clone())
            });
            poll.set_interval(period);
            self.poller = Some(PollHandle::spawn(poll, laser.clone(), true));
        }
        format!("Polling every {:.3} s", period.as_secs_f64())
    }

    /// Shut the poll task down and keep its loop for the next connection
    async fn park_poller(&mut self) -> LaserResult<()> {
        if let Some(handle) = self.poller.take() {
            self.idle = Some(handle.shutdown().await?);
        }
        Ok(())
    }

    /// Stop polling and close the device
    pub async fn shutdown(mut self) -> String {
        self.disconnect().await
    }
}
