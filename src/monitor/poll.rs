//! Periodic multi-field sampling with bounded history.
//!
//! [`PollLoop`] owns the history and performs single ticks. [`PollHandle`]
//! runs a loop as a tokio task driven by a `watch` control channel:
//! start/stop and interval changes take effect between ticks, and
//! [`PollHandle::shutdown`] hands the loop (and its history) back so it can be
//! restarted later, for example against a reconnected device.

use super::fields::{FieldReading, FieldValue, PollField};
use crate::data::{HistoryBook, Sample, DEFAULT_HISTORY_CAPACITY};
use crate::error::{LaserError, LaserResult};
use crate::laser::BasikDriver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which fields to read and plot, and how often
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSettings {
    /// Time between ticks
    pub interval: Duration,
    /// Fields read each tick, in table order
    pub fields: Vec<PollField>,
    /// Fields whose numeric readings are appended to history.
    /// Only plottable fields that are also in `fields` are recorded.
    pub plot_fields: Vec<PollField>,
    /// Samples kept per plotted field
    pub history_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            fields: PollField::ALL.to_vec(),
            plot_fields: PollField::plottable(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Result of one tick: the value table plus every plotted series
#[derive(Debug, Clone, Serialize)]
pub struct PollSnapshot {
    /// Wall-clock time of the tick
    pub timestamp: DateTime<Utc>,
    /// Seconds since the first tick of this loop
    pub elapsed: f64,
    /// Tick counter, starting at 1
    pub tick: u64,
    /// One reading per polled field, in table order
    pub readings: Vec<FieldReading>,
    /// History of every plotted field
    pub series: BTreeMap<String, Vec<Sample>>,
}

impl PollSnapshot {
    /// `(label, text)` rows; failed reads show as `ERR: <message>`
    pub fn table(&self) -> Vec<(String, String)> {
        self.readings.iter().map(FieldReading::row).collect()
    }

    /// Reading of one field
    pub fn value(&self, field: PollField) -> Option<&FieldValue> {
        self.readings
            .iter()
            .find(|r| r.field == field)
            .map(|r| &r.value)
    }

    /// Fields whose read failed this tick
    pub fn failed(&self) -> Vec<PollField> {
        self.readings
            .iter()
            .filter(|r| r.value.is_failed())
            .map(|r| r.field)
            .collect()
    }
}

/// Field sampler with per-field history
#[derive(Debug)]
pub struct PollLoop {
    settings: PollSettings,
    history: HistoryBook,
    origin: Option<Instant>,
    ticks: u64,
}

impl PollLoop {
    #[allow(missing_docs)]
    pub fn new(settings: PollSettings) -> Self {
        Self {
            history: HistoryBook::new(settings.history_capacity),
            settings,
            origin: None,
            ticks: 0,
        }
    }

    #[allow(missing_docs)]
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    #[allow(missing_docs)]
    pub fn history(&self) -> &HistoryBook {
        &self.history
    }

    /// Number of ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Change the tick period; history is kept
    pub fn set_interval(&mut self, interval: Duration) {
        self.settings.interval = interval;
    }

    /// Change the polled fields; history of every field is kept
    pub fn set_fields(&mut self, fields: Vec<PollField>) {
        self.settings.fields = fields;
    }

    /// Change the plotted fields; history of every field is kept
    pub fn set_plot_fields(&mut self, plot_fields: Vec<PollField>) {
        self.settings.plot_fields = plot_fields;
    }

    fn plots(&self, field: PollField) -> bool {
        field.spec().plot && self.settings.plot_fields.contains(&field)
    }

    /// Read every polled field once.
    ///
    /// A failing field is recorded as [`FieldValue::Failed`] and does not
    /// affect the other fields or any history. Each field is read exactly
    /// once; the same reading feeds both the table and the history.
    pub async fn tick(&mut self, laser: &BasikDriver) -> PollSnapshot {
        let now = Instant::now();
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now.duration_since(origin).as_secs_f64();
        self.ticks += 1;

        let mut readings = Vec::with_capacity(self.settings.fields.len());
        for field in self.settings.fields.clone() {
            let value = match field.read(laser).await {
                Ok(value) => value,
                Err(err) => {
                    debug!(field = %field, error = %err, "Field read failed");
                    FieldValue::Failed(err.to_string())
                }
            };
            if self.plots(field) {
                if let Some(number) = value.numeric() {
                    self.history
                        .record(field.name(), Sample::new(elapsed, number));
                }
            }
            readings.push(FieldReading { field, value });
        }

        let series = self
            .settings
            .plot_fields
            .iter()
            .filter_map(|f| {
                self.history
                    .get(f.name())
                    .map(|h| (f.name().to_string(), h.samples()))
            })
            .collect();

        PollSnapshot {
            timestamp: Utc::now(),
            elapsed,
            tick: self.ticks,
            readings,
            series,
        }
    }
}

/// Control state shared with a running poll task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollControl {
    /// Whether ticks are being taken
    pub running: bool,
    /// Time between ticks
    pub interval: Duration,
    shutdown: bool,
}

/// A [`PollLoop`] running as a background task
pub struct PollHandle {
    control: watch::Sender<PollControl>,
    snapshots: watch::Receiver<Option<PollSnapshot>>,
    task: JoinHandle<PollLoop>,
}

impl PollHandle {
    /// Spawn `poll` against `laser`, taking ticks immediately if `running`
    pub fn spawn(poll: PollLoop, laser: Arc<BasikDriver>, running: bool) -> Self {
        let (control, control_rx) = watch::channel(PollControl {
            running,
            interval: poll.settings().interval,
            shutdown: false,
        });
        let (snapshot_tx, snapshots) = watch::channel(None);
        let task = tokio::spawn(run(poll, laser, control_rx, snapshot_tx));
        Self {
            control,
            snapshots,
            task,
        }
    }

    /// Resume taking ticks
    pub fn start(&self) {
        self.control.send_modify(|c| c.running = true);
    }

    /// Pause after the current tick
    pub fn stop(&self) {
        self.control.send_modify(|c| c.running = false);
    }

    /// Change the period. The next tick is due one new interval after the
    /// previous one.
    pub fn set_interval(&self, interval: Duration) {
        self.control.send_modify(|c| c.interval = interval);
    }

    #[allow(missing_docs)]
    pub fn is_running(&self) -> bool {
        self.control.borrow().running
    }

    #[allow(missing_docs)]
    pub fn interval(&self) -> Duration {
        self.control.borrow().interval
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Option<PollSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified after every tick
    pub fn subscribe(&self) -> watch::Receiver<Option<PollSnapshot>> {
        self.snapshots.clone()
    }

    /// Stop the task after its current tick and return the loop with its
    /// accumulated history
    pub async fn shutdown(self) -> LaserResult<PollLoop> {
        self.control.send_modify(|c| c.shutdown = true);
        self.task
            .await
            .map_err(|err| LaserError::Task(err.to_string()))
    }
}

async fn run(
    mut poll: PollLoop,
    laser: Arc<BasikDriver>,
    mut control: watch::Receiver<PollControl>,
    snapshots: watch::Sender<Option<PollSnapshot>>,
) -> PollLoop {
    info!(port = laser.port(), "Poll task started");
    loop {
        let current = *control.borrow_and_update();
        if current.shutdown {
            break;
        }
        if !current.running {
            if control.changed().await.is_err() {
                break;
            }
            continue;
        }

        poll.set_interval(current.interval);
        let ticked_at = Instant::now();
        let snapshot = poll.tick(&laser).await;
        snapshots.send_replace(Some(snapshot));

        if !wait_for_next_tick(&mut control, ticked_at).await {
            break;
        }
    }
    info!(port = laser.port(), ticks = poll.ticks(), "Poll task stopped");
    poll
}

// Sleeps until one interval after `ticked_at`. An interval change moves the
// deadline without taking an extra tick; stop and shutdown end the wait.
// Returns false once the control channel is closed.
async fn wait_for_next_tick(
    control: &mut watch::Receiver<PollControl>,
    ticked_at: Instant,
) -> bool {
    loop {
        let current = *control.borrow_and_update();
        if current.shutdown || !current.running {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(ticked_at + current.interval) => return true,
            changed = control.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
