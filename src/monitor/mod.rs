//! Periodic activities that sit above the device: polling and settling
//! detection. Both isolate read failures instead of aborting.

pub mod fields;
pub mod poll;
pub mod stabilization;

pub use fields::{FieldReading, FieldSpec, FieldValue, PollField};
pub use poll::{PollControl, PollHandle, PollLoop, PollSettings, PollSnapshot};
pub use stabilization::{
    Quantity, StabilityFilter, StabilizationMonitor, StabilizationOutcome, StabilizationSettings,
};
