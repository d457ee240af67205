//! Telemetry
//!
//! Snapshot types decoded from the controller's frames, alert derivation and
//! the background poller that ties them to the connection.

pub mod alerts;
pub mod poller;
mod snapshot;

pub use alerts::{AlertEvaluator, AlertEvent, AlertKind, AlertSettings, AlertTargets, AlertThrottle};
pub use poller::{FrameAssembler, LinkEvent, PollerConfig, PollerHandle, TelemetryPoller, TickOutcome};
pub use snapshot::{ProbeFaults, TelemetryReading, TelemetrySnapshot, SAFETY_LIMIT_C};
