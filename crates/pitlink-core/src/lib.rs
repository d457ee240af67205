//! # PitLink Core Library
//!
//! Core functionality for talking to the IoT Pitmaster smoker controller.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The binary serial protocol (command encoding, telemetry frame decoding)
//! - Connection management over a Bluetooth serial transport
//! - A background telemetry poller with alert derivation
//! - Validated command dispatch
//! - A simulated smoker for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use pitlink_core::prelude::*;
//!
//! let mut session = Session::from_config(&LinkConfig::load_or_default())?;
//! let mut events = session.subscribe();
//! session.connect().await?;
//! session.start_polling();
//!
//! session.dispatch(Command::SetChamberTarget(225), TemperatureUnit::Fahrenheit)?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let LinkEvent::Telemetry(reading) = event {
//!         println!("Chamber: {:.1}", reading.snapshot.chamber_temp(TemperatureUnit::Fahrenheit));
//!     }
//! }
//! session.shutdown().await;
//! ```

pub mod config;
pub mod demo;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod unit_conversion;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, LinkConfig, TransportConfig};
    pub use crate::demo::SimulatedConnector;
    pub use crate::dispatch::{CommandDispatcher, DispatchError};
    pub use crate::protocol::{
        Command, ConnectionManager, ConnectionState, Connector, DecodeError, Mode, Transport,
        TransportError,
    };
    pub use crate::session::Session;
    pub use crate::telemetry::{
        AlertEvent, AlertKind, AlertTargets, LinkEvent, TelemetryReading, TelemetrySnapshot,
    };
    pub use crate::unit_conversion::TemperatureUnit;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
