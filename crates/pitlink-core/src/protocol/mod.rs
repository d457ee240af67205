//! Serial Protocol Communication
//!
//! Implements the IoT Pitmaster Bluetooth serial protocol: short opcode
//! messages out, fixed 18-byte telemetry frames in.

pub mod codec;
pub mod commands;
mod connection;
mod error;
pub mod serial;
pub mod stream;

pub use codec::{decode_command, decode_telemetry, encode_command, encode_telemetry};
pub use commands::{Command, Mode, Opcode};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{DecodeError, TransportError};
pub use serial::{list_ports, PortInfo, SerialConnector};
pub use stream::{Connector, DeviceId, TcpConnector, Transport, SPP_SERVICE_UUID};

/// Default baud rate of the controller's SPP link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default transport read timeout in milliseconds
///
/// Short so a telemetry tick with no data returns quickly.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Size of one inbound telemetry frame
pub const TELEMETRY_FRAME_LEN: usize = 18;

/// Name the controller advertises over Bluetooth
pub const DEFAULT_DEVICE_NAME: &str = "IoT Pitmaster";
