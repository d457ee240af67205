//! Transport abstraction
//!
//! The core only needs a duplex byte stream to the controller. Pairing and
//! discovery happen outside; a [`Connector`] turns a bonded device into a
//! [`Transport`].

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use uuid::Uuid;

/// Serial Port Profile service class, the RFCOMM service the controller advertises
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Identity of the bonded controller a connector resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Advertised name, e.g. "IoT Pitmaster"
    pub name: String,
    /// Where to open it: serial port path, RFCOMM device or `host:port`
    pub address: String,
    /// RFCOMM service the link runs over
    pub service: Uuid,
}

impl DeviceId {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            service: SPP_SERVICE_UUID,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Open duplex byte stream to the controller
///
/// `read` may return fewer bytes than requested; a read that finds nothing
/// buffered should fail with `TimedOut` or `WouldBlock` rather than block forever.
pub trait Transport: Read + Write + Send {
    /// Release the underlying handle
    fn close(&mut self) -> io::Result<()>;
}

/// Resolves the bonded controller and opens transports to it
pub trait Connector: Send + Sync {
    /// Look up the bonded device to talk to
    fn resolve(&self) -> io::Result<DeviceId>;

    /// Open a transport to a resolved device
    fn open(&self, device: &DeviceId) -> io::Result<Box<dyn Transport>>;
}

/// Serial port wrapper implementing Transport
///
/// On Linux a bonded RFCOMM link shows up as `/dev/rfcommN`; on other
/// platforms as the outgoing Bluetooth COM port.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl Transport for SerialTransport {
    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle closes the port
        self.port = None;
        Ok(())
    }
}

/// TCP stream wrapper implementing Transport, for serial-over-TCP bridges
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to `host:port` with the given read timeout
    pub fn connect(address: &str, read_timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Connector for a serial-over-TCP bridge at a fixed address
pub struct TcpConnector {
    device_name: String,
    address: String,
    read_timeout: Duration,
}

impl TcpConnector {
    pub fn new(device_name: impl Into<String>, address: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            device_name: device_name.into(),
            address: address.into(),
            read_timeout,
        }
    }
}

impl Connector for TcpConnector {
    fn resolve(&self) -> io::Result<DeviceId> {
        Ok(DeviceId::new(self.device_name.clone(), self.address.clone()))
    }

    fn open(&self, device: &DeviceId) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::connect(&device.address, self.read_timeout)?))
    }
}
