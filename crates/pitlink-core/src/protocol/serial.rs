//! Serial port handling
//!
//! Finds the bonded controller among the host's serial ports and opens it.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io;
use std::time::Duration;

use super::stream::{Connector, DeviceId, SerialTransport, Transport};
use super::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/rfcomm0" or "COM5")
    pub name: String,

    /// Whether the port is a Bluetooth link
    pub bluetooth: bool,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (bluetooth, manufacturer, product) = match info.port_type {
            SerialPortType::BluetoothPort => (true, None, None),
            SerialPortType::UsbPort(usb_info) => (false, usb_info.manufacturer, usb_info.product),
            _ => (false, None, None),
        };

        Self {
            bluetooth: bluetooth || is_rfcomm(&info.port_name),
            name: info.port_name,
            manufacturer,
            product,
        }
    }
}

fn is_rfcomm(name: &str) -> bool {
    name.rsplit('/')
        .next()
        .map(|base| base.starts_with("rfcomm"))
        .unwrap_or(false)
}

/// Helper used to sort port names so that:
///  - rfcomm* ports come first (sorted numerically by suffix)
///  - then other Bluetooth ports (sorted by name)
///  - then everything else (sorted by name)
fn port_sort_key(port: &PortInfo) -> (u8, usize, String) {
    let basename = port.name.rsplit('/').next().unwrap_or(&port.name);
    if let Some(rest) = basename.strip_prefix("rfcomm") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if port.bluetooth {
        return (1, 0, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev/rfcomm fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Bound RFCOMM devices are not always enumerated by the serialport API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("rfcomm") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        bluetooth: true,
                        manufacturer: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(port_sort_key);
    v
}

/// Pick the port most likely to be the named controller
///
/// An exact product-name match wins, then the first Bluetooth port.
pub fn find_device_port<'a>(ports: &'a [PortInfo], device_name: &str) -> Option<&'a PortInfo> {
    ports
        .iter()
        .find(|p| p.product.as_deref() == Some(device_name))
        .or_else(|| ports.iter().find(|p| p.bluetooth))
}

/// Open a serial port configured 8N1 with the given read timeout
pub fn open_port(name: &str, baud_rate: u32, read_timeout: Duration) -> io::Result<Box<dyn SerialPort>> {
    serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(io::Error::from)
}

/// Connector for the controller's Bluetooth serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    device_name: String,
    port_name: Option<String>,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    /// Find the port by scanning for `device_name`
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }

    /// Skip the scan and always use this port
    pub fn with_port(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl Connector for SerialConnector {
    fn resolve(&self) -> io::Result<DeviceId> {
        if let Some(port) = &self.port_name {
            return Ok(DeviceId::new(self.device_name.clone(), port.clone()));
        }

        let ports = list_ports();
        tracing::debug!(count = ports.len(), "scanning serial ports for {}", self.device_name);
        find_device_port(&ports, &self.device_name)
            .map(|p| DeviceId::new(self.device_name.clone(), p.name.clone()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no bonded serial port for '{}'", self.device_name),
                )
            })
    }

    fn open(&self, device: &DeviceId) -> io::Result<Box<dyn Transport>> {
        let port = open_port(&device.address, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(SerialTransport::new(port)))
    }
}
