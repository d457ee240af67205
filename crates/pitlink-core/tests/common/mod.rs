//! Scripted transport shared by the integration tests
#![allow(dead_code)]

use pitlink_core::protocol::{encode_telemetry, Connector, DeviceId, Transport};
use pitlink_core::telemetry::{ProbeFaults, TelemetrySnapshot};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

enum ReadStep {
    Data(Vec<u8>),
    Fail(ErrorKind),
}

#[derive(Default)]
struct LinkState {
    incoming: VecDeque<ReadStep>,
    written: Vec<Vec<u8>>,
    opens: usize,
    closes: usize,
    fail_open: bool,
    fail_write: bool,
    open_delay: Duration,
}

/// Both ends of a fake controller link
///
/// Reads replay whatever was queued, one queued chunk per read (split when
/// the caller's buffer is smaller). An empty queue reads as a timeout.
#[derive(Clone, Default)]
pub struct MockLink(Arc<Mutex<LinkState>>);

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.0.lock().unwrap()
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state().incoming.push_back(ReadStep::Data(bytes.to_vec()));
    }

    pub fn push_frame(&self, snapshot: &TelemetrySnapshot) {
        self.push_bytes(&encode_telemetry(snapshot));
    }

    pub fn push_error(&self, kind: ErrorKind) {
        self.state().incoming.push_back(ReadStep::Fail(kind));
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Writes are still recorded, then reported as a broken pipe
    pub fn set_fail_write(&self, fail: bool) {
        self.state().fail_write = fail;
    }

    /// Make every open block this long before it completes
    pub fn set_open_delay(&self, delay: Duration) {
        self.state().open_delay = delay;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector(self.clone()))
    }
}

struct MockConnector(MockLink);

impl Connector for MockConnector {
    fn resolve(&self) -> io::Result<DeviceId> {
        Ok(DeviceId::new("IoT Pitmaster", "mock"))
    }

    fn open(&self, _device: &DeviceId) -> io::Result<Box<dyn Transport>> {
        let delay = self.0.state().open_delay;
        thread::sleep(delay);
        let mut state = self.0.state();
        state.opens += 1;
        if state.fail_open {
            return Err(io::Error::new(ErrorKind::ConnectionRefused, "refused"));
        }
        Ok(Box::new(MockTransport(self.0.clone())))
    }
}

struct MockTransport(MockLink);

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.state();
        match state.incoming.pop_front() {
            None => Err(ErrorKind::TimedOut.into()),
            Some(ReadStep::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(ReadStep::Data(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    state.incoming.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
        }
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.state();
        state.written.push(buf.to_vec());
        if state.fail_write {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn close(&mut self) -> io::Result<()> {
        self.0.state().closes += 1;
        Ok(())
    }
}

pub fn snapshot(chamber: f32, left: f32, right: f32) -> TelemetrySnapshot {
    TelemetrySnapshot {
        chamber_temp_c: chamber,
        cook_temp_left_c: left,
        cook_temp_right_c: right,
        fan_duty_percent: 35,
        hopper_active: false,
        damper_open: true,
        faults: ProbeFaults::default(),
    }
}
