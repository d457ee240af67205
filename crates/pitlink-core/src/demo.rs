//! Demo Mode - Simulated smoker for testing
//!
//! A [`Transport`] that behaves like the controller: it parses the commands
//! written to it and answers with one telemetry frame per second. The fire
//! chases the chamber target when in auto mode, with a little noise on every
//! probe so the readings look alive.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::protocol::{
    decode_command, encode_telemetry, Command, Connector, DecodeError, DeviceId, Mode, Opcode,
    Transport, DEFAULT_DEVICE_NAME, TELEMETRY_FRAME_LEN,
};
use crate::telemetry::{ProbeFaults, TelemetrySnapshot, SAFETY_LIMIT_C};

/// How often the controller sends telemetry
pub const FRAME_PERIOD: Duration = Duration::from_secs(1);

const AMBIENT_C: f32 = 21.0;

/// Thermal model of the smoker, one step per frame
#[derive(Debug, Clone)]
pub struct SmokerModel {
    pub chamber_c: f32,
    pub cook_left_c: f32,
    pub cook_right_c: f32,
    pub chamber_target_c: Option<f32>,
    pub cook_target_c: Option<f32>,
    pub mode: Mode,
    pub fan_duty: u8,
    pub damper_open: bool,
    /// Steps left on the current fuel charge
    hopper_steps: u8,
    /// Set once the safety limit tripped; actuators stay off
    shutdown: bool,
}

impl Default for SmokerModel {
    fn default() -> Self {
        Self {
            chamber_c: AMBIENT_C,
            cook_left_c: AMBIENT_C,
            cook_right_c: AMBIENT_C,
            chamber_target_c: None,
            cook_target_c: None,
            mode: Mode::Auto,
            fan_duty: 0,
            damper_open: false,
            hopper_steps: 0,
            shutdown: false,
        }
    }
}

impl SmokerModel {
    /// Apply a decoded command (setpoints in Celsius)
    pub fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::SetMode(mode) => self.mode = mode,
            Command::SetChamberTarget(c) => self.chamber_target_c = Some(c as f32),
            Command::SetCookTarget(c) => self.cook_target_c = Some(c as f32),
            Command::SetFanDuty(percent) => self.fan_duty = percent.min(100),
            Command::SetDamper(open) => self.damper_open = open,
            Command::DispenseFuel => self.hopper_steps = 3,
        }
    }

    /// Advance one frame period
    pub fn step(&mut self, rng: &mut impl Rng) {
        if self.shutdown {
            self.fan_duty = 0;
            self.damper_open = false;
        } else if let (Mode::Auto, Some(target)) = (self.mode, self.chamber_target_c) {
            let error = target - self.chamber_c;
            self.fan_duty = (error * 5.0).clamp(0.0, 100.0) as u8;
            self.damper_open = error > 0.0;
        }

        let draft = self.fan_duty as f32 / 100.0 + if self.damper_open { 0.2 } else { 0.0 };
        let fuel = if self.hopper_steps > 0 { 1.5 } else { 0.0 };
        let heating = draft * 3.0 + fuel;
        let cooling = (self.chamber_c - AMBIENT_C) * 0.01;
        self.chamber_c += heating - cooling + rng.gen_range(-0.3..0.3);

        self.cook_left_c += (self.chamber_c - self.cook_left_c) * 0.02 + rng.gen_range(-0.1..0.1);
        self.cook_right_c += (self.chamber_c - self.cook_right_c) * 0.015 + rng.gen_range(-0.1..0.1);
        self.hopper_steps = self.hopper_steps.saturating_sub(1);

        if !self.shutdown
            && [self.chamber_c, self.cook_left_c, self.cook_right_c]
                .iter()
                .any(|&t| t > SAFETY_LIMIT_C)
        {
            debug!("simulated controller tripped safety shutdown");
            self.shutdown = true;
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            chamber_temp_c: self.chamber_c,
            cook_temp_left_c: self.cook_left_c,
            cook_temp_right_c: self.cook_right_c,
            fan_duty_percent: self.fan_duty as i8,
            hopper_active: self.hopper_steps > 0,
            damper_open: self.damper_open,
            faults: ProbeFaults::default(),
        }
    }
}

/// Simulated controller on the other end of a transport
pub struct SimulatedSmoker {
    model: SmokerModel,
    rng: StdRng,
    frame_period: Duration,
    started: Instant,
    frames_sent: u64,
    outbox: VecDeque<u8>,
    inbox: Vec<u8>,
    closed: bool,
}

impl SimulatedSmoker {
    pub fn new(rng: StdRng, frame_period: Duration) -> Self {
        Self {
            model: SmokerModel::default(),
            rng,
            frame_period,
            started: Instant::now(),
            frames_sent: 0,
            outbox: VecDeque::new(),
            inbox: Vec::new(),
            closed: false,
        }
    }

    pub fn model(&self) -> &SmokerModel {
        &self.model
    }

    /// Step the model and return the frame it would send
    pub fn next_frame(&mut self) -> [u8; TELEMETRY_FRAME_LEN] {
        self.model.step(&mut self.rng);
        self.frames_sent += 1;
        encode_telemetry(&self.model.snapshot())
    }

    /// Queue every frame that is due by wall-clock time
    fn queue_due_frames(&mut self) {
        let period = self.frame_period.as_millis().max(1);
        let due = (self.started.elapsed().as_millis() / period) as u64;
        while self.frames_sent < due {
            let frame = self.next_frame();
            self.outbox.extend(frame);
        }
    }

    fn parse_inbox(&mut self) {
        loop {
            match decode_command(&self.inbox) {
                Ok((cmd, len)) => {
                    debug!("simulated controller received {:?}", cmd);
                    self.model.apply(cmd);
                    self.inbox.drain(..len);
                }
                Err(DecodeError::UnknownOpcode(op)) => {
                    // Skip a whole message when its length is known
                    let len = Opcode::from_byte(op).map(|o| o.message_len()).unwrap_or(1);
                    if self.inbox.len() < len {
                        break;
                    }
                    debug!("simulated controller ignoring opcode {}", op);
                    self.inbox.drain(..len);
                }
                Err(_) => break,
            }
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "simulated link closed"))
        } else {
            Ok(())
        }
    }
}

impl Read for SimulatedSmoker {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.queue_due_frames();
        if self.outbox.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedSmoker {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.inbox.extend_from_slice(buf);
        self.parse_inbox();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()
    }
}

impl Transport for SimulatedSmoker {
    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Connector that opens a fresh [`SimulatedSmoker`] on every connect
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    seed: Option<u64>,
    frame_period: Duration,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self {
            seed: None,
            frame_period: FRAME_PERIOD,
        }
    }

    /// Deterministic noise
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_frame_period(mut self, frame_period: Duration) -> Self {
        self.frame_period = frame_period;
        self
    }
}

impl Connector for SimulatedConnector {
    fn resolve(&self) -> io::Result<DeviceId> {
        Ok(DeviceId::new(DEFAULT_DEVICE_NAME, "simulated"))
    }

    fn open(&self, _device: &DeviceId) -> io::Result<Box<dyn Transport>> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Box::new(SimulatedSmoker::new(rng, self.frame_period)))
    }
}
